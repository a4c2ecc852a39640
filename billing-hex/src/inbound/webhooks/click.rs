//! Click prepare/complete callbacks.
//!
//! Click drives a payment in two signed stages. Prepare binds Click's
//! transaction id to ours and hands back a `merchant_prepare_id`; complete
//! must quote that id, and its signature covers it, so a confirmation can
//! never arrive for a transaction that was not prepared.

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{State, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use billing_types::{
    Amount, AppError, BillingRepository, ClickDetails, DetailsFieldFilter, Gateway, LookupError, Status,
    Transaction,
};

use crate::BillingService;
use crate::inbound::handlers::{ApiError, AppState};
use crate::outbound::ClickConfig;
use crate::security::{ClickSignFields, click_sign, verify_signature};

pub const ACTION_PREPARE: i32 = 0;
pub const ACTION_COMPLETE: i32 = 1;

/// Form body Click posts on both stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickRequest {
    pub click_trans_id: i64,
    pub service_id: i64,
    #[serde(default)]
    pub click_paydoc_id: Option<i64>,
    pub merchant_trans_id: String,
    /// Complete stage only.
    #[serde(default)]
    pub merchant_prepare_id: Option<i64>,
    /// As sent by Click, in major units.
    #[serde(default)]
    pub amount: String,
    pub action: i32,
    #[serde(default)]
    pub error: i32,
    #[serde(default)]
    pub error_note: String,
    pub sign_time: String,
    pub sign_string: String,
}

/// Envelope Click expects back from either stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickResponse {
    pub click_trans_id: i64,
    pub merchant_trans_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_prepare_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_confirm_id: Option<i64>,
    pub error: i32,
    pub error_note: String,
}

/// Click's error vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickCode {
    SignCheckFailed,
    IncorrectAmount,
    ActionNotFound,
    AlreadyPaid,
    TransactionNotFound,
    TransactionDoesNotExist,
    FailedToUpdate,
    BadRequest,
    Cancelled,
}

impl ClickCode {
    pub fn code(self) -> i32 {
        match self {
            ClickCode::SignCheckFailed => -1,
            ClickCode::IncorrectAmount => -2,
            ClickCode::ActionNotFound => -3,
            ClickCode::AlreadyPaid => -4,
            ClickCode::TransactionNotFound => -5,
            ClickCode::TransactionDoesNotExist => -6,
            ClickCode::FailedToUpdate => -7,
            ClickCode::BadRequest => -8,
            ClickCode::Cancelled => -9,
        }
    }

    pub fn note(self) -> &'static str {
        match self {
            ClickCode::SignCheckFailed => "SIGN CHECK FAILED!",
            ClickCode::IncorrectAmount => "Incorrect parameter amount",
            ClickCode::ActionNotFound => "Action not found",
            ClickCode::AlreadyPaid => "Already paid",
            ClickCode::TransactionNotFound => "Transaction not found",
            ClickCode::TransactionDoesNotExist => "Transaction does not exist",
            ClickCode::FailedToUpdate => "Failed to update user",
            ClickCode::BadRequest => "Error in request from click",
            ClickCode::Cancelled => "Transaction cancelled",
        }
    }
}

/// HTTP status plus envelope.
pub type ClickReply = (StatusCode, ClickResponse);

fn reply(req: &ClickRequest, code: ClickCode, status: StatusCode) -> ClickReply {
    (
        status,
        ClickResponse {
            click_trans_id: req.click_trans_id,
            merchant_trans_id: req.merchant_trans_id.clone(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error: code.code(),
            error_note: code.note().to_string(),
        },
    )
}

/// Click quotes the amount in major units; it must equal the stored amount.
fn amount_matches(req: &ClickRequest, tx: &Transaction) -> bool {
    Amount::from_major_str(&req.amount, tx.amount().currency()).is_ok_and(|quoted| quoted == tx.amount())
}

/// Code for a transaction that can no longer be prepared or completed.
fn closed_code(status: Status) -> Option<ClickCode> {
    match status {
        Status::Pending => None,
        Status::Completed | Status::PartiallyRefunded | Status::Refunded => {
            Some(ClickCode::AlreadyPaid)
        }
        Status::Canceled | Status::Failed => Some(ClickCode::Cancelled),
    }
}

/// Processes Click callbacks against the billing service.
pub struct ClickWebhook<'a, R: BillingRepository> {
    service: &'a BillingService<R>,
    config: &'a ClickConfig,
}

impl<'a, R: BillingRepository> ClickWebhook<'a, R> {
    pub fn new(service: &'a BillingService<R>, config: &'a ClickConfig) -> Self {
        Self { service, config }
    }

    /// Stage 1.
    #[tracing::instrument(skip(self, req), fields(click_trans_id = req.click_trans_id, merchant_trans_id = %req.merchant_trans_id))]
    pub async fn prepare(&self, req: ClickRequest) -> ClickReply {
        if req.action != ACTION_PREPARE {
            return reply(&req, ClickCode::ActionNotFound, StatusCode::BAD_REQUEST);
        }
        let (mut tx, details) = match self.lookup(&req).await {
            Ok(found) => found,
            Err(rejected) => return rejected,
        };

        let fields = ClickSignFields {
            click_trans_id: req.click_trans_id,
            service_id: req.service_id,
            secret_key: &self.config.secret_key,
            merchant_trans_id: &req.merchant_trans_id,
            merchant_prepare_id: None,
            amount: tx.amount().quantity(),
            action: req.action,
            sign_time: &req.sign_time,
        };
        if !verify_signature(&req.sign_string, || click_sign(&fields)) {
            tracing::warn!("click prepare signature mismatch");
            return reply(&req, ClickCode::SignCheckFailed, StatusCode::BAD_REQUEST);
        }
        if !amount_matches(&req, &tx) {
            tracing::warn!(amount = %req.amount, expected = %tx.amount(), "click prepare amount mismatch");
            return reply(&req, ClickCode::IncorrectAmount, StatusCode::BAD_REQUEST);
        }
        if let Some(code) = closed_code(tx.status()) {
            return reply(&req, code, StatusCode::BAD_REQUEST);
        }

        let prepare_id = tx.created_at().timestamp();
        let details = details
            .with_payment_id(req.click_trans_id)
            .with_merchant_prepare_id(prepare_id)
            .with_pay_doc_id(req.click_paydoc_id)
            .with_payment_status(req.action)
            .with_error(req.error, &req.error_note)
            .with_signature(&req.sign_time, &req.sign_string);
        if let Err(e) = tx
            .set_details(details.into())
            .and_then(|()| tx.transition(Status::Pending))
        {
            return self.failed(&req, e.into());
        }

        let saved = match self.service.save(tx).await {
            Ok(saved) => saved,
            Err(e) => return self.failed(&req, e),
        };

        if let Err(e) = self.service.invoke_callback(&saved).await {
            tracing::error!(error = %e, transaction_id = %saved.id(), "callback failed after click prepare");
            return self.degrade(&req, saved).await;
        }

        let details = saved.details().as_click().cloned().unwrap_or_default();
        tracing::info!(transaction_id = %saved.id(), prepare_id, "click prepare accepted");
        (
            StatusCode::OK,
            ClickResponse {
                click_trans_id: req.click_trans_id,
                merchant_trans_id: req.merchant_trans_id,
                merchant_prepare_id: Some(prepare_id),
                merchant_confirm_id: None,
                error: details.error_code,
                error_note: details.error_note,
            },
        )
    }

    /// Stage 2.
    #[tracing::instrument(skip(self, req), fields(click_trans_id = req.click_trans_id, merchant_trans_id = %req.merchant_trans_id))]
    pub async fn complete(&self, req: ClickRequest) -> ClickReply {
        if req.action != ACTION_COMPLETE {
            return reply(&req, ClickCode::ActionNotFound, StatusCode::BAD_REQUEST);
        }
        let (mut tx, details) = match self.lookup(&req).await {
            Ok(found) => found,
            Err(rejected) => return rejected,
        };

        let (Some(payment_id), Some(prepare_id)) = (details.payment_id, details.merchant_prepare_id)
        else {
            return reply(&req, ClickCode::TransactionDoesNotExist, StatusCode::BAD_REQUEST);
        };
        if req.merchant_prepare_id != Some(prepare_id) {
            return reply(&req, ClickCode::TransactionDoesNotExist, StatusCode::BAD_REQUEST);
        }

        let fields = ClickSignFields {
            click_trans_id: payment_id,
            service_id: req.service_id,
            secret_key: &self.config.secret_key,
            merchant_trans_id: &req.merchant_trans_id,
            merchant_prepare_id: Some(prepare_id),
            amount: tx.amount().quantity(),
            action: req.action,
            sign_time: &req.sign_time,
        };
        if !verify_signature(&req.sign_string, || click_sign(&fields)) {
            tracing::warn!("click complete signature mismatch");
            return reply(&req, ClickCode::SignCheckFailed, StatusCode::BAD_REQUEST);
        }
        if !amount_matches(&req, &tx) {
            tracing::warn!(amount = %req.amount, expected = %tx.amount(), "click complete amount mismatch");
            return reply(&req, ClickCode::IncorrectAmount, StatusCode::BAD_REQUEST);
        }
        if let Some(code) = closed_code(tx.status()) {
            return reply(&req, code, StatusCode::BAD_REQUEST);
        }

        let confirm_id = Utc::now().timestamp();
        let target = if req.error == 0 {
            Status::Completed
        } else {
            Status::Failed
        };
        let details = details
            .with_merchant_confirm_id(confirm_id)
            .with_payment_status(req.action)
            .with_error(req.error, &req.error_note);
        if let Err(e) = tx
            .set_details(details.into())
            .and_then(|()| tx.transition(target))
        {
            return self.failed(&req, e.into());
        }

        let saved = match self.service.save(tx).await {
            Ok(saved) => saved,
            Err(e) => return self.failed(&req, e),
        };

        // The transition is committed; a failed notification cannot undo it.
        if let Err(e) = self.service.invoke_callback(&saved).await {
            tracing::error!(error = %e, transaction_id = %saved.id(), "callback failed after click complete");
        }

        let details = saved.details().as_click().cloned().unwrap_or_default();
        tracing::info!(transaction_id = %saved.id(), status = %saved.status(), "click complete processed");
        (
            StatusCode::OK,
            ClickResponse {
                click_trans_id: req.click_trans_id,
                merchant_trans_id: req.merchant_trans_id,
                merchant_prepare_id: Some(prepare_id),
                merchant_confirm_id: Some(confirm_id),
                error: details.error_code,
                error_note: details.error_note,
            },
        )
    }

    /// Exactly one Click transaction must carry `merchant_trans_id`.
    async fn lookup(&self, req: &ClickRequest) -> Result<(Transaction, ClickDetails), ClickReply> {
        let filters = [DetailsFieldFilter::equal(
            ["merchant_trans_id"],
            req.merchant_trans_id.clone(),
        )];
        let tx = match self
            .service
            .find_one_by_details(Gateway::Click, &filters)
            .await
        {
            Ok(tx) => tx,
            Err(LookupError::Repo(e)) => {
                tracing::error!(error = %e, "click lookup failed");
                return Err(reply(
                    req,
                    ClickCode::FailedToUpdate,
                    StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "click transaction lookup rejected");
                return Err(reply(req, ClickCode::TransactionNotFound, StatusCode::BAD_REQUEST));
            }
        };
        match (tx.gateway(), tx.details().as_click().cloned()) {
            (Gateway::Click, Some(details)) => Ok((tx, details)),
            _ => Err(reply(req, ClickCode::TransactionNotFound, StatusCode::BAD_REQUEST)),
        }
    }

    fn failed(&self, req: &ClickRequest, err: AppError) -> ClickReply {
        match err {
            AppError::Conflict(msg) => {
                tracing::warn!(error = %msg, "click transition refused");
                reply(req, ClickCode::AlreadyPaid, StatusCode::BAD_REQUEST)
            }
            other => {
                tracing::error!(error = %other, "click callback processing failed");
                reply(req, ClickCode::FailedToUpdate, StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Records an outward callback failure on a prepared transaction.
    async fn degrade(&self, req: &ClickRequest, mut tx: Transaction) -> ClickReply {
        let code = ClickCode::FailedToUpdate;
        let details = tx
            .details()
            .as_click()
            .cloned()
            .unwrap_or_default()
            .with_error(code.code(), code.note());
        if let Err(e) = tx
            .set_details(details.into())
            .and_then(|()| tx.transition(Status::Failed))
        {
            return self.failed(req, e.into());
        }
        match self.service.save(tx).await {
            Ok(_) => reply(req, code, StatusCode::OK),
            Err(e) => self.failed(req, e),
        }
    }
}

fn click_config<R: BillingRepository>(state: &AppState<R>) -> Result<&ClickConfig, ApiError> {
    state
        .gateways
        .click
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("gateway not configured: click".into()).into())
}

fn malformed(rejection: FormRejection) -> Response {
    tracing::warn!(error = %rejection, "malformed click callback");
    let code = ClickCode::BadRequest;
    (
        StatusCode::BAD_REQUEST,
        Json(ClickResponse {
            click_trans_id: 0,
            merchant_trans_id: String::new(),
            merchant_prepare_id: None,
            merchant_confirm_id: None,
            error: code.code(),
            error_note: code.note().to_string(),
        }),
    )
        .into_response()
}

/// `POST /billing/click/prepare`
pub async fn click_prepare<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    form: Result<Form<ClickRequest>, FormRejection>,
) -> Result<Response, ApiError> {
    let config = click_config(&state)?;
    let Form(req) = match form {
        Ok(form) => form,
        Err(rejection) => return Ok(malformed(rejection)),
    };
    let (status, body) = ClickWebhook::new(&state.service, config).prepare(req).await;
    Ok((status, Json(body)).into_response())
}

/// `POST /billing/click/complete`
pub async fn click_complete<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    form: Result<Form<ClickRequest>, FormRejection>,
) -> Result<Response, ApiError> {
    let config = click_config(&state)?;
    let Form(req) = match form {
        Ok(form) => form,
        Err(rejection) => return Ok(malformed(rejection)),
    };
    let (status, body) = ClickWebhook::new(&state.service, config).complete(req).await;
    Ok((status, Json(body)).into_response())
}
