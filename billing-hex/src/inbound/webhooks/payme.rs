//! Payme merchant API (JSON-RPC 2.0).
//!
//! Payme calls one endpoint with a method name; every answer is HTTP 200
//! and failures travel in the `error` member with Payme's numeric codes.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use billing_types::{
    AppError, BillingRepository, DetailsFieldFilter, Gateway, Params, PaymeDetails, PaymeState,
    Status, Transaction,
};

use crate::BillingService;
use crate::inbound::handlers::{ApiError, AppState};
use crate::outbound::PaymeConfig;
use crate::security::secure_eq;

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Error text in the three languages Payme shows to payers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizedMessage {
    pub ru: String,
    pub uz: String,
    pub en: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: LocalizedMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

/// Payme error codes used by this endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymeError {
    InsufficientPrivilege,
    NotPost,
    ParseError,
    MethodNotFound,
    Internal,
    InvalidAmount,
    TransactionNotFound,
    CannotPerform,
    InvalidAccount,
    OrderBusy,
}

impl PaymeError {
    pub fn code(self) -> i32 {
        match self {
            PaymeError::InsufficientPrivilege => -32504,
            PaymeError::NotPost => -32300,
            PaymeError::ParseError => -32700,
            PaymeError::MethodNotFound => -32601,
            PaymeError::Internal => -32400,
            PaymeError::InvalidAmount => -31001,
            PaymeError::TransactionNotFound => -31003,
            PaymeError::CannotPerform => -31008,
            PaymeError::InvalidAccount => -31050,
            PaymeError::OrderBusy => -31099,
        }
    }

    fn message(self) -> LocalizedMessage {
        let (ru, uz, en) = match self {
            PaymeError::InsufficientPrivilege => (
                "Недостаточно привилегий для выполнения метода",
                "Metodni bajarish uchun huquqlar yetarli emas",
                "Insufficient privilege to perform this method",
            ),
            PaymeError::NotPost => (
                "Метод запроса должен быть POST",
                "So'rov usuli POST bo'lishi kerak",
                "Request method must be POST",
            ),
            PaymeError::ParseError => (
                "Ошибка разбора JSON",
                "JSON tahlilida xatolik",
                "JSON parse error",
            ),
            PaymeError::MethodNotFound => ("Метод не найден", "Metod topilmadi", "Method not found"),
            PaymeError::Internal => ("Системная ошибка", "Tizim xatosi", "Internal system error"),
            PaymeError::InvalidAmount => ("Неверная сумма", "Noto'g'ri summa", "Invalid amount"),
            PaymeError::TransactionNotFound => (
                "Транзакция не найдена",
                "Tranzaksiya topilmadi",
                "Transaction not found",
            ),
            PaymeError::CannotPerform => (
                "Невозможно выполнить операцию",
                "Amalni bajarib bo'lmaydi",
                "Unable to perform operation",
            ),
            PaymeError::InvalidAccount => ("Неверный счёт", "Noto'g'ri hisob", "Invalid account"),
            PaymeError::OrderBusy => (
                "Заказ ожидает оплаты",
                "Buyurtma to'lovni kutmoqda",
                "Order is awaiting another payment",
            ),
        };
        LocalizedMessage {
            ru: ru.to_string(),
            uz: uz.to_string(),
            en: en.to_string(),
        }
    }

    fn into_rpc(self, data: Option<&str>) -> RpcError {
        RpcError {
            code: self.code(),
            message: self.message(),
            data: data.map(str::to_string),
        }
    }
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
            id,
        }
    }

    fn err(id: Value, error: PaymeError) -> Self {
        Self {
            result: None,
            error: Some(error.into_rpc(None)),
            id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccountParams {
    amount: f64,
    #[serde(default)]
    account: Params,
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    id: String,
    time: i64,
    amount: f64,
    #[serde(default)]
    account: Params,
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CancelParams {
    id: String,
    reason: i32,
}

#[derive(Debug, Deserialize)]
struct StatementParams {
    from: i64,
    to: i64,
}

type RpcResult = Result<Value, PaymeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Processor
// ─────────────────────────────────────────────────────────────────────────────

/// Text form of an account value, as stored filters compare it.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn params<T: DeserializeOwned>(value: Value) -> Result<T, PaymeError> {
    serde_json::from_value(value).map_err(|e| {
        tracing::warn!(error = %e, "invalid payme params");
        PaymeError::ParseError
    })
}

fn internal(err: AppError) -> PaymeError {
    tracing::error!(error = %err, "payme processing failed");
    PaymeError::Internal
}

/// The merchant-side reference echoed in `transaction` fields.
fn transaction_ref(tx: &Transaction, details: &PaymeDetails) -> String {
    if details.transaction.is_empty() {
        tx.id().to_string()
    } else {
        details.transaction.clone()
    }
}

fn reason_json(details: &PaymeDetails) -> Value {
    match details.reason {
        Some(reason) if reason != 0 => json!(reason),
        _ => Value::Null,
    }
}

fn amount_matches(tx: &Transaction, amount: f64) -> bool {
    (tx.amount().quantity() as f64 - amount).abs() < 1e-9
}

pub struct PaymeWebhook<'a, R: BillingRepository> {
    service: &'a BillingService<R>,
    config: &'a PaymeConfig,
}

impl<'a, R: BillingRepository> PaymeWebhook<'a, R> {
    pub fn new(service: &'a BillingService<R>, config: &'a PaymeConfig) -> Self {
        Self { service, config }
    }

    /// Authenticates, parses and dispatches one request.
    #[tracing::instrument(skip_all, fields(method = %method))]
    pub async fn handle(&self, method: &Method, authorization: Option<&str>, body: &[u8]) -> RpcResponse {
        if !self.authorized(authorization) {
            tracing::warn!("payme request with invalid credentials");
            return RpcResponse::err(Value::Null, PaymeError::InsufficientPrivilege);
        }
        if method != Method::POST {
            return RpcResponse::err(Value::Null, PaymeError::NotPost);
        }
        let req: RpcRequest = match serde_json::from_slice(body) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable payme request");
                return RpcResponse::err(Value::Null, PaymeError::ParseError);
            }
        };

        let id = req.id.clone();
        match self.dispatch(req).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(error) => RpcResponse::err(id, error),
        }
    }

    fn authorized(&self, authorization: Option<&str>) -> bool {
        let Some(encoded) = authorization.and_then(|h| h.strip_prefix("Basic ")) else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        secure_eq(
            &credentials,
            &format!("{}:{}", self.config.user, self.config.secret_key),
        )
    }

    async fn dispatch(&self, req: RpcRequest) -> RpcResult {
        tracing::debug!(method = %req.method, "payme call");
        match req.method.as_str() {
            "CheckPerformTransaction" => self.check_perform(params(req.params)?).await,
            "CreateTransaction" => self.create(params(req.params)?).await,
            "PerformTransaction" => self.perform(params(req.params)?).await,
            "CancelTransaction" => self.cancel(params(req.params)?).await,
            "CheckTransaction" => self.check(params(req.params)?).await,
            "GetStatement" => self.statement(params(req.params)?).await,
            _ => Err(PaymeError::MethodNotFound),
        }
    }

    /// The single order named by `account`.
    async fn by_account(&self, account: &Params) -> Result<(Transaction, PaymeDetails), PaymeError> {
        if account.is_empty() {
            return Err(PaymeError::InvalidAccount);
        }
        let filters: Vec<_> = account
            .iter()
            .map(|(key, value)| DetailsFieldFilter::equal(["account", key.as_str()], value_text(value)))
            .collect();
        let mut found = self
            .service
            .find_by_details(Gateway::Payme, &filters)
            .await
            .map_err(internal)?;
        if found.len() != 1 {
            tracing::warn!(matches = found.len(), "payme account lookup rejected");
            return Err(PaymeError::InvalidAccount);
        }
        let tx = found.remove(0);
        let details = tx
            .details()
            .as_payme()
            .cloned()
            .ok_or(PaymeError::Internal)?;
        Ok((tx, details))
    }

    /// The single transaction carrying Payme's id.
    async fn by_id(&self, id: &str) -> Result<(Transaction, PaymeDetails), PaymeError> {
        let filters = [DetailsFieldFilter::equal(["id"], id)];
        let mut found = self
            .service
            .find_by_details(Gateway::Payme, &filters)
            .await
            .map_err(internal)?;
        if found.len() != 1 {
            return Err(PaymeError::TransactionNotFound);
        }
        let tx = found.remove(0);
        let details = tx
            .details()
            .as_payme()
            .cloned()
            .ok_or(PaymeError::Internal)?;
        Ok((tx, details))
    }

    async fn store(&self, mut tx: Transaction, details: PaymeDetails, status: Option<Status>) -> Result<Transaction, PaymeError> {
        tx.set_details(details.into())
            .map_err(|e| internal(e.into()))?;
        if let Some(status) = status {
            tx.transition(status).map_err(|e| internal(e.into()))?;
        }
        self.service.save(tx).await.map_err(internal)
    }

    async fn notify(&self, tx: &Transaction) {
        if let Err(e) = self.service.invoke_callback(tx).await {
            tracing::error!(error = %e, transaction_id = %tx.id(), "callback failed after payme update");
        }
    }

    async fn check_perform(&self, p: AccountParams) -> RpcResult {
        let (tx, details) = self.by_account(&p.account).await?;
        if !amount_matches(&tx, p.amount) {
            return Err(PaymeError::InvalidAmount);
        }
        let open = matches!(details.state, PaymeState::NEW | PaymeState::CREATED);
        if !open || tx.status() != Status::Pending {
            return Err(PaymeError::CannotPerform);
        }
        Ok(json!({ "allow": true }))
    }

    async fn create(&self, p: CreateParams) -> RpcResult {
        let (tx, details) = self.by_account(&p.account).await?;
        if !amount_matches(&tx, p.amount) {
            return Err(PaymeError::InvalidAmount);
        }
        if details.id.as_deref().is_some_and(|existing| existing != p.id) {
            return Err(PaymeError::OrderBusy);
        }
        if tx.status() != Status::Pending || details.is_cancelled() || details.state == PaymeState::PERFORMED {
            return Err(PaymeError::CannotPerform);
        }

        let mut details = details
            .with_id(p.id)
            .with_time(p.time)
            .with_account(p.account)
            .with_state(PaymeState::CREATED);
        if details.create_time == 0 {
            details.create_time = Utc::now().timestamp_millis();
        }
        let saved = self.store(tx, details, None).await?;
        let details = saved.details().as_payme().cloned().unwrap_or_default();

        let mut result = json!({
            "create_time": details.create_time,
            "transaction": transaction_ref(&saved, &details),
            "state": details.state,
        });
        if !details.receivers.is_empty() {
            result["receivers"] = json!(details.receivers);
        }
        Ok(result)
    }

    async fn perform(&self, p: IdParams) -> RpcResult {
        let (tx, details) = self.by_id(&p.id).await?;
        let (tx, details) = match details.state {
            PaymeState::CREATED => {
                let details = details
                    .with_state(PaymeState::PERFORMED)
                    .with_perform_time(Utc::now().timestamp_millis());
                let saved = self.store(tx, details, Some(Status::Completed)).await?;
                self.notify(&saved).await;
                let details = saved.details().as_payme().cloned().unwrap_or_default();
                (saved, details)
            }
            PaymeState::PERFORMED => (tx, details),
            _ => return Err(PaymeError::CannotPerform),
        };
        Ok(json!({
            "transaction": transaction_ref(&tx, &details),
            "state": details.state,
            "perform_time": details.perform_time,
        }))
    }

    async fn cancel(&self, p: CancelParams) -> RpcResult {
        let (mut tx, details) = self.by_id(&p.id).await?;
        let (tx, details) = if details.is_cancelled() {
            (tx, details)
        } else {
            let state = if details.state == PaymeState::PERFORMED {
                PaymeState::CANCELLED_AFTER_PERFORM
            } else {
                PaymeState::CANCELLED_BEFORE_PERFORM
            };
            let mut details = details.with_state(state).with_reason(p.reason);
            if details.cancel_time == 0 {
                details.cancel_time = Utc::now().timestamp_millis();
            }
            let status = if state == PaymeState::CANCELLED_AFTER_PERFORM {
                // The payer got their money back: a full refund.
                let outstanding = tx.outstanding();
                tx.apply_refund(outstanding).map_err(|e| internal(e.into()))?;
                None
            } else {
                Some(Status::Canceled)
            };
            let saved = self.store(tx, details, status).await?;
            self.notify(&saved).await;
            let details = saved.details().as_payme().cloned().unwrap_or_default();
            (saved, details)
        };
        Ok(json!({
            "transaction": transaction_ref(&tx, &details),
            "cancel_time": details.cancel_time,
            "state": details.state,
        }))
    }

    async fn check(&self, p: IdParams) -> RpcResult {
        let (tx, details) = self.by_id(&p.id).await?;
        Ok(json!({
            "create_time": details.create_time,
            "perform_time": details.perform_time,
            "cancel_time": details.cancel_time,
            "transaction": transaction_ref(&tx, &details),
            "state": details.state,
            "reason": reason_json(&details),
        }))
    }

    async fn statement(&self, p: StatementParams) -> RpcResult {
        let filters = [DetailsFieldFilter::between(["time"], p.from, p.to)];
        let found = self
            .service
            .find_by_details(Gateway::Payme, &filters)
            .await
            .map_err(internal)?;

        let transactions: Vec<Value> = found
            .iter()
            .filter_map(|tx| {
                let details = tx.details().as_payme()?;
                let mut item = json!({
                    "id": details.id,
                    "transaction": transaction_ref(tx, details),
                    "time": details.time,
                    "amount": tx.amount().quantity(),
                    "account": details.account,
                    "create_time": details.create_time,
                    "perform_time": details.perform_time,
                    "cancel_time": details.cancel_time,
                    "state": details.state,
                    "reason": reason_json(details),
                });
                if !details.receivers.is_empty() {
                    item["receivers"] = json!(details.receivers);
                }
                Some(item)
            })
            .collect();
        Ok(json!({ "transactions": transactions }))
    }
}

/// `ANY /billing/payme`
pub async fn payme<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let config = state
        .gateways
        .payme
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("gateway not configured: payme".into()))?;
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let response = PaymeWebhook::new(&state.service, config)
        .handle(&method, authorization, &body)
        .await;
    Ok(Json(response).into_response())
}
