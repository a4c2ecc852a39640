//! Stripe webhook events.
//!
//! Stripe retries any non-2xx delivery, so only failures a retry can fix
//! (storage errors) answer 500. Everything else is acknowledged and logged.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use billing_types::{
    Amount, AppError, BillingRepository, Currency, DetailsFieldFilter, Gateway, Status,
    StripeDetails, Transaction,
};

use crate::BillingService;
use crate::inbound::handlers::{ApiError, AppState};
use crate::outbound::StripeConfig;
use crate::security::verify_stripe_signature;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

const BILLING_REASON_SUBSCRIPTION_CREATE: &str = "subscription_create";

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckoutSession {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    invoice: Option<String>,
    payment_intent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Invoice {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    billing_reason: Option<String>,
    amount_due: i64,
    currency: String,
    hosted_invoice_url: Option<String>,
    lines: InvoiceLines,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvoiceLines {
    data: Vec<InvoiceLine>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvoiceLine {
    subscription: Option<String>,
    parent: Option<LineParent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LineParent {
    subscription_item_details: Option<SubscriptionItemDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SubscriptionItemDetails {
    subscription: Option<String>,
}

impl Invoice {
    /// The subscription this invoice bills, from the invoice or its lines.
    fn subscription_id(&self) -> Option<String> {
        self.subscription.clone().or_else(|| {
            self.lines.data.iter().find_map(|line| {
                line.parent
                    .as_ref()
                    .and_then(|p| p.subscription_item_details.as_ref())
                    .and_then(|d| d.subscription.clone())
                    .or_else(|| line.subscription.clone())
            })
        })
    }
}

fn object<T: DeserializeOwned>(event: Event) -> Result<T, AppError> {
    serde_json::from_value(event.data.object)
        .map_err(|e| AppError::BadRequest(format!("malformed {} object: {e}", event.kind)))
}

fn stripe_details(tx: &Transaction) -> Result<StripeDetails, AppError> {
    tx.details()
        .as_stripe()
        .cloned()
        .ok_or_else(|| AppError::BadRequest("transaction does not carry stripe details".into()))
}

pub struct StripeWebhook<'a, R: BillingRepository> {
    service: &'a BillingService<R>,
    config: &'a StripeConfig,
}

impl<'a, R: BillingRepository> StripeWebhook<'a, R> {
    pub fn new(service: &'a BillingService<R>, config: &'a StripeConfig) -> Self {
        Self { service, config }
    }

    /// Verifies and applies one event; the result is the HTTP status to
    /// answer Stripe with.
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> StatusCode {
        let verified = signature
            .is_some_and(|header| verify_stripe_signature(payload, header, &self.config.signing_secret));
        if !verified {
            tracing::warn!("stripe webhook signature rejected");
            return StatusCode::BAD_REQUEST;
        }
        let event: Event = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable stripe event");
                return StatusCode::BAD_REQUEST;
            }
        };

        let kind = event.kind.clone();
        match self.apply(event).await {
            Ok(()) => StatusCode::OK,
            Err(err @ AppError::Internal { .. }) => {
                tracing::error!(event = %kind, error = %err, "stripe event not stored");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Err(err) => {
                tracing::warn!(event = %kind, error = %err, "stripe event ignored");
                StatusCode::OK
            }
        }
    }

    #[tracing::instrument(skip_all, fields(event = %event.kind))]
    async fn apply(&self, event: Event) -> Result<(), AppError> {
        let kind = event.kind.clone();
        match kind.as_str() {
            "checkout.session.completed" => self.checkout_completed(object(event)?).await,
            "invoice.created" => self.invoice_created(object(event)?).await,
            "invoice.payment_succeeded" => self.invoice_settled(object(event)?, Status::Completed).await,
            "invoice.payment_failed" => self.invoice_settled(object(event)?, Status::Failed).await,
            other => {
                tracing::debug!(event = other, "stripe event not handled");
                Ok(())
            }
        }
    }

    /// Oldest transaction whose `field` equals `value`.
    async fn first_by(&self, field: &str, value: &str) -> Result<Option<Transaction>, AppError> {
        let filters = [DetailsFieldFilter::equal([field], value)];
        let found = self
            .service
            .find_by_details(Gateway::Stripe, &filters)
            .await?;
        Ok(found.into_iter().next())
    }

    async fn checkout_completed(&self, session: CheckoutSession) -> Result<(), AppError> {
        let filters = [DetailsFieldFilter::equal(["session_id"], session.id.as_str())];
        let mut tx = self
            .service
            .find_one_by_details(Gateway::Stripe, &filters)
            .await
            .map_err(AppError::lookup)?;

        let mut details = stripe_details(&tx)?;
        if let Some(customer) = session.customer {
            details = details.with_customer_id(customer);
        }
        if let Some(subscription) = session.subscription {
            details = details.with_subscription_id(subscription);
        }
        if let Some(invoice) = session.invoice {
            details.invoice_id = Some(invoice);
        }
        if let Some(intent) = session.payment_intent {
            details = details.with_payment_intent_id(intent);
        }
        tx.set_details(details.into())?;
        tx.transition(Status::Completed)?;
        let saved = self.service.save(tx).await?;
        tracing::info!(transaction_id = %saved.id(), session_id = %session.id, "checkout completed");
        self.notify(&saved).await;
        Ok(())
    }

    async fn invoice_settled(&self, invoice: Invoice, status: Status) -> Result<(), AppError> {
        if invoice.id.is_empty() {
            return Err(AppError::BadRequest("invoice without id".into()));
        }
        let filters = [DetailsFieldFilter::equal(["invoice_id"], invoice.id.as_str())];
        let mut tx = self
            .service
            .find_one_by_details(Gateway::Stripe, &filters)
            .await
            .map_err(AppError::lookup)?;

        let mut details = stripe_details(&tx)?.with_invoice(invoice.id.clone(), invoice.billing_reason);
        if let Some(customer) = invoice.customer {
            details = details.with_customer_id(customer);
        }
        tx.set_details(details.into())?;
        tx.transition(status)?;
        let saved = self.service.save(tx).await?;
        tracing::info!(transaction_id = %saved.id(), invoice_id = %invoice.id, status = %status, "invoice settled");
        self.notify(&saved).await;
        Ok(())
    }

    /// Records a renewal invoice as a new pending transaction on the
    /// subscription's tenant.
    async fn invoice_created(&self, invoice: Invoice) -> Result<(), AppError> {
        if invoice.billing_reason.as_deref() == Some(BILLING_REASON_SUBSCRIPTION_CREATE) {
            // The first invoice belongs to the checkout transaction.
            return Ok(());
        }
        let Some(subscription_id) = invoice.subscription_id() else {
            return Err(AppError::BadRequest(format!(
                "invoice {} names no subscription",
                invoice.id
            )));
        };
        let recorded = [DetailsFieldFilter::equal(["invoice_id"], invoice.id.as_str())];
        if !self.service.find_by_details(Gateway::Stripe, &recorded).await?.is_empty() {
            tracing::debug!(invoice_id = %invoice.id, "invoice already recorded");
            return Ok(());
        }
        let Some(previous) = self.first_by("subscription_id", &subscription_id).await? else {
            return Err(AppError::NotFound(format!(
                "no transaction for subscription {subscription_id}"
            )));
        };
        let previous_details = stripe_details(&previous)?;

        let mut details = StripeDetails::new(previous_details.client_reference_id.clone())
            .with_mode(previous_details.mode)
            .with_invoice(invoice.id.clone(), invoice.billing_reason)
            .with_subscription_id(subscription_id);
        if let Some(url) = invoice.hosted_invoice_url {
            details = details.with_url(url);
        }
        if let Some(customer) = invoice.customer {
            details = details.with_customer_id(customer);
        }

        let currency: Currency = invoice.currency.parse()?;
        let tx = Transaction::new(
            previous.tenant_id(),
            Amount::new(invoice.amount_due, currency)?,
            Gateway::Stripe,
            details.into(),
        )?;
        match self.service.record(tx).await {
            Ok(saved) => {
                tracing::info!(transaction_id = %saved.id(), invoice_id = %invoice.id, "renewal invoice recorded");
                Ok(())
            }
            // A concurrent delivery of the same event stored it first.
            Err(AppError::Conflict(msg)) => {
                tracing::debug!(invoice_id = %invoice.id, reason = %msg, "invoice already recorded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn notify(&self, tx: &Transaction) {
        if let Err(e) = self.service.invoke_callback(tx).await {
            tracing::error!(error = %e, transaction_id = %tx.id(), "callback failed after stripe update");
        }
    }
}

/// `POST /billing/stripe`
pub async fn stripe<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let config = state
        .gateways
        .stripe
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("gateway not configured: stripe".into()))?;
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    Ok(StripeWebhook::new(&state.service, config)
        .handle(&body, signature)
        .await)
}
