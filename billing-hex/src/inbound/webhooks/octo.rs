//! Octo payment notifications.

use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::{Value, json};

use billing_types::{AppError, BillingRepository, DetailsFieldFilter, Gateway, Status, Transaction};

use crate::BillingService;
use crate::inbound::handlers::{ApiError, AppState};
use crate::outbound::OctoConfig;
use crate::security::{octo_sign, verify_signature};

pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_CANCELED: &str = "canceled";
pub const STATUS_WAITING_FOR_CAPTURE: &str = "waiting_for_capture";

/// Body Octo posts to the notify URL.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OctoNotification {
    pub shop_transaction_id: String,
    #[serde(rename = "octo_payment_UUID")]
    pub octo_payment_uuid: String,
    pub status: String,
    pub signature: String,
    pub hash_key: String,
    pub total_sum: f64,
    pub transfer_sum: f64,
    pub refunded_sum: f64,
    pub card_country: String,
    pub card_type: String,
    pub is_physical_card: bool,
    pub masked_pan: String,
    pub rrn: String,
    #[serde(rename = "riskLevel")]
    pub risk_level: i32,
    pub payed_time: String,
}

fn target_status(octo_status: &str) -> Option<Status> {
    match octo_status {
        STATUS_SUCCEEDED => Some(Status::Completed),
        STATUS_CANCELED => Some(Status::Canceled),
        _ => None,
    }
}

pub struct OctoWebhook<'a, R: BillingRepository> {
    service: &'a BillingService<R>,
    config: &'a OctoConfig,
}

impl<'a, R: BillingRepository> OctoWebhook<'a, R> {
    pub fn new(service: &'a BillingService<R>, config: &'a OctoConfig) -> Self {
        Self { service, config }
    }

    /// Applies one notification and returns the body Octo expects back.
    #[tracing::instrument(skip_all, fields(shop_transaction_id = %n.shop_transaction_id, status = %n.status))]
    pub async fn handle(&self, n: OctoNotification) -> Result<Value, AppError> {
        let signed = verify_signature(&n.signature, || {
            octo_sign(&self.config.unique_key, &n.octo_payment_uuid, &n.status)
        });
        if !signed {
            tracing::warn!("octo notification signature rejected");
            return Err(AppError::BadRequest("invalid signature".into()));
        }

        let filters = [DetailsFieldFilter::equal(
            ["shop_transaction_id"],
            n.shop_transaction_id.as_str(),
        )];
        let mut tx = self
            .service
            .find_one_by_details(Gateway::Octo, &filters)
            .await
            .map_err(AppError::lookup)?;
        let details = tx
            .details()
            .as_octo()
            .cloned()
            .ok_or_else(|| AppError::BadRequest("transaction does not carry octo details".into()))?;
        if !details.octo_payment_uuid.is_empty() && details.octo_payment_uuid != n.octo_payment_uuid {
            return Err(AppError::BadRequest("payment uuid does not match".into()));
        }

        let details = details
            .with_status(n.status.clone())
            .with_card(n.card_type, n.card_country, n.masked_pan, n.is_physical_card)
            .with_rrn(n.rrn)
            .with_risk_level(n.risk_level)
            .with_sums(n.refunded_sum, n.transfer_sum)
            .with_signature(n.signature, n.hash_key)
            .with_payed_time(n.payed_time);
        let mut details = details;
        if details.octo_payment_uuid.is_empty() {
            details.octo_payment_uuid = n.octo_payment_uuid;
        }
        tx.set_details(details.into())?;

        let target = target_status(&n.status);
        if let Some(status) = target {
            tx.transition(status)?;
        }
        let saved = self.service.save(tx).await?;
        tracing::info!(transaction_id = %saved.id(), status = %saved.status(), "octo notification applied");

        if target.is_some() {
            self.notify(&saved).await;
        }
        if n.status == STATUS_WAITING_FOR_CAPTURE {
            return Ok(json!({ "accept_status": "capture" }));
        }
        Ok(json!({}))
    }

    async fn notify(&self, tx: &Transaction) {
        if let Err(e) = self.service.invoke_callback(tx).await {
            tracing::error!(error = %e, transaction_id = %tx.id(), "callback failed after octo update");
        }
    }
}

/// `POST /billing/octo`
pub async fn octo<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Json(notification): Json<OctoNotification>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state
        .gateways
        .octo
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("gateway not configured: octo".into()))?;
    let reply = OctoWebhook::new(&state.service, config)
        .handle(notification)
        .await?;
    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::{BroadcastPublisher, ProviderRegistry};
    use billing_repo::SqliteRepo;
    use billing_types::{Amount, Currency, OctoDetails, TenantId};

    async fn setup() -> (BillingService<SqliteRepo>, OctoConfig) {
        let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
        let service = BillingService::new(
            repo,
            ProviderRegistry::new(),
            Arc::new(BroadcastPublisher::default()),
        );
        (service, OctoConfig::new(42, "secret", "unique"))
    }

    async fn seed(service: &BillingService<SqliteRepo>, shop_id: &str) -> Transaction {
        let tx = Transaction::new(
            TenantId::new(),
            Amount::new(150_000, Currency::UZS).unwrap(),
            Gateway::Octo,
            OctoDetails::new(shop_id)
                .with_payment("uuid-1", "https://pay.octo.uz/uuid-1")
                .into(),
        )
        .unwrap();
        service.record(tx).await.unwrap()
    }

    fn notification(shop_id: &str, status: &str) -> OctoNotification {
        OctoNotification {
            shop_transaction_id: shop_id.to_string(),
            octo_payment_uuid: "uuid-1".to_string(),
            status: status.to_string(),
            signature: octo_sign("unique", "uuid-1", status),
            card_type: "UZCARD".to_string(),
            masked_pan: "8600****1234".to_string(),
            rrn: "123456789012".to_string(),
            risk_level: 2,
            transfer_sum: 1500.0,
            payed_time: "2025-01-01 12:00:00".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_succeeded_completes_and_stores_card() {
        let (service, config) = setup().await;
        let tx = seed(&service, "shop-1").await;
        let hook = OctoWebhook::new(&service, &config);

        let reply = hook.handle(notification("shop-1", STATUS_SUCCEEDED)).await.unwrap();
        assert_eq!(reply, json!({}));

        let stored = service.get(tx.tenant_id(), tx.id()).await.unwrap();
        assert_eq!(stored.status(), Status::Completed);
        let details = stored.details().as_octo().unwrap();
        assert_eq!(details.card_masked_pan, "8600****1234");
        assert_eq!(details.rrn, "123456789012");
        assert_eq!(details.risk_level, 2);
        assert_eq!(details.status, STATUS_SUCCEEDED);
    }

    #[tokio::test]
    async fn test_waiting_for_capture_asks_to_capture() {
        let (service, config) = setup().await;
        let tx = seed(&service, "shop-2").await;
        let hook = OctoWebhook::new(&service, &config);

        let reply = hook
            .handle(notification("shop-2", STATUS_WAITING_FOR_CAPTURE))
            .await
            .unwrap();
        assert_eq!(reply, json!({ "accept_status": "capture" }));

        let stored = service.get(tx.tenant_id(), tx.id()).await.unwrap();
        assert_eq!(stored.status(), Status::Pending);
    }

    #[tokio::test]
    async fn test_canceled_cancels() {
        let (service, config) = setup().await;
        let tx = seed(&service, "shop-3").await;
        let hook = OctoWebhook::new(&service, &config);

        hook.handle(notification("shop-3", STATUS_CANCELED)).await.unwrap();
        let stored = service.get(tx.tenant_id(), tx.id()).await.unwrap();
        assert_eq!(stored.status(), Status::Canceled);
    }

    #[tokio::test]
    async fn test_bad_signature_changes_nothing() {
        let (service, config) = setup().await;
        let tx = seed(&service, "shop-4").await;
        let hook = OctoWebhook::new(&service, &config);

        let mut forged = notification("shop-4", STATUS_SUCCEEDED);
        forged.signature = octo_sign("other", "uuid-1", STATUS_SUCCEEDED);
        let result = hook.handle(forged).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let stored = service.get(tx.tenant_id(), tx.id()).await.unwrap();
        assert_eq!(stored.status(), Status::Pending);
    }

    #[tokio::test]
    async fn test_unknown_shop_transaction() {
        let (service, config) = setup().await;
        let hook = OctoWebhook::new(&service, &config);
        let result = hook.handle(notification("ghost", STATUS_SUCCEEDED)).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
