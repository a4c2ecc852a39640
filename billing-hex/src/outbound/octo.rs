//! Octo provider: one-stage payments, capture cancellation and refunds.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use billing_types::{
    Amount, Gateway, GatewayProvider, OctoDetails, ProviderError, Transaction,
};

use super::{details_mismatch, major_units, read_json, send_error};

/// Octo shop configuration.
#[derive(Clone)]
pub struct OctoConfig {
    pub shop_id: i64,
    pub secret: String,
    /// Key Octo signs its notifications with.
    pub unique_key: String,
    pub notify_url: Option<String>,
    pub api_base_url: String,
}

impl OctoConfig {
    pub fn new(shop_id: i64, secret: impl Into<String>, unique_key: impl Into<String>) -> Self {
        Self {
            shop_id,
            secret: secret.into(),
            unique_key: unique_key.into(),
            notify_url: None,
            api_base_url: "https://secure.octo.uz".to_string(),
        }
    }

    pub fn with_notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = Some(url.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

impl std::fmt::Debug for OctoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctoConfig")
            .field("shop_id", &self.shop_id)
            .field("notify_url", &self.notify_url)
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct PreparePayment<'a> {
    octo_shop_id: i64,
    octo_secret: &'a str,
    shop_transaction_id: &'a str,
    auto_capture: bool,
    test: bool,
    init_time: String,
    total_sum: f64,
    currency: &'a str,
    description: &'a str,
    return_url: &'a str,
    notify_url: &'a str,
}

#[derive(Debug, Serialize)]
struct SetAccept<'a> {
    octo_shop_id: i64,
    octo_secret: &'a str,
    #[serde(rename = "octo_payment_UUID")]
    octo_payment_uuid: &'a str,
    accept_status: &'a str,
}

#[derive(Debug, Serialize)]
struct RefundRequest<'a> {
    octo_shop_id: i64,
    octo_secret: &'a str,
    shop_refund_id: String,
    #[serde(rename = "octo_payment_UUID")]
    octo_payment_uuid: &'a str,
    amount: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OctoData {
    #[serde(rename = "octo_payment_UUID")]
    octo_payment_uuid: String,
    status: String,
    octo_pay_url: String,
    refunded_sum: f64,
}

#[derive(Debug, Deserialize)]
struct OctoResponse {
    error: i32,
    #[serde(default, rename = "errMessage")]
    err_message: String,
    #[serde(default)]
    data: Option<OctoData>,
}

impl OctoResponse {
    fn into_data(self) -> Result<OctoData, ProviderError> {
        if self.error != 0 {
            return Err(ProviderError::Rejected {
                status: 200,
                message: format!("{}: {}", self.error, self.err_message),
            });
        }
        self.data
            .ok_or_else(|| ProviderError::InvalidResponse("octo response without data".into()))
    }
}

pub struct OctoProvider {
    config: OctoConfig,
    http_client: reqwest::Client,
}

impl OctoProvider {
    pub fn new(config: OctoConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn details(tx: &Transaction) -> Result<OctoDetails, ProviderError> {
        tx.details()
            .as_octo()
            .cloned()
            .ok_or_else(|| details_mismatch(tx, Gateway::Octo))
    }

    fn payment_uuid(details: &OctoDetails) -> Result<&str, ProviderError> {
        if details.octo_payment_uuid.is_empty() {
            return Err(ProviderError::Unsupported("no octo payment recorded".into()));
        }
        Ok(&details.octo_payment_uuid)
    }

    async fn post<B: Serialize>(&self, method: &str, body: &B) -> Result<OctoData, ProviderError> {
        let url = format!("{}/{}", self.config.api_base_url, method);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(send_error)?;
        let reply: OctoResponse = read_json(Gateway::Octo, response).await?;
        reply.into_data()
    }
}

#[async_trait]
impl GatewayProvider for OctoProvider {
    fn gateway(&self) -> Gateway {
        Gateway::Octo
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id()))]
    async fn create(&self, mut tx: Transaction) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        let shop_transaction_id = if details.shop_transaction_id.is_empty() {
            tx.id().to_string()
        } else {
            details.shop_transaction_id.clone()
        };
        let notify_url = if details.notify_url.is_empty() {
            self.config.notify_url.clone().unwrap_or_default()
        } else {
            details.notify_url.clone()
        };
        let init_time = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let data = self
            .post(
                "prepare_payment",
                &PreparePayment {
                    octo_shop_id: self.config.shop_id,
                    octo_secret: &self.config.secret,
                    shop_transaction_id: &shop_transaction_id,
                    auto_capture: details.auto_capture,
                    test: details.test,
                    init_time: init_time.clone(),
                    total_sum: major_units(tx.amount()),
                    currency: tx.amount().currency().as_str(),
                    description: &details.description,
                    return_url: &details.return_url,
                    notify_url: &notify_url,
                },
            )
            .await?;

        let return_url = details.return_url.clone();
        let details = OctoDetails {
            shop_transaction_id,
            ..details
        }
        .with_shop_id(self.config.shop_id)
        .with_payment(data.octo_payment_uuid, data.octo_pay_url)
        .with_status(data.status)
        .with_urls(return_url, notify_url)
        .with_init_time(init_time);
        tx.set_details(details.into())?;
        Ok(tx)
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id()))]
    async fn cancel(&self, mut tx: Transaction) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        let data = self
            .post(
                "set_accept",
                &SetAccept {
                    octo_shop_id: self.config.shop_id,
                    octo_secret: &self.config.secret,
                    octo_payment_uuid: Self::payment_uuid(&details)?,
                    accept_status: "cancel",
                },
            )
            .await?;
        tx.set_details(details.with_status(data.status).into())?;
        Ok(tx)
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id(), quantity = amount.quantity()))]
    async fn refund(&self, mut tx: Transaction, amount: Amount) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        let data = self
            .post(
                "refund",
                &RefundRequest {
                    octo_shop_id: self.config.shop_id,
                    octo_secret: &self.config.secret,
                    shop_refund_id: Uuid::new_v4().to_string(),
                    octo_payment_uuid: Self::payment_uuid(&details)?,
                    amount: major_units(amount),
                },
            )
            .await?;
        let transfer_sum = details.transfer_sum;
        let details = details
            .with_status(data.status)
            .with_sums(data.refunded_sum, transfer_sum);
        tx.set_details(details.into())?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_types::{Currency, Status, TenantId};
    use serde_json::json;

    fn provider(url: String) -> OctoProvider {
        OctoProvider::new(
            OctoConfig::new(42, "secret", "unique").with_base_url(url),
            reqwest::Client::new(),
        )
    }

    fn octo_tx(details: OctoDetails) -> Transaction {
        Transaction::new(
            TenantId::new(),
            Amount::new(150_000, Currency::UZS).unwrap(),
            Gateway::Octo,
            details.into(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_prepares_payment() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/prepare_payment")
            .match_body(mockito::Matcher::PartialJson(json!({
                "octo_shop_id": 42,
                "shop_transaction_id": "shop-1",
                "total_sum": 1500.0,
                "currency": "UZS"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":0,"data":{"octo_payment_UUID":"uuid-1","status":"created","octo_pay_url":"https://pay2.octo.uz/pay/uuid-1"}}"#,
            )
            .create_async()
            .await;

        let created = provider(server.url())
            .create(octo_tx(OctoDetails::new("shop-1")))
            .await
            .unwrap();

        mock.assert_async().await;
        let details = created.details().as_octo().unwrap();
        assert_eq!(details.octo_payment_uuid, "uuid-1");
        assert_eq!(details.octo_pay_url, "https://pay2.octo.uz/pay/uuid-1");
        assert_eq!(details.status, "created");
        assert_eq!(details.octo_shop_id, 42);
        assert_eq!(created.status(), Status::Pending);
    }

    #[tokio::test]
    async fn test_error_field_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/prepare_payment")
            .with_status(200)
            .with_body(r#"{"error":2,"errMessage":"Wrong secret"}"#)
            .create_async()
            .await;

        let result = provider(server.url())
            .create(octo_tx(OctoDetails::new("shop-2")))
            .await;
        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_cancel_without_payment_unsupported() {
        let result = provider("http://unused".into())
            .cancel(octo_tx(OctoDetails::new("shop-3")))
            .await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_refund_sends_major_units() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/refund")
            .match_body(mockito::Matcher::PartialJson(json!({
                "octo_payment_UUID": "uuid-4",
                "amount": 500.0
            })))
            .with_status(200)
            .with_body(r#"{"error":0,"data":{"status":"succeeded","refunded_sum":500.0}}"#)
            .create_async()
            .await;

        let mut tx = octo_tx(OctoDetails::new("shop-4").with_payment("uuid-4", "https://pay"));
        tx.transition(Status::Completed).unwrap();
        let refunded = provider(server.url())
            .refund(tx, Amount::new(50_000, Currency::UZS).unwrap())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(refunded.details().as_octo().unwrap().refunded_sum, 500.0);
    }
}
