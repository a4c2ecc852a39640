//! Payme provider: checkout links and receipt cancellation.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use billing_types::{
    Amount, DomainError, Gateway, GatewayProvider, PaymeDetails, PaymeState, ProviderError,
    Transaction,
};

use super::{details_mismatch, read_json, send_error};

/// Payme merchant configuration.
#[derive(Clone)]
pub struct PaymeConfig {
    pub merchant_id: String,
    /// Basic-auth user Payme presents on merchant callbacks.
    pub user: String,
    pub secret_key: String,
    pub checkout_url: String,
    pub api_url: String,
}

impl PaymeConfig {
    pub fn new(merchant_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            user: "Paycom".to_string(),
            secret_key: secret_key.into(),
            checkout_url: "https://checkout.paycom.uz".to_string(),
            api_url: "https://checkout.paycom.uz/api".to_string(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

impl std::fmt::Debug for PaymeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymeConfig")
            .field("merchant_id", &self.merchant_id)
            .field("user", &self.user)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

pub struct PaymeProvider {
    config: PaymeConfig,
    http_client: reqwest::Client,
}

impl PaymeProvider {
    pub fn new(config: PaymeConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn details(tx: &Transaction) -> Result<PaymeDetails, ProviderError> {
        tx.details()
            .as_payme()
            .cloned()
            .ok_or_else(|| details_mismatch(tx, Gateway::Payme))
    }

    /// `m=<merchant>;ac.<key>=<value>;...;a=<amount>` encoded into the
    /// checkout URL.
    fn checkout_link(&self, tx: &Transaction, details: &PaymeDetails) -> String {
        let mut parts = vec![format!("m={}", self.config.merchant_id)];
        for (key, value) in &details.account {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            parts.push(format!("ac.{key}={value}"));
        }
        parts.push(format!("a={}", tx.amount().quantity()));
        format!(
            "{}/{}",
            self.config.checkout_url,
            STANDARD.encode(parts.join(";"))
        )
    }

    /// Cancels the remote receipt and returns the updated details.
    async fn cancel_receipt(
        &self,
        tx: &Transaction,
        details: PaymeDetails,
    ) -> Result<PaymeDetails, ProviderError> {
        let receipt_id = details.id.clone().ok_or_else(|| {
            ProviderError::Unsupported("no payme receipt to cancel".into())
        })?;
        let body = json!({
            "id": Utc::now().timestamp_millis(),
            "method": "receipts.cancel",
            "params": { "id": receipt_id },
        });

        let response = self
            .http_client
            .post(&self.config.api_url)
            .header(
                "X-Auth",
                format!("{}:{}", self.config.merchant_id, self.config.secret_key),
            )
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;
        let rpc: RpcResponse = read_json(Gateway::Payme, response).await?;

        if let Some(error) = rpc.error {
            return Err(ProviderError::Rejected {
                status: 200,
                message: format!("{}: {}", error.code, error.message),
            });
        }
        if rpc.result.is_none() {
            return Err(ProviderError::InvalidResponse(
                "receipts.cancel returned neither result nor error".into(),
            ));
        }

        let state = if details.state == PaymeState::PERFORMED {
            PaymeState::CANCELLED_AFTER_PERFORM
        } else {
            PaymeState::CANCELLED_BEFORE_PERFORM
        };
        tracing::info!(transaction_id = %tx.id(), state, "payme receipt cancelled");
        Ok(details
            .with_state(state)
            .with_cancel_time(Utc::now().timestamp_millis()))
    }
}

#[async_trait]
impl GatewayProvider for PaymeProvider {
    fn gateway(&self) -> Gateway {
        Gateway::Payme
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id()))]
    async fn create(&self, mut tx: Transaction) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        if details.account.is_empty() {
            return Err(DomainError::Validation("payme details require an account".into()).into());
        }
        let link = self.checkout_link(&tx, &details);
        let details = details
            .with_merchant_id(self.config.merchant_id.clone())
            .with_link(link);
        tx.set_details(details.into())?;
        Ok(tx)
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id()))]
    async fn cancel(&self, mut tx: Transaction) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        let details = self.cancel_receipt(&tx, details).await?;
        tx.set_details(details.into())?;
        Ok(tx)
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id(), quantity = amount.quantity()))]
    async fn refund(&self, mut tx: Transaction, amount: Amount) -> Result<Transaction, ProviderError> {
        if amount != tx.amount() || !tx.refunded().is_zero() {
            return Err(ProviderError::Unsupported(
                "payme only cancels whole receipts".into(),
            ));
        }
        let details = Self::details(&tx)?;
        let details = self.cancel_receipt(&tx, details).await?;
        tx.set_details(details.into())?;
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_types::{Currency, Status, TenantId};

    fn provider(url: String) -> PaymeProvider {
        PaymeProvider::new(
            PaymeConfig::new("merchant-1", "key").with_api_url(url),
            reqwest::Client::new(),
        )
    }

    fn payme_tx(details: PaymeDetails) -> Transaction {
        Transaction::new(
            TenantId::new(),
            Amount::new(500_000, Currency::UZS).unwrap(),
            Gateway::Payme,
            details.into(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_encodes_checkout_link() {
        let tx = payme_tx(PaymeDetails::new("order-7").with_account_entry("order_id", json!("7")));
        let created = provider("http://unused".into()).create(tx).await.unwrap();

        let details = created.details().as_payme().unwrap();
        assert_eq!(details.merchant_id, "merchant-1");
        let encoded = details
            .link
            .strip_prefix("https://checkout.paycom.uz/")
            .unwrap();
        let decoded = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, "m=merchant-1;ac.order_id=7;a=500000");
    }

    #[tokio::test]
    async fn test_create_rejects_empty_account() {
        let result = provider("http://unused".into())
            .create(payme_tx(PaymeDetails::new("order-8")))
            .await;
        assert!(matches!(
            result,
            Err(ProviderError::Domain(DomainError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_without_receipt_unsupported() {
        let result = provider("http://unused".into())
            .cancel(payme_tx(PaymeDetails::new("order-9")))
            .await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_refund_cancels_performed_receipt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("x-auth", "merchant-1:key")
            .match_body(mockito::Matcher::PartialJson(json!({
                "method": "receipts.cancel",
                "params": { "id": "r-1" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":{"receipt":{"_id":"r-1","state":50}}}"#)
            .create_async()
            .await;

        let mut tx = payme_tx(
            PaymeDetails::new("order-10")
                .with_id("r-1")
                .with_state(PaymeState::PERFORMED),
        );
        tx.transition(Status::Completed).unwrap();
        let amount = tx.amount();
        let refunded = provider(server.url()).refund(tx, amount).await.unwrap();

        mock.assert_async().await;
        let details = refunded.details().as_payme().unwrap();
        assert_eq!(details.state, PaymeState::CANCELLED_AFTER_PERFORM);
        assert!(details.cancel_time > 0);
    }

    #[tokio::test]
    async fn test_rpc_error_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"error":{"code":-31602,"message":"Receipt not found"}}"#)
            .create_async()
            .await;

        let result = provider(server.url())
            .cancel(payme_tx(PaymeDetails::new("order-11").with_id("r-2")))
            .await;
        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }
}
