//! Click provider: hosted payment links and merchant API reversals.
//!
//! Click drives the payment itself through the prepare/complete callbacks,
//! so `create` only builds the link the payer is sent to.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::Deserialize;

use billing_types::{
    Amount, ClickDetails, Gateway, GatewayProvider, ProviderError, Transaction,
};

use super::{details_mismatch, read_json, send_error};
use crate::security::click_auth_digest;

const PAY_URL: &str = "https://my.click.uz/services/pay";

/// Click merchant configuration.
#[derive(Clone)]
pub struct ClickConfig {
    pub service_id: i64,
    pub merchant_id: i64,
    pub merchant_user_id: i64,
    pub secret_key: String,
    pub api_base_url: String,
}

impl ClickConfig {
    pub fn new(
        service_id: i64,
        merchant_id: i64,
        merchant_user_id: i64,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            service_id,
            merchant_id,
            merchant_user_id,
            secret_key: secret_key.into(),
            api_base_url: "https://api.click.uz/v2/merchant".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

impl std::fmt::Debug for ClickConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickConfig")
            .field("service_id", &self.service_id)
            .field("merchant_id", &self.merchant_id)
            .field("merchant_user_id", &self.merchant_user_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ReversalResponse {
    error_code: i32,
    #[serde(default)]
    error_note: String,
}

pub struct ClickProvider {
    config: ClickConfig,
    http_client: reqwest::Client,
}

impl ClickProvider {
    pub fn new(config: ClickConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &ClickConfig {
        &self.config
    }

    fn details(tx: &Transaction) -> Result<ClickDetails, ProviderError> {
        tx.details()
            .as_click()
            .cloned()
            .ok_or_else(|| details_mismatch(tx, Gateway::Click))
    }

    fn payment_link(&self, tx: &Transaction, details: &ClickDetails) -> Result<Url, ProviderError> {
        let mut params = vec![
            ("service_id", self.config.service_id.to_string()),
            ("merchant_id", self.config.merchant_id.to_string()),
            ("amount", tx.amount().to_major_string()),
            ("transaction_param", details.merchant_trans_id.clone()),
        ];
        if let Some(return_url) = &details.return_url {
            params.push(("return_url", return_url.clone()));
        }
        Url::parse_with_params(PAY_URL, &params)
            .map_err(|e| ProviderError::InvalidResponse(format!("payment link: {e}")))
    }

    /// `Auth` header value for the merchant API.
    fn auth_header(&self) -> String {
        let timestamp = Utc::now().timestamp();
        format!(
            "{}:{}:{}",
            self.config.merchant_user_id,
            click_auth_digest(timestamp, &self.config.secret_key),
            timestamp
        )
    }
}

#[async_trait]
impl GatewayProvider for ClickProvider {
    fn gateway(&self) -> Gateway {
        Gateway::Click
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id()))]
    async fn create(&self, mut tx: Transaction) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        if details.merchant_trans_id.is_empty() {
            return Err(billing_types::DomainError::Validation(
                "click details require merchant_trans_id".into(),
            )
            .into());
        }
        let link = self.payment_link(&tx, &details)?;
        let details = details
            .with_merchant(
                self.config.service_id,
                self.config.merchant_id,
                self.config.merchant_user_id,
            )
            .with_link(link.as_str());
        tx.set_details(details.into())?;
        Ok(tx)
    }

    async fn cancel(&self, _tx: Transaction) -> Result<Transaction, ProviderError> {
        Err(ProviderError::Unsupported(
            "click cancels through its callback protocol".into(),
        ))
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id(), quantity = amount.quantity()))]
    async fn refund(&self, tx: Transaction, amount: Amount) -> Result<Transaction, ProviderError> {
        if amount != tx.outstanding() || !tx.refunded().is_zero() {
            return Err(ProviderError::Unsupported(
                "click only reverses whole payments".into(),
            ));
        }
        let details = Self::details(&tx)?;
        let payment_id = details.payment_id.ok_or_else(|| {
            ProviderError::Unsupported("no click payment to reverse".into())
        })?;
        let url = format!(
            "{}/payment/reversal/{}/{}",
            self.config.api_base_url, self.config.service_id, payment_id
        );

        let response = self
            .http_client
            .delete(&url)
            .header("Accept", "application/json")
            .header("Auth", self.auth_header())
            .send()
            .await
            .map_err(send_error)?;
        let reversal: ReversalResponse = read_json(Gateway::Click, response).await?;

        if reversal.error_code != 0 {
            tracing::error!(error_code = reversal.error_code, error_note = %reversal.error_note, "click reversal refused");
            return Err(ProviderError::Rejected {
                status: 200,
                message: format!("{}: {}", reversal.error_code, reversal.error_note),
            });
        }
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_types::{Currency, Status, TenantId};

    fn provider(url: String) -> ClickProvider {
        ClickProvider::new(
            ClickConfig::new(100, 200, 300, "secret").with_base_url(url),
            reqwest::Client::new(),
        )
    }

    fn click_tx(details: ClickDetails) -> Transaction {
        Transaction::new(
            TenantId::new(),
            Amount::new(10_000, Currency::UZS).unwrap(),
            Gateway::Click,
            details.into(),
        )
        .unwrap()
    }

    fn completed(details: ClickDetails) -> Transaction {
        let mut tx = click_tx(details);
        tx.transition(Status::Completed).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_create_builds_payment_link() {
        let tx = click_tx(ClickDetails::new("INV-1").with_return_url("https://shop/done"));
        let created = provider("http://unused".into()).create(tx).await.unwrap();

        let details = created.details().as_click().unwrap();
        assert_eq!(details.service_id, 100);
        assert_eq!(details.merchant_id, 200);
        let link = Url::parse(&details.link).unwrap();
        let query: Vec<(String, String)> = link.query_pairs().into_owned().collect();
        assert!(query.contains(&("amount".into(), "100.00".into())));
        assert!(query.contains(&("transaction_param".into(), "INV-1".into())));
        assert!(query.contains(&("return_url".into(), "https://shop/done".into())));
    }

    #[tokio::test]
    async fn test_create_requires_merchant_trans_id() {
        let result = provider("http://unused".into())
            .create(click_tx(ClickDetails::default()))
            .await;
        assert!(matches!(result, Err(ProviderError::Domain(_))));
    }

    #[tokio::test]
    async fn test_partial_refund_unsupported() {
        let tx = completed(ClickDetails::new("INV-2").with_payment_id(5));
        let result = provider("http://unused".into())
            .refund(tx, Amount::new(1, Currency::UZS).unwrap())
            .await;
        assert!(matches!(result, Err(ProviderError::Unsupported(_))));
    }

    #[tokio::test]
    async fn test_full_refund_calls_reversal() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/payment/reversal/100/777")
            .match_header("auth", mockito::Matcher::Regex("^300:[0-9a-f]{40}:[0-9]+$".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error_code":0,"error_note":"Success","payment_id":777}"#)
            .create_async()
            .await;

        let tx = completed(ClickDetails::new("INV-3").with_payment_id(777));
        let amount = tx.amount();
        provider(server.url()).refund(tx, amount).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_reversal_error_code_is_rejection() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/payment/reversal/100/778")
            .with_status(200)
            .with_body(r#"{"error_code":-5017,"error_note":"Payment not found"}"#)
            .create_async()
            .await;

        let tx = completed(ClickDetails::new("INV-4").with_payment_id(778));
        let amount = tx.amount();
        let result = provider(server.url()).refund(tx, amount).await;
        assert!(matches!(result, Err(ProviderError::Rejected { .. })));
    }
}
