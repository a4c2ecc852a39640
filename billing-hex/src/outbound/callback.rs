//! Outward HTTP callback delivering transaction state to the application.

use async_trait::async_trait;

use billing_types::{CallbackError, Transaction, TransactionCallback, TransactionResponse};

use crate::security::hmac_sha256_hex;

/// Header carrying the body's HMAC-SHA256 under the callback secret.
pub const SIGNATURE_HEADER: &str = "X-Billing-Signature";

/// POSTs the transaction JSON to a fixed URL, signed with a shared secret.
pub struct HttpCallback {
    http_client: reqwest::Client,
    url: String,
    secret: String,
}

impl HttpCallback {
    pub fn new(http_client: reqwest::Client, url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl TransactionCallback for HttpCallback {
    #[tracing::instrument(skip(self, transaction), fields(transaction_id = %transaction.id(), url = %self.url))]
    async fn call(&self, transaction: &Transaction) -> Result<(), CallbackError> {
        let body = serde_json::to_vec(&TransactionResponse::from(transaction))
            .map_err(|e| CallbackError::Handler(e.to_string()))?;
        let signature = hmac_sha256_hex(&body, &self.secret);

        let response = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| CallbackError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "callback endpoint refused delivery");
            return Err(CallbackError::Status(status.as_u16()));
        }
        Ok(())
    }
}
