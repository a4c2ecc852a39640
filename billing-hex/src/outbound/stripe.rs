//! Stripe provider: Checkout Sessions, session expiry and refunds.

use async_trait::async_trait;
use serde::Deserialize;

use billing_types::{
    Amount, Gateway, GatewayProvider, ProviderError, StripeDetails, StripeMode, Transaction,
};

use super::{details_mismatch, read_json, send_error};

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    pub secret_key: String,
    /// Webhook signing secret (whsec_...).
    pub signing_secret: String,
    pub api_base_url: String,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, signing_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            signing_secret: signing_secret.into(),
            api_base_url: "https://api.stripe.com".to_string(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_base_url", &self.api_base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    url: Option<String>,
    status: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Refund {
    id: String,
    status: String,
}

pub struct StripeProvider {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeProvider {
    pub fn new(config: StripeConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    fn details(tx: &Transaction) -> Result<StripeDetails, ProviderError> {
        tx.details()
            .as_stripe()
            .cloned()
            .ok_or_else(|| details_mismatch(tx, Gateway::Stripe))
    }

    /// Form parameters of a Checkout Session for `tx`.
    fn session_params(tx: &Transaction, details: &StripeDetails) -> Vec<(String, String)> {
        let mut params = vec![
            ("mode".to_string(), details.mode.as_str().to_string()),
            ("success_url".to_string(), details.success_url.clone()),
            ("cancel_url".to_string(), details.cancel_url.clone()),
            (
                "client_reference_id".to_string(),
                details.client_reference_id.clone(),
            ),
            ("metadata[transaction_id]".to_string(), tx.id().to_string()),
        ];

        if details.items.is_empty() && details.mode == StripeMode::Payment {
            // Ad-hoc price for the transaction amount.
            let currency = tx.amount().currency().as_str().to_ascii_lowercase();
            params.extend([
                ("line_items[0][quantity]".to_string(), "1".to_string()),
                ("line_items[0][price_data][currency]".to_string(), currency),
                (
                    "line_items[0][price_data][unit_amount]".to_string(),
                    tx.amount().quantity().to_string(),
                ),
                (
                    "line_items[0][price_data][product_data][name]".to_string(),
                    details.client_reference_id.clone(),
                ),
            ]);
        }
        for (i, item) in details.items.iter().enumerate() {
            params.push((format!("line_items[{i}][price]"), item.price_id.clone()));
            params.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
        }
        params
    }
}

#[async_trait]
impl GatewayProvider for StripeProvider {
    fn gateway(&self) -> Gateway {
        Gateway::Stripe
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id()))]
    async fn create(&self, mut tx: Transaction) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .form(&Self::session_params(&tx, &details))
            .send()
            .await
            .map_err(send_error)?;
        let session: CheckoutSession = read_json(Gateway::Stripe, response).await?;

        let mut details = details.with_session(session.id, session.url);
        if let Some(customer) = session.customer {
            details = details.with_customer_id(customer);
        }
        if let Some(subscription) = session.subscription {
            details = details.with_subscription_id(subscription);
        }
        if let Some(intent) = session.payment_intent {
            details = details.with_payment_intent_id(intent);
        }
        tx.set_details(details.into())?;
        Ok(tx)
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id()))]
    async fn cancel(&self, tx: Transaction) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        let session_id = details.session_id.as_deref().ok_or_else(|| {
            ProviderError::Unsupported("no checkout session to expire".into())
        })?;
        let url = format!(
            "{}/v1/checkout/sessions/{}/expire",
            self.config.api_base_url, session_id
        );

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(send_error)?;
        let session: CheckoutSession = read_json(Gateway::Stripe, response).await?;

        if session.status.as_deref() != Some("expired") {
            return Err(ProviderError::InvalidResponse(format!(
                "session {} not expired: {:?}",
                session.id, session.status
            )));
        }
        Ok(tx)
    }

    #[tracing::instrument(skip(self, tx), fields(transaction_id = %tx.id(), quantity = amount.quantity()))]
    async fn refund(&self, tx: Transaction, amount: Amount) -> Result<Transaction, ProviderError> {
        let details = Self::details(&tx)?;
        let intent = details.payment_intent_id.as_deref().ok_or_else(|| {
            ProviderError::Unsupported("no payment intent to refund".into())
        })?;
        let url = format!("{}/v1/refunds", self.config.api_base_url);
        let params = [
            ("payment_intent", intent.to_string()),
            ("amount", amount.quantity().to_string()),
        ];

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await
            .map_err(send_error)?;
        let refund: Refund = read_json(Gateway::Stripe, response).await?;

        if refund.status == "failed" || refund.status == "canceled" {
            return Err(ProviderError::Rejected {
                status: 200,
                message: format!("refund {} {}", refund.id, refund.status),
            });
        }
        tracing::info!(refund_id = %refund.id, status = %refund.status, "stripe refund accepted");
        Ok(tx)
    }
}
