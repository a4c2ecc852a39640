use serde::{Deserialize, Serialize};

/// Checkout session mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StripeMode {
    #[default]
    Payment,
    Subscription,
    Setup,
}

impl StripeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StripeMode::Payment => "payment",
            StripeMode::Subscription => "subscription",
            StripeMode::Setup => "setup",
        }
    }
}

/// A checkout line item referencing a Stripe price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeItem {
    pub price_id: String,
    pub quantity: i64,
}

/// Stripe payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeDetails {
    pub client_reference_id: String,
    pub mode: StripeMode,
    pub session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub invoice_id: Option<String>,
    pub billing_reason: Option<String>,
    /// Hosted checkout or invoice URL.
    pub url: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub items: Vec<StripeItem>,
}

impl StripeDetails {
    pub fn new(client_reference_id: impl Into<String>) -> Self {
        Self {
            client_reference_id: client_reference_id.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: StripeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>, url: Option<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.url = url;
        self
    }

    pub fn with_payment_intent_id(mut self, id: impl Into<String>) -> Self {
        self.payment_intent_id = Some(id.into());
        self
    }

    pub fn with_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = Some(id.into());
        self
    }

    pub fn with_customer_id(mut self, id: impl Into<String>) -> Self {
        self.customer_id = Some(id.into());
        self
    }

    pub fn with_invoice(mut self, id: impl Into<String>, billing_reason: Option<String>) -> Self {
        self.invoice_id = Some(id.into());
        self.billing_reason = billing_reason;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_redirects(mut self, success_url: impl Into<String>, cancel_url: impl Into<String>) -> Self {
        self.success_url = success_url.into();
        self.cancel_url = cancel_url.into();
        self
    }

    pub fn with_item(mut self, price_id: impl Into<String>, quantity: i64) -> Self {
        self.items.push(StripeItem {
            price_id: price_id.into(),
            quantity,
        });
        self
    }
}
