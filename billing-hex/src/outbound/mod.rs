//! Outbound adapters: gateway providers, the outward HTTP callback and the
//! event publisher.

pub mod callback;
pub mod click;
pub mod events;
pub mod octo;
pub mod payme;
pub mod stripe;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use billing_types::{AppError, DomainError, Gateway, GatewayProvider, ProviderError, Transaction};

pub use callback::HttpCallback;
pub use click::{ClickConfig, ClickProvider};
pub use events::BroadcastPublisher;
pub use octo::{OctoConfig, OctoProvider};
pub use payme::{PaymeConfig, PaymeProvider};
pub use stripe::{StripeConfig, StripeProvider};

/// Default bound on any single gateway call.
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// Provider registry
// ─────────────────────────────────────────────────────────────────────────────

/// How a gateway's operations are carried out.
pub enum Provider {
    /// Through the gateway's remote API.
    Remote(Arc<dyn GatewayProvider>),
    /// Entirely in this service (cash, custom integrations).
    Local,
}

/// Maps each remote gateway to its configured provider.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<Gateway, Arc<dyn GatewayProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider under the gateway it reports.
    pub fn with_provider(mut self, provider: Arc<dyn GatewayProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn GatewayProvider>) {
        tracing::debug!(gateway = %provider.gateway(), "gateway provider registered");
        self.providers.insert(provider.gateway(), provider);
    }

    /// Resolves `gateway`. A remote gateway without a provider is a
    /// configuration gap, reported to the caller.
    pub fn resolve(&self, gateway: Gateway) -> Result<Provider, AppError> {
        if !gateway.is_remote() {
            return Ok(Provider::Local);
        }
        self.providers
            .get(&gateway)
            .cloned()
            .map(Provider::Remote)
            .ok_or_else(|| AppError::BadRequest(format!("gateway not configured: {gateway}")))
    }

    pub fn is_configured(&self, gateway: Gateway) -> bool {
        !gateway.is_remote() || self.providers.contains_key(&gateway)
    }

    /// Remote gateways with a provider, in name order.
    pub fn configured(&self) -> Vec<Gateway> {
        let mut gateways: Vec<Gateway> = self.providers.keys().copied().collect();
        gateways.sort_by_key(|g| g.to_string());
        gateways
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared HTTP plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the client every provider shares.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Classifies a transport failure.
pub(crate) fn send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Reads a JSON body, turning non-2xx answers into `Rejected`.
pub(crate) async fn read_json<T: DeserializeOwned>(
    gateway: Gateway,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        tracing::error!(%gateway, status = status.as_u16(), error = %message, "gateway rejected request");
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            message,
        });
    }
    response.json().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::Timeout(e.to_string())
        } else {
            ProviderError::InvalidResponse(format!("{gateway}: {e}"))
        }
    })
}

/// Major-unit value for gateways that speak decimals.
pub(crate) fn major_units(amount: billing_types::Amount) -> f64 {
    amount.quantity() as f64 / 10_f64.powi(amount.currency().decimal_places() as i32)
}

pub(crate) fn details_mismatch(tx: &Transaction, expected: Gateway) -> ProviderError {
    ProviderError::Domain(DomainError::GatewayDetailsMismatch {
        gateway: expected,
        details: tx.details().gateway(),
    })
}
