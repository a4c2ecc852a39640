//! Gateway provider port.

use crate::domain::{Amount, Gateway, Transaction};
use crate::error::ProviderError;

/// Remote capability of a gateway.
///
/// Each call takes the current transaction and returns it with `details`
/// updated from the gateway's answer. Providers never decide refund status;
/// the service does that from the requested amount.
#[async_trait::async_trait]
pub trait GatewayProvider: Send + Sync + 'static {
    fn gateway(&self) -> Gateway;

    /// Opens the remote session/transaction and records its identifiers.
    async fn create(&self, transaction: Transaction) -> Result<Transaction, ProviderError>;

    /// Asks the gateway to cancel. Only a synchronous confirmation may
    /// change the status.
    async fn cancel(&self, transaction: Transaction) -> Result<Transaction, ProviderError>;

    /// Requests a refund of `amount` through the gateway.
    async fn refund(
        &self,
        transaction: Transaction,
        amount: Amount,
    ) -> Result<Transaction, ProviderError>;
}
