//! Event publication and outward callback ports.

use crate::domain::{BillingEvent, Transaction};
use crate::error::CallbackError;

/// Consumer of domain events. Publishing never fails the operation that
/// produced the event.
pub trait EventPublisher: Send + Sync + 'static {
    fn publish(&self, event: BillingEvent);
}

/// Application hook notified with the current transaction state.
#[async_trait::async_trait]
pub trait TransactionCallback: Send + Sync + 'static {
    async fn call(&self, transaction: &Transaction) -> Result<(), CallbackError>;
}
