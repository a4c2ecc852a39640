//! Domain events emitted by billing operations.

use serde::Serialize;

use super::amount::Amount;
use super::transaction::Transaction;

/// Something that happened to a transaction, published after the write
/// that caused it has committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    Created {
        transaction: Transaction,
    },
    Updated {
        transaction: Transaction,
    },
    Refunded {
        original: Transaction,
        transaction: Transaction,
        amount: Amount,
    },
    Deleted {
        transaction: Transaction,
    },
}

impl BillingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            BillingEvent::Created { .. } => "created",
            BillingEvent::Updated { .. } => "updated",
            BillingEvent::Refunded { .. } => "refunded",
            BillingEvent::Deleted { .. } => "deleted",
        }
    }

    /// The resulting transaction the event carries.
    pub fn transaction(&self) -> &Transaction {
        match self {
            BillingEvent::Created { transaction }
            | BillingEvent::Updated { transaction }
            | BillingEvent::Refunded { transaction, .. }
            | BillingEvent::Deleted { transaction } => transaction,
        }
    }
}
