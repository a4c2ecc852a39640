//! Transaction aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Amount;
use super::details::TransactionDetails;
use super::gateway::Gateway;
use super::status::Status;
use crate::error::DomainError;

/// Unique identifier for a Transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random TransactionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Owning tenant. Every read and write is scoped by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A payment processed through one gateway.
///
/// `id`, `tenant_id`, `gateway` and `amount` never change after
/// construction. `details` always holds the variant matching `gateway`.
/// Status changes go through the transition table in [`Status`], and
/// refunds are accumulated in `refunded` rather than by touching `amount`.
///
/// `version` is the stored revision the value was read at; the repository
/// refuses to write a value whose version no longer matches the row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    id: TransactionId,
    tenant_id: TenantId,
    amount: Amount,
    refunded: Amount,
    status: Status,
    gateway: Gateway,
    details: TransactionDetails,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl Transaction {
    /// Creates a new `Pending` transaction.
    pub fn new(
        tenant_id: TenantId,
        amount: Amount,
        gateway: Gateway,
        details: TransactionDetails,
    ) -> Result<Self, DomainError> {
        ensure_details_match(gateway, &details)?;
        let now = Utc::now();
        Ok(Self {
            id: TransactionId::new(),
            tenant_id,
            amount,
            refunded: Amount::zero(amount.currency()),
            status: Status::Pending,
            gateway,
            details,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Reconstructs a transaction from stored fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransactionId,
        tenant_id: TenantId,
        amount: Amount,
        refunded: Amount,
        status: Status,
        gateway: Gateway,
        details: TransactionDetails,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        ensure_details_match(gateway, &details)?;
        if refunded.currency() != amount.currency() {
            return Err(DomainError::CurrencyMismatch {
                expected: amount.currency(),
                got: refunded.currency(),
            });
        }
        Ok(Self {
            id,
            tenant_id,
            amount,
            refunded,
            status,
            gateway,
            details,
            created_at,
            updated_at,
            version: 0,
        })
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Total refunded so far.
    pub fn refunded(&self) -> Amount {
        self.refunded
    }

    /// Amount still available for refund.
    pub fn outstanding(&self) -> Amount {
        Amount::new(
            self.amount.quantity() - self.refunded.quantity(),
            self.amount.currency(),
        )
        .unwrap_or_else(|_| Amount::zero(self.amount.currency()))
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn gateway(&self) -> Gateway {
        self.gateway
    }

    pub fn details(&self) -> &TransactionDetails {
        &self.details
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// Stamps the stored revision. Used by repositories after a read or write.
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Moves to `to` if the edge is allowed. On error nothing changes.
    pub fn transition(&mut self, to: Status) -> Result<(), DomainError> {
        self.status = self.status.transition(to)?;
        self.touch();
        Ok(())
    }

    /// Replaces the details payload. The variant must match the gateway.
    pub fn set_details(&mut self, details: TransactionDetails) -> Result<(), DomainError> {
        ensure_details_match(self.gateway, &details)?;
        self.details = details;
        self.touch();
        Ok(())
    }

    /// Validates a refund of `amount` and returns the status it leads to.
    pub fn check_refund(&self, amount: Amount) -> Result<Status, DomainError> {
        if !self.status.is_refundable() {
            return Err(DomainError::NotRefundable(self.status));
        }
        if amount.currency() != self.amount.currency() {
            return Err(DomainError::CurrencyMismatch {
                expected: self.amount.currency(),
                got: amount.currency(),
            });
        }
        if amount.is_zero() {
            return Err(DomainError::Validation(
                "refund amount must be positive".into(),
            ));
        }
        let outstanding = self.outstanding();
        if amount.quantity() > outstanding.quantity() {
            return Err(DomainError::RefundExceedsOutstanding {
                outstanding: outstanding.quantity(),
                requested: amount.quantity(),
            });
        }
        Ok(if amount.quantity() == outstanding.quantity() {
            Status::Refunded
        } else {
            Status::PartiallyRefunded
        })
    }

    /// Records a refund and moves to `Refunded` or `PartiallyRefunded`.
    pub fn apply_refund(&mut self, amount: Amount) -> Result<Status, DomainError> {
        let target = self.check_refund(amount)?;
        let status = self.status.transition(target)?;
        self.refunded = self.refunded.checked_add(amount)?;
        self.status = status;
        self.touch();
        Ok(status)
    }

    /// Bumps `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn ensure_details_match(gateway: Gateway, details: &TransactionDetails) -> Result<(), DomainError> {
    if details.gateway() != gateway {
        return Err(DomainError::GatewayDetailsMismatch {
            gateway,
            details: details.gateway(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CashDetails, ClickDetails, Currency, PaymeDetails};

    fn click_tx(quantity: i64) -> Transaction {
        Transaction::new(
            TenantId::new(),
            Amount::new(quantity, Currency::UZS).unwrap(),
            Gateway::Click,
            ClickDetails::new("INV-1").into(),
        )
        .unwrap()
    }

    fn uzs(quantity: i64) -> Amount {
        Amount::new(quantity, Currency::UZS).unwrap()
    }

    #[test]
    fn test_new_is_pending() {
        let tx = click_tx(10_000);
        assert_eq!(tx.status(), Status::Pending);
        assert_eq!(tx.refunded().quantity(), 0);
        assert_eq!(tx.created_at(), tx.updated_at());
    }

    #[test]
    fn test_gateway_details_mismatch_rejected() {
        let result = Transaction::new(
            TenantId::new(),
            uzs(100),
            Gateway::Click,
            PaymeDetails::new("order-1").into(),
        );
        assert!(matches!(
            result,
            Err(DomainError::GatewayDetailsMismatch {
                gateway: Gateway::Click,
                details: Gateway::Payme
            })
        ));
    }

    #[test]
    fn test_set_details_rejects_other_variant() {
        let mut tx = click_tx(100);
        let before = tx.clone();
        assert!(tx.set_details(CashDetails::default().into()).is_err());
        assert_eq!(tx, before);
    }

    #[test]
    fn test_invalid_transition_leaves_state_unchanged() {
        let mut tx = click_tx(100);
        tx.transition(Status::Completed).unwrap();
        let before = tx.clone();
        let err = tx.transition(Status::Pending).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(tx, before);
    }

    #[test]
    fn test_partial_then_full_refund() {
        let mut tx = click_tx(10_000);
        tx.transition(Status::Completed).unwrap();

        assert_eq!(tx.apply_refund(uzs(4_000)).unwrap(), Status::PartiallyRefunded);
        assert_eq!(tx.outstanding().quantity(), 6_000);

        assert_eq!(tx.apply_refund(uzs(6_000)).unwrap(), Status::Refunded);
        assert_eq!(tx.outstanding().quantity(), 0);
        assert_eq!(tx.amount().quantity(), 10_000);
    }

    #[test]
    fn test_refund_bound() {
        let mut tx = click_tx(10_000);
        tx.transition(Status::Completed).unwrap();
        assert!(matches!(
            tx.check_refund(uzs(10_001)),
            Err(DomainError::RefundExceedsOutstanding { .. })
        ));

        tx.apply_refund(uzs(3_000)).unwrap();
        let before = tx.clone();
        assert!(matches!(
            tx.apply_refund(uzs(7_001)),
            Err(DomainError::RefundExceedsOutstanding {
                outstanding: 7_000,
                requested: 7_001
            })
        ));
        assert_eq!(tx, before);
    }

    #[test]
    fn test_refund_requires_completed() {
        let tx = click_tx(100);
        assert!(matches!(
            tx.check_refund(uzs(50)),
            Err(DomainError::NotRefundable(Status::Pending))
        ));
    }

    #[test]
    fn test_refund_rejects_zero_and_other_currency() {
        let mut tx = click_tx(100);
        tx.transition(Status::Completed).unwrap();
        assert!(tx.check_refund(uzs(0)).is_err());
        assert!(matches!(
            tx.check_refund(Amount::new(50, Currency::USD).unwrap()),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }
}
