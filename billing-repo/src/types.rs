//! Backend-neutral row shape and the checks `save` applies to it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use billing_types::{
    Amount, Currency, DomainError, Gateway, RepoError, Status, TenantId, Transaction,
    TransactionDetails, TransactionId,
};

/// Columns selected by every read query, in order.
pub const COLUMNS: &str = "id, tenant_id, status, gateway, quantity, refunded_quantity, currency, details, created_at, updated_at, version";

/// A `billing_transactions` row after backend-specific decoding.
pub struct StoredTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub status: String,
    pub gateway: String,
    pub quantity: i64,
    pub refunded_quantity: i64,
    pub currency: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl StoredTransaction {
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        let gateway: Gateway = self.gateway.parse()?;
        let status: Status = self.status.parse()?;
        let currency: Currency = self.currency.parse()?;
        let amount = Amount::new(self.quantity, currency)?;
        let refunded = Amount::new(self.refunded_quantity, currency)?;
        let details = TransactionDetails::from_json(gateway, self.details)?;

        Ok(Transaction::from_parts(
            TransactionId::from_uuid(self.id),
            TenantId::from_uuid(self.tenant_id),
            amount,
            refunded,
            status,
            gateway,
            details,
            self.created_at,
            self.updated_at,
        )?
        .with_version(self.version))
    }
}

/// Write-once columns, the status edge and the revision of an update,
/// checked against the locked row.
pub fn check_update(stored: &Transaction, incoming: &Transaction) -> Result<(), RepoError> {
    if stored.tenant_id() != incoming.tenant_id() {
        return Err(RepoError::Conflict("tenant_id is write-once".into()));
    }
    if stored.gateway() != incoming.gateway() {
        return Err(RepoError::Conflict("gateway is write-once".into()));
    }
    if stored.amount() != incoming.amount() {
        return Err(RepoError::Conflict("amount is write-once".into()));
    }
    if !stored.status().can_transition_to(incoming.status()) {
        return Err(RepoError::Domain(DomainError::InvalidTransition {
            from: stored.status(),
            to: incoming.status(),
        }));
    }
    if stored.version() != incoming.version() {
        return Err(stale(incoming));
    }
    Ok(())
}

/// An update that was read before another write to the same row committed.
pub fn stale(incoming: &Transaction) -> RepoError {
    RepoError::Conflict(format!(
        "transaction {} was modified concurrently (version {} is stale)",
        incoming.id(),
        incoming.version()
    ))
}

/// Maps a failed write, turning unique-index violations into conflicts.
pub fn write_error(err: sqlx::Error) -> RepoError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::Conflict(format!("duplicate transaction: {}", db.message()))
        }
        _ => RepoError::Database(err.to_string()),
    }
}

/// Serializes details for storage.
pub fn details_json(tx: &Transaction) -> Result<Value, RepoError> {
    Ok(tx.details().to_json()?)
}

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
#[cfg(feature = "sqlite")]
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(feature = "sqlite")]
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RepoError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| RepoError::Database(e.to_string()))?
        .with_timezone(&Utc))
}
