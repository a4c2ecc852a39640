//! Repository port trait.
//!
//! Adapters (Postgres, SQLite, in-memory) implement this trait.

use crate::domain::{DetailsFieldFilter, FindParams, Gateway, Transaction, TransactionId};
use crate::error::RepoError;

/// Persistence port for billing transactions.
///
/// `save` is the only write path for `status` and `details`. Implementations
/// must run it in a single database transaction, serialize concurrent writers
/// of the same row, refuse changes to `tenant_id` / `gateway`, and refuse a
/// status edge the stored row does not allow.
#[async_trait::async_trait]
pub trait BillingRepository: Send + Sync + 'static {
    /// Gets a transaction by ID.
    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError>;

    /// Finds transactions of `gateway` whose details satisfy every filter.
    async fn get_by_details_fields(
        &self,
        gateway: Gateway,
        filters: &[DetailsFieldFilter],
    ) -> Result<Vec<Transaction>, RepoError>;

    /// Inserts or updates a transaction and returns what was stored.
    async fn save(&self, transaction: &Transaction) -> Result<Transaction, RepoError>;

    /// Removes a transaction. Returns false when it did not exist.
    async fn delete(&self, id: TransactionId) -> Result<bool, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Listing
    // ─────────────────────────────────────────────────────────────────────────────

    async fn count(&self, params: &FindParams) -> Result<i64, RepoError>;

    async fn get_paginated(&self, params: &FindParams) -> Result<Vec<Transaction>, RepoError>;
}
