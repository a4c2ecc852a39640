//! Commands and Data Transfer Objects (DTOs) for requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::{
    Currency, Gateway, SortOrder, Status, TenantId, Transaction, TransactionDetails,
    TransactionId,
};

// ─────────────────────────────────────────────────────────────────────────────
// Service commands
// ─────────────────────────────────────────────────────────────────────────────

/// Input of `BillingService::create`.
#[derive(Debug, Clone)]
pub struct CreateTransactionCommand {
    pub tenant_id: TenantId,
    pub quantity: i64,
    pub currency: Currency,
    pub gateway: Gateway,
    pub details: TransactionDetails,
}

/// Input of `BillingService::refund`. `quantity` is in the transaction's
/// currency.
#[derive(Debug, Clone)]
pub struct RefundCommand {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub quantity: i64,
}

/// Input of `BillingService::cancel`.
#[derive(Debug, Clone)]
pub struct CancelCommand {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
}

/// Input of `BillingService::update_local` (cash and integrator only).
#[derive(Debug, Clone)]
pub struct UpdateLocalCommand {
    pub tenant_id: TenantId,
    pub transaction_id: TransactionId,
    pub status: Option<Status>,
    pub details: Option<TransactionDetails>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Transaction DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    pub gateway: Gateway,
    /// Amount in minor units
    #[schema(example = 10000)]
    pub quantity: i64,
    pub currency: Currency,
    /// Gateway-specific details document
    #[serde(default)]
    #[schema(value_type = Object, example = json!({"merchant_trans_id": "INV-1"}))]
    pub details: Value,
}

/// Request to refund part or all of a transaction.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Amount to refund in minor units
    #[schema(example = 5000)]
    pub quantity: i64,
}

/// Request to update a cash or integrator transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateTransactionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

/// A transaction as exposed over HTTP and to outward callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    #[schema(value_type = String, example = "123e4567-e89b-12d3-a456-426614174000")]
    pub id: TransactionId,
    #[schema(value_type = String)]
    pub tenant_id: TenantId,
    pub gateway: Gateway,
    pub status: Status,
    /// Amount in minor units
    #[schema(example = 10000)]
    pub quantity: i64,
    /// Refunded so far, in minor units
    #[schema(example = 0)]
    pub refunded_quantity: i64,
    pub currency: Currency,
    #[schema(value_type = Object)]
    pub details: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id(),
            tenant_id: tx.tenant_id(),
            gateway: tx.gateway(),
            status: tx.status(),
            quantity: tx.amount().quantity(),
            refunded_quantity: tx.refunded().quantity(),
            currency: tx.amount().currency(),
            details: tx.details().to_json().unwrap_or(Value::Null),
            created_at: tx.created_at(),
            updated_at: tx.updated_at(),
        }
    }
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self::from(&tx)
    }
}

/// Query string of the listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ListTransactionsQuery {
    pub gateway: Option<Gateway>,
    pub status: Option<Status>,
    #[schema(example = 50)]
    pub limit: Option<i64>,
    #[schema(example = 0)]
    pub offset: Option<i64>,
    #[schema(value_type = Option<String>, example = "desc")]
    pub sort: Option<SortOrder>,
}

/// One page of transactions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TransactionPage {
    pub items: Vec<TransactionResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
