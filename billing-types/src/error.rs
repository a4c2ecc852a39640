//! Error types for the billing service.

use std::fmt;

use crate::domain::{Currency, Gateway, Status};

/// Domain-level errors (invariant violations).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount overflow")]
    AmountOverflow,

    #[error("Currency mismatch: expected {expected}, got {got}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("Gateway {gateway} cannot carry {details} details")]
    GatewayDetailsMismatch { gateway: Gateway, details: Gateway },

    #[error("Refund of {requested} exceeds outstanding {outstanding}")]
    RefundExceedsOutstanding { outstanding: i64, requested: i64 },

    #[error("Transaction in status {0} cannot be refunded")]
    NotRefundable(Status),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Failures of a remote gateway call.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Gateway call timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Gateway rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Operation not supported by gateway: {0}")]
    Unsupported(String),

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Failure of an outward application callback.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Callback delivery failed: {0}")]
    Delivery(String),

    #[error("Callback endpoint answered {0}")]
    Status(u16),

    #[error("Callback handler failed: {0}")]
    Handler(String),
}

/// Outcome of an exactly-one lookup by details fields.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("No transaction matches")]
    NotFound,

    #[error("Ambiguous lookup: {0} transactions match")]
    Ambiguous(usize),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Operation an error was raised in, for traceability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Cancel,
    Refund,
    Update,
    Save,
    Delete,
    Get,
    List,
    Lookup,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Cancel => "cancel",
            Operation::Refund => "refund",
            Operation::Update => "update",
            Operation::Save => "save",
            Operation::Delete => "delete",
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Lookup => "lookup",
        };
        f.write_str(name)
    }
}

/// Application-level errors.
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Provider error during {operation}: {source}")]
    Provider {
        operation: Operation,
        #[source]
        source: ProviderError,
    },

    #[error("Internal error during {operation}: {message}")]
    Internal { operation: Operation, message: String },
}

impl AppError {
    /// Maps a repository failure raised while performing `operation`.
    pub fn repo(operation: Operation, err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Transaction not found".into()),
            RepoError::Conflict(msg) => AppError::Conflict(msg),
            RepoError::Database(message) | RepoError::Transaction(message) => {
                AppError::Internal { operation, message }
            }
        }
    }

    /// Maps a gateway failure raised while performing `operation`.
    pub fn provider(operation: Operation, err: ProviderError) -> Self {
        match err {
            ProviderError::Domain(e) => e.into(),
            source => AppError::Provider { operation, source },
        }
    }

    pub fn lookup(err: LookupError) -> Self {
        match err {
            LookupError::Repo(e) => AppError::repo(Operation::Lookup, e),
            other => AppError::NotFound(other.to_string()),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTransition { .. } | DomainError::NotRefundable(_) => {
                AppError::Conflict(err.to_string())
            }
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_is_conflict() {
        let err: AppError = DomainError::InvalidTransition {
            from: Status::Completed,
            to: Status::Pending,
        }
        .into();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_database_error_carries_operation() {
        let err = AppError::repo(Operation::Save, RepoError::Database("boom".into()));
        assert!(matches!(
            err,
            AppError::Internal {
                operation: Operation::Save,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Internal error during save: boom");
    }

    #[test]
    fn test_timeout_is_provider_error() {
        let err = AppError::provider(Operation::Create, ProviderError::Timeout("30s".into()));
        assert!(matches!(
            err,
            AppError::Provider {
                operation: Operation::Create,
                source: ProviderError::Timeout(_)
            }
        ));
    }
}
