//! # Billing Types
//!
//! Domain types and port traits for the billing core.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Amount, gateway payloads, the Transaction aggregate and its events
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Service commands and HTTP request/response shapes
//! - `error/` - Domain, repository, provider and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Amount, BillingEvent, CashDetails, ClickDetails, Currency, DetailsFieldFilter, FilterOp,
    FindParams, Gateway, IntegratorDetails, OctoDetails, Params, PaymeDetails, PaymeReceiver,
    PaymeState, SortOrder, Status, StripeDetails, StripeItem, StripeMode, TenantId, Transaction,
    TransactionDetails, TransactionId,
};
pub use dto::*;
pub use error::{
    AppError, CallbackError, DomainError, LookupError, Operation, ProviderError, RepoError,
};
pub use ports::{BillingRepository, EventPublisher, GatewayProvider, TransactionCallback};
