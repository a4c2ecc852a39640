//! Port traits (interfaces for adapters).
//!
//! The application layer depends on these traits, not concrete implementations.

mod provider;
mod publisher;
mod repository;

pub use provider::GatewayProvider;
pub use publisher::{EventPublisher, TransactionCallback};
pub use repository::BillingRepository;
