//! Domain models for the billing core.

pub mod amount;
pub mod details;
pub mod event;
pub mod filter;
pub mod gateway;
pub mod status;
pub mod transaction;

pub use amount::{Amount, Currency};
pub use details::{
    CashDetails, ClickDetails, IntegratorDetails, OctoDetails, Params, PaymeDetails,
    PaymeReceiver, PaymeState, StripeDetails, StripeItem, StripeMode, TransactionDetails,
};
pub use event::BillingEvent;
pub use filter::{DetailsFieldFilter, FilterOp, FindParams, SortOrder};
pub use gateway::Gateway;
pub use status::Status;
pub use transaction::{TenantId, Transaction, TransactionId};
