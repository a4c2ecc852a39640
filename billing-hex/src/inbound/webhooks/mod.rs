//! Gateway-facing webhook endpoints.
//!
//! Each processor verifies the gateway's signature before touching storage,
//! then looks the transaction up by the gateway's correlation fields,
//! applies a bounded status change, saves through the service and answers
//! in the gateway's own response shape.

pub mod click;
pub mod octo;
pub mod payme;
pub mod stripe;
