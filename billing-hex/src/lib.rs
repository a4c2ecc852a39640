//! # Billing Hex
//!
//! Application service, gateway adapters and HTTP surface for the billing
//! service.
//!
//! ## Architecture
//!
//! - `service/` - Application service (orchestrates providers, storage, events)
//! - `outbound/` - Gateway providers, event publisher, outward HTTP callback
//! - `inbound/` - HTTP adapter (Axum server, tenant API, gateway webhooks)
//! - `security/` - Signature primitives shared by the gateway adapters
//!
//! The service is generic over `R: BillingRepository`, allowing
//! different repository implementations to be injected.

pub mod inbound;
pub mod openapi;
pub mod outbound;
pub mod security;
pub mod service;


pub use service::BillingService;
