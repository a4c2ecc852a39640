//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the application layer: the tenant
//! JSON API plus one webhook endpoint per signed gateway.

pub mod handlers;
mod server;
pub mod webhooks;

pub use handlers::{AppState, GatewayConfigs, TENANT_HEADER};
pub use server::HttpServer;
