//! OpenAPI specification and documentation.

#![allow(dead_code)] // Path functions are only used by utoipa for documentation generation

use billing_types::domain::{Currency, Gateway, Status};
use billing_types::dto::{
    CreateTransactionRequest, RefundRequest, TransactionPage, TransactionResponse,
    UpdateTransactionRequest,
};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};

// Dummy functions to generate path documentation
// These are not the actual handlers, just for OpenAPI path generation

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = inline(serde_json::Value), example = json!({"status": "healthy"}))
    )
)]
async fn health() {}

/// Create a transaction, opening it at the gateway when the gateway is remote
#[utoipa::path(
    post,
    path = "/api/transactions",
    tag = "transactions",
    request_body = CreateTransactionRequest,
    security(("tenant" = [])),
    responses(
        (status = 201, description = "Transaction created", body = TransactionResponse),
        (status = 400, description = "Invalid amount, currency, details or unconfigured gateway"),
        (status = 502, description = "Gateway rejected or did not answer")
    )
)]
async fn create_transaction() {}

/// List the tenant's transactions
#[utoipa::path(
    get,
    path = "/api/transactions",
    tag = "transactions",
    security(("tenant" = [])),
    params(
        ("gateway" = Option<Gateway>, Query, description = "Only this gateway"),
        ("status" = Option<Status>, Query, description = "Only this status"),
        ("limit" = Option<i64>, Query, description = "Page size (default 50, max 200)"),
        ("offset" = Option<i64>, Query, description = "Rows to skip"),
        ("sort" = Option<String>, Query, description = "`asc` or `desc` on created_at")
    ),
    responses(
        (status = 200, description = "One page of transactions", body = TransactionPage)
    )
)]
async fn list_transactions() {}

/// Get a transaction by ID
#[utoipa::path(
    get,
    path = "/api/transactions/{id}",
    tag = "transactions",
    security(("tenant" = [])),
    params(
        ("id" = String, Path, description = "Transaction ID (UUID)")
    ),
    responses(
        (status = 200, description = "Transaction found", body = TransactionResponse),
        (status = 404, description = "No such transaction for this tenant")
    )
)]
async fn get_transaction() {}

/// Update status or details of a cash or integrator transaction
#[utoipa::path(
    patch,
    path = "/api/transactions/{id}",
    tag = "transactions",
    request_body = UpdateTransactionRequest,
    security(("tenant" = [])),
    params(
        ("id" = String, Path, description = "Transaction ID (UUID)")
    ),
    responses(
        (status = 200, description = "Transaction updated", body = TransactionResponse),
        (status = 400, description = "Gateway-driven transaction or malformed details"),
        (status = 409, description = "Status change not allowed")
    )
)]
async fn update_transaction() {}

/// Delete a transaction
#[utoipa::path(
    delete,
    path = "/api/transactions/{id}",
    tag = "transactions",
    security(("tenant" = [])),
    params(
        ("id" = String, Path, description = "Transaction ID (UUID)")
    ),
    responses(
        (status = 204, description = "Transaction deleted"),
        (status = 404, description = "No such transaction for this tenant")
    )
)]
async fn delete_transaction() {}

/// Refund part or all of the outstanding amount
#[utoipa::path(
    post,
    path = "/api/transactions/{id}/refund",
    tag = "transactions",
    request_body = RefundRequest,
    security(("tenant" = [])),
    params(
        ("id" = String, Path, description = "Transaction ID (UUID)")
    ),
    responses(
        (status = 200, description = "Refund applied", body = TransactionResponse),
        (status = 400, description = "Amount exceeds the outstanding amount"),
        (status = 409, description = "Transaction is not refundable"),
        (status = 502, description = "Gateway refused the refund")
    )
)]
async fn refund_transaction() {}

/// Cancel a pending transaction
#[utoipa::path(
    post,
    path = "/api/transactions/{id}/cancel",
    tag = "transactions",
    security(("tenant" = [])),
    params(
        ("id" = String, Path, description = "Transaction ID (UUID)")
    ),
    responses(
        (status = 200, description = "Transaction cancelled", body = TransactionResponse),
        (status = 409, description = "Transaction is no longer pending"),
        (status = 502, description = "Gateway refused the cancellation")
    )
)]
async fn cancel_transaction() {}

/// Click prepare stage (form-encoded, signed)
#[utoipa::path(
    post,
    path = "/billing/click/prepare",
    tag = "gateways",
    request_body(content = inline(serde_json::Value), content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Click envelope; `error` carries the outcome", body = inline(serde_json::Value))
    )
)]
async fn click_prepare() {}

/// Click complete stage (form-encoded, signed)
#[utoipa::path(
    post,
    path = "/billing/click/complete",
    tag = "gateways",
    request_body(content = inline(serde_json::Value), content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Click envelope; `error` carries the outcome", body = inline(serde_json::Value))
    )
)]
async fn click_complete() {}

/// Payme merchant API (JSON-RPC, Basic auth)
#[utoipa::path(
    post,
    path = "/billing/payme",
    tag = "gateways",
    request_body = inline(serde_json::Value),
    responses(
        (status = 200, description = "JSON-RPC result or error", body = inline(serde_json::Value))
    )
)]
async fn payme() {}

/// Stripe webhook events (`Stripe-Signature` header)
#[utoipa::path(
    post,
    path = "/billing/stripe",
    tag = "gateways",
    request_body = inline(serde_json::Value),
    responses(
        (status = 200, description = "Event accepted"),
        (status = 400, description = "Signature or payload rejected"),
        (status = 500, description = "Event not stored; Stripe will retry")
    )
)]
async fn stripe() {}

/// Octo payment notifications
#[utoipa::path(
    post,
    path = "/billing/octo",
    tag = "gateways",
    request_body = inline(serde_json::Value),
    responses(
        (status = 200, description = "Notification applied", body = inline(serde_json::Value), example = json!({"accept_status": "capture"})),
        (status = 400, description = "Signature rejected"),
        (status = 404, description = "Unknown shop transaction")
    )
)]
async fn octo() {}

/// OpenAPI documentation for the Billing API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Billing Service API",
        version = "1.0.0",
        description = "Payment transactions across Stripe, Click, Payme, Octo, cash and integrator gateways.\n\n## Tenancy\n\nEvery `/api` endpoint is scoped to the tenant named by the `X-Tenant-ID` header:\n\n```\nX-Tenant-ID: 123e4567-e89b-12d3-a456-426614174000\n```\n\nThe `/billing` endpoints are called by the gateways themselves and authenticate by signature.",
        license(name = "MIT"),
    ),
    paths(
        health,
        create_transaction,
        list_transactions,
        get_transaction,
        update_transaction,
        delete_transaction,
        refund_transaction,
        cancel_transaction,
        click_prepare,
        click_complete,
        payme,
        stripe,
        octo,
    ),
    components(
        schemas(
            CreateTransactionRequest,
            RefundRequest,
            UpdateTransactionRequest,
            TransactionResponse,
            TransactionPage,
            Gateway,
            Status,
            Currency,
        )
    ),
    modifiers(&TenantAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "transactions", description = "Tenant transaction lifecycle"),
        (name = "gateways", description = "Signed callbacks from payment gateways"),
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for the tenant header.
struct TenantAddon;

impl Modify for TenantAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "tenant",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Tenant-ID"))),
            );
        }
    }
}
