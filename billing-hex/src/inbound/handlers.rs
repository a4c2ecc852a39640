//! HTTP request handlers for the application JSON API.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::Value;

use billing_types::{
    AppError, BillingRepository, CancelCommand, CreateTransactionCommand,
    CreateTransactionRequest, FindParams, ListTransactionsQuery, RefundCommand, RefundRequest,
    TenantId, TransactionDetails, TransactionId, TransactionPage, TransactionResponse,
    UpdateLocalCommand, UpdateTransactionRequest,
};

use crate::BillingService;
use crate::outbound::{ClickConfig, OctoConfig, PaymeConfig, StripeConfig};

/// Header carrying the calling tenant.
pub const TENANT_HEADER: &str = "X-Tenant-ID";

/// Per-gateway settings the webhook processors verify against.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfigs {
    pub click: Option<ClickConfig>,
    pub payme: Option<PaymeConfig>,
    pub stripe: Option<StripeConfig>,
    pub octo: Option<OctoConfig>,
}

/// Application state shared across handlers.
pub struct AppState<R: BillingRepository> {
    pub service: Arc<BillingService<R>>,
    pub gateways: GatewayConfigs,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Provider { operation, source } => {
                tracing::warn!(%operation, error = %source, "gateway call failed");
                (StatusCode::BAD_GATEWAY, self.0.to_string())
            }
            AppError::Internal { operation, message } => {
                tracing::error!(%operation, error = %message, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

/// The tenant named by the `X-Tenant-ID` header.
pub struct Tenant(pub TenantId);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::BadRequest(format!("Missing {TENANT_HEADER} header")))?;
        let tenant = header
            .parse()
            .map_err(|_| AppError::BadRequest(format!("Invalid {TENANT_HEADER} header")))?;
        Ok(Tenant(tenant))
    }
}

fn parse_id(id: &str) -> Result<TransactionId, AppError> {
    id.parse()
        .map_err(|_| AppError::BadRequest("Invalid transaction ID".into()))
}

/// Decodes a request details document for `gateway`; absent means empty.
fn decode_details(
    gateway: billing_types::Gateway,
    details: Value,
) -> Result<TransactionDetails, AppError> {
    let details = match details {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    Ok(TransactionDetails::from_json(gateway, details)?)
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Create a transaction.
#[tracing::instrument(skip(state, req), fields(tenant_id = %tenant, gateway = %req.gateway, quantity = req.quantity))]
pub async fn create_transaction<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Tenant(tenant): Tenant,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let details = decode_details(req.gateway, req.details)?;
    let tx = state
        .service
        .create(CreateTransactionCommand {
            tenant_id: tenant,
            quantity: req.quantity,
            currency: req.currency,
            gateway: req.gateway,
            details,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&tx))))
}

/// List the tenant's transactions.
#[tracing::instrument(skip(state, query), fields(tenant_id = %tenant))]
pub async fn list_transactions<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Tenant(tenant): Tenant,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let defaults = FindParams::default();
    let params = FindParams {
        tenant_id: Some(tenant),
        gateway: query.gateway,
        status: query.status,
        limit: query.limit.unwrap_or(defaults.limit),
        offset: query.offset.unwrap_or(defaults.offset),
        sort: query.sort.unwrap_or(defaults.sort),
    };
    let (items, total) = state.service.list(params.clone()).await?;
    Ok(Json(TransactionPage {
        items: items.iter().map(TransactionResponse::from).collect(),
        total,
        limit: params.limit.min(crate::service::MAX_PAGE_SIZE),
        offset: params.offset,
    }))
}

/// Get a transaction by ID.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant, transaction_id = %id))]
pub async fn get_transaction<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.service.get(tenant, parse_id(&id)?).await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

/// Refund part or all of a transaction.
#[tracing::instrument(skip(state, req), fields(tenant_id = %tenant, transaction_id = %id, quantity = req.quantity))]
pub async fn refund_transaction<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state
        .service
        .refund(RefundCommand {
            tenant_id: tenant,
            transaction_id: parse_id(&id)?,
            quantity: req.quantity,
        })
        .await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

/// Cancel a pending transaction.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant, transaction_id = %id))]
pub async fn cancel_transaction<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state
        .service
        .cancel(CancelCommand {
            tenant_id: tenant,
            transaction_id: parse_id(&id)?,
        })
        .await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

/// Update a cash or integrator transaction.
#[tracing::instrument(skip(state, req), fields(tenant_id = %tenant, transaction_id = %id))]
pub async fn update_transaction<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
    Json(req): Json<UpdateTransactionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let transaction_id = parse_id(&id)?;
    let details = match req.details {
        Some(details) => {
            let gateway = state.service.get(tenant, transaction_id).await?.gateway();
            Some(decode_details(gateway, details)?)
        }
        None => None,
    };
    let tx = state
        .service
        .update_local(UpdateLocalCommand {
            tenant_id: tenant,
            transaction_id,
            status: req.status,
            details,
        })
        .await?;
    Ok(Json(TransactionResponse::from(&tx)))
}

/// Delete a transaction.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant, transaction_id = %id))]
pub async fn delete_transaction<R: BillingRepository>(
    State(state): State<Arc<AppState<R>>>,
    Tenant(tenant): Tenant,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete(tenant, parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
