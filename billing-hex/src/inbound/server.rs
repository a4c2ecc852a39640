//! HTTP Server configuration and startup.

use std::sync::Arc;

use axum::{
    Router,
    routing::{any, get, post},
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use billing_types::BillingRepository;

use super::handlers::{self, AppState, GatewayConfigs};
use super::webhooks::{click, octo, payme, stripe};
use crate::BillingService;
use crate::openapi::ApiDoc;

/// HTTP Server for the Billing API and gateway webhooks.
pub struct HttpServer<R: BillingRepository> {
    state: Arc<AppState<R>>,
}

impl<R: BillingRepository> HttpServer<R> {
    /// Creates a new HTTP server over the given service. Webhook endpoints
    /// of gateways missing from `gateways` answer 400.
    pub fn new(service: Arc<BillingService<R>>, gateways: GatewayConfigs) -> Self {
        Self {
            state: Arc::new(AppState { service, gateways }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        // Build HTTP metrics layer (uses globally set MeterProvider)
        let metrics = axum_otel_metrics::HttpMetricsLayerBuilder::new().build();

        let api = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/api/transactions",
                post(handlers::create_transaction::<R>).get(handlers::list_transactions::<R>),
            )
            .route(
                "/api/transactions/{id}",
                get(handlers::get_transaction::<R>)
                    .patch(handlers::update_transaction::<R>)
                    .delete(handlers::delete_transaction::<R>),
            )
            .route(
                "/api/transactions/{id}/refund",
                post(handlers::refund_transaction::<R>),
            )
            .route(
                "/api/transactions/{id}/cancel",
                post(handlers::cancel_transaction::<R>),
            )
            .route("/billing/click/prepare", post(click::click_prepare::<R>))
            .route("/billing/click/complete", post(click::click_complete::<R>))
            // Payme answers non-POST requests with its own error code.
            .route("/billing/payme", any(payme::payme::<R>))
            .route("/billing/stripe", post(stripe::stripe::<R>))
            .route("/billing/octo", post(octo::octo::<R>))
            .with_state(self.state.clone());

        Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
            .merge(api)
            .layer(metrics)
            .layer(TraceLayer::new_for_http())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
