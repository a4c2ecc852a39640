//! # Billing Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the repository adapter
//! - Build a provider for every configured gateway
//! - Create the billing service and register the outward callback
//! - Start the HTTP server

mod config;

use std::sync::Arc;

use opentelemetry::global;
use opentelemetry_sdk::{propagation::TraceContextPropagator, trace as sdktrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use billing_hex::{
    BillingService,
    inbound::HttpServer,
    outbound::{
        BroadcastPublisher, ClickProvider, HttpCallback, OctoProvider, PaymeProvider,
        ProviderRegistry, StripeProvider, http_client,
    },
};
use billing_repo::build_repo;

fn init_tracer() -> (sdktrace::Tracer, sdktrace::SdkTracerProvider) {
    global::set_text_map_propagator(TraceContextPropagator::new());

    // Use gRPC exporter with batch processing (non-blocking)
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()
        .expect("failed to create OTLP span exporter");

    let provider = sdktrace::SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .build();

    global::set_tracer_provider(provider.clone());

    use opentelemetry::trace::TracerProvider as _;
    (provider.tracer("billing-service"), provider)
}

fn build_registry(gateways: &billing_hex::inbound::GatewayConfigs, client: &reqwest::Client) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    if let Some(click) = &gateways.click {
        registry.register(Arc::new(ClickProvider::new(click.clone(), client.clone())));
    }
    if let Some(payme) = &gateways.payme {
        registry.register(Arc::new(PaymeProvider::new(payme.clone(), client.clone())));
    }
    if let Some(stripe) = &gateways.stripe {
        registry.register(Arc::new(StripeProvider::new(stripe.clone(), client.clone())));
    }
    if let Some(octo) = &gateways.octo {
        registry.register(Arc::new(OctoProvider::new(octo.clone(), client.clone())));
    }
    registry
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize OpenTelemetry tracing
    let (otel_tracer, otel_provider) = init_tracer();
    let telemetry = tracing_opentelemetry::layer().with_tracer(otel_tracer);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,billing_app=debug,billing_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry)
        .init();

    let config = config::Config::from_env()?;

    tracing::info!("Starting billing server on port {}", config.port);

    // Build repository (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    let client = http_client(config.gateway_timeout)?;
    let registry = build_registry(&config.gateways, &client);
    tracing::info!(gateways = ?registry.configured(), "Gateway providers ready");

    let service = BillingService::new(repo, registry, Arc::new(BroadcastPublisher::default()));

    if let Some(callback) = config.callback {
        tracing::info!(url = %callback.url, "Registering transaction callback");
        service
            .register_callback(Arc::new(HttpCallback::new(
                client.clone(),
                callback.url,
                callback.secret,
            )))
            .await;
    }

    let server = HttpServer::new(Arc::new(service), config.gateways);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;

    // Ensure traces are flushed before exit
    let _ = otel_provider.shutdown();
    Ok(())
}
