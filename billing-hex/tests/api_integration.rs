//! Integration tests for the HTTP surface.
//!
//! These drive the full router (tenant API and gateway webhooks) against an
//! in-memory SQLite repository.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use billing_hex::inbound::{GatewayConfigs, HttpServer, TENANT_HEADER};
use billing_hex::outbound::{BroadcastPublisher, ClickConfig, ClickProvider, PaymeConfig, ProviderRegistry};
use billing_hex::security::{ClickSignFields, click_sign};
use billing_hex::BillingService;
use billing_repo::SqliteRepo;

const CLICK_SECRET: &str = "click-secret";
const SIGN_TIME: &str = "2025-01-01 12:00:00";

/// Helper to create a router with Click and Payme configured.
async fn create_app() -> Router {
    // Use in-memory SQLite for tests
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let click = ClickConfig::new(100, 200, 300, CLICK_SECRET);
    let registry = ProviderRegistry::new()
        .with_provider(Arc::new(ClickProvider::new(click.clone(), reqwest::Client::new())));
    let service = BillingService::new(repo, registry, Arc::new(BroadcastPublisher::default()));
    let gateways = GatewayConfigs {
        click: Some(click),
        payme: Some(PaymeConfig::new("merchant-1", "payme-key")),
        ..Default::default()
    };
    HttpServer::new(Arc::new(service), gateways).router()
}

fn tenant() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn json_request(method: Method, uri: &str, tenant: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(TENANT_HEADER, tenant)
        .header("Content-Type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn form_request(uri: &str, fields: &[(&str, String)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{k}={}", v.replace(' ', "+").replace(':', "%3A")))
        .collect::<Vec<_>>()
        .join("&");
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let app = create_app().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_tenant_header_is_bad_request() {
    let app = create_app().await;
    let request = Request::builder()
        .uri("/api/transactions")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_cash_lifecycle() {
    let app = create_app().await;
    let tenant = tenant();

    let (status, created) = send(
        &app,
        json_request(
            Method::POST,
            "/api/transactions",
            &tenant,
            Some(json!({ "gateway": "cash", "quantity": 10000, "currency": "USD", "details": { "data": { "note": "front desk" } } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "completed");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, page) = send(&app, json_request(Method::GET, "/api/transactions?limit=10", &tenant, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], id.as_str());

    let (status, refunded) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/transactions/{id}/refund"),
            &tenant,
            Some(json!({ "quantity": 2500 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refunded["status"], "partially_refunded");
    assert_eq!(refunded["refunded_quantity"], 2500);

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/api/transactions/{id}/refund"),
            &tenant,
            Some(json!({ "quantity": 99999 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        json_request(Method::POST, &format!("/api/transactions/{id}/cancel"), &tenant, None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Another tenant cannot see it.
    let (status, _) = send(
        &app,
        json_request(Method::GET, &format!("/api/transactions/{id}"), &uuid::Uuid::new_v4().to_string(), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        json_request(Method::DELETE, &format!("/api/transactions/{id}"), &tenant, None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        json_request(Method::GET, &format!("/api/transactions/{id}"), &tenant, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_integrator_update() {
    let app = create_app().await;
    let tenant = tenant();

    let (status, created) = send(
        &app,
        json_request(
            Method::POST,
            "/api/transactions",
            &tenant,
            Some(json!({ "gateway": "integrator", "quantity": 500, "currency": "UZS", "details": { "provider": "partner" } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    let id = created["id"].as_str().unwrap();

    let (status, updated) = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/api/transactions/{id}"),
            &tenant,
            Some(json!({ "status": "completed", "details": { "provider": "partner", "reference": "R-9" } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "completed");
    assert_eq!(updated["details"]["reference"], "R-9");

    let (status, _) = send(
        &app,
        json_request(
            Method::PATCH,
            &format!("/api/transactions/{id}"),
            &tenant,
            Some(json!({ "status": "pending" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unconfigured_gateway() {
    let app = create_app().await;
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/transactions",
            &tenant(),
            Some(json!({ "gateway": "stripe", "quantity": 500, "currency": "USD", "details": {} })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not configured"));

    let request = Request::builder()
        .method(Method::POST)
        .uri("/billing/stripe")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn click_fields(action: i32, prepare_id: Option<i64>) -> Vec<(&'static str, String)> {
    let sign = click_sign(&ClickSignFields {
        click_trans_id: 9001,
        service_id: 100,
        secret_key: CLICK_SECRET,
        merchant_trans_id: "ORDER-42",
        merchant_prepare_id: prepare_id,
        amount: 150_000,
        action,
        sign_time: SIGN_TIME,
    });
    let mut fields = vec![
        ("click_trans_id", "9001".to_string()),
        ("service_id", "100".to_string()),
        ("click_paydoc_id", "31337".to_string()),
        ("merchant_trans_id", "ORDER-42".to_string()),
        ("amount", "1500.00".to_string()),
        ("action", action.to_string()),
        ("error", "0".to_string()),
        ("error_note", "Success".to_string()),
        ("sign_time", SIGN_TIME.to_string()),
        ("sign_string", sign),
    ];
    if let Some(id) = prepare_id {
        fields.push(("merchant_prepare_id", id.to_string()));
    }
    fields
}

#[tokio::test]
async fn test_click_payment_end_to_end() {
    let app = create_app().await;
    let tenant = tenant();

    let (status, created) = send(
        &app,
        json_request(
            Method::POST,
            "/api/transactions",
            &tenant,
            Some(json!({ "gateway": "click", "quantity": 150000, "currency": "UZS", "details": { "merchant_trans_id": "ORDER-42" } })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["details"]["link"].as_str().unwrap().starts_with("https://my.click.uz/"));
    let id = created["id"].as_str().unwrap().to_string();

    let (status, prepared) = send(&app, form_request("/billing/click/prepare", &click_fields(0, None))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prepared["error"], 0);
    let prepare_id = prepared["merchant_prepare_id"].as_i64().unwrap();

    let (status, completed) = send(
        &app,
        form_request("/billing/click/complete", &click_fields(1, Some(prepare_id))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(completed["error"], 0);

    let (_, tx) = send(&app, json_request(Method::GET, &format!("/api/transactions/{id}"), &tenant, None)).await;
    assert_eq!(tx["status"], "completed");
    assert_eq!(tx["details"]["payment_id"], 9001);
}

#[tokio::test]
async fn test_click_malformed_form() {
    let app = create_app().await;
    let request = form_request("/billing/click/prepare", &[("click_trans_id", "abc".to_string())]);
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], -8);
}

#[tokio::test]
async fn test_payme_requires_credentials() {
    let app = create_app().await;
    let body = json!({ "id": 5, "method": "CheckTransaction", "params": { "id": "x" } });

    let request = Request::builder()
        .method(Method::POST)
        .uri("/billing/payme")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, reply) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["error"]["code"], -32504);

    let auth = base64::engine::general_purpose::STANDARD.encode("Paycom:payme-key");
    let request = Request::builder()
        .method(Method::POST)
        .uri("/billing/payme")
        .header("Authorization", format!("Basic {auth}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, reply) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["error"]["code"], -31003);
    assert_eq!(reply["id"], 5);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_app().await;
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();
    let (status, doc) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/api/transactions"].is_object());
}
