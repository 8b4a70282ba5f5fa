//! End-to-end tests of the audit pipeline through the full router

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use http_body_util::BodyExt;
use mytools_server::{
    api::{create_router, AppState},
    audit::{
        AuditLayer, AuditQuery, AuditRecordStore, AuditRecorder, Category,
        FailureTranslatorLayer, InMemoryAuditStore,
    },
    config::{AuditConfig, AuditStoreKind, Config},
};
use std::sync::Arc;
use tower::ServiceExt;

fn memory_config() -> Config {
    let mut config = Config::default();
    config.audit = AuditConfig {
        store: AuditStoreKind::Memory,
        ..AuditConfig::default()
    };
    config
}

fn setup() -> (Router, Arc<InMemoryAuditStore>) {
    let config = memory_config();
    let store = Arc::new(InMemoryAuditStore::new());
    let recorder = Arc::new(AuditRecorder::new(store.clone(), config.audit.clone()));
    let app = create_router(AppState::new(recorder, None), &config);
    (app, store)
}

fn get_request(uri: &str) -> Request {
    axum::http::Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_reports_memory_store_and_is_audited() {
    let (app, store) = setup();

    let response = app.oneshot(get_request("/actuator/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "UP");
    assert_eq!(json["store"], "memory");
    assert!(json.get("database").is_none());

    let records = store.all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].endpoint, "/actuator/health");
    assert_eq!(records[0].category, Category::Infra);
    assert_eq!(records[0].status_code, Some(200));
    assert_eq!(records[0].username, "anonymous");
    assert!(records[0].duration_ms.is_some());
}

#[tokio::test]
async fn test_audit_endpoint_filters_by_category() {
    let (app, _store) = setup();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get_request("/actuator/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(get_request("/audit?category=Infra&limit=10"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["meta"]["count"], 2);
    assert_eq!(json["meta"]["limit"], 10);

    let data = json["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert!(data.iter().all(|r| r["category"] == "Infra"));
    assert!(data.iter().all(|r| r["statusCode"] == 200));
}

#[tokio::test]
async fn test_rejected_query_is_completed_with_client_error() {
    let (app, store) = setup();

    let response = app
        .oneshot(get_request("/audit?category=Swagger"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let records = store
        .query(&AuditQuery {
            endpoint: Some("/audit".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, Some(400));
    assert_eq!(records[0].query_params.as_deref(), Some("category=Swagger"));
    assert!(records[0].error_message.is_none());
}

#[tokio::test]
async fn test_unknown_route_is_recorded_as_not_found() {
    let (app, store) = setup();

    let response = app.oneshot(get_request("/missing/page")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let records = store.all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category, Category::Other);
    assert_eq!(records[0].status_code, Some(404));
}

#[tokio::test]
async fn test_identity_header_is_recorded() {
    let (app, store) = setup();

    let request = axum::http::Request::builder()
        .method(Method::DELETE)
        .uri("/api/products/7")
        .header("x-forwarded-user", "dana")
        .header("x-forwarded-for", "198.51.100.4, 10.0.0.2")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let records = store.all().await;
    assert_eq!(records[0].username, "dana");
    assert_eq!(records[0].client_ip.as_deref(), Some("198.51.100.4"));
    assert_eq!(records[0].category, Category::BusinessApi);
}

#[tokio::test]
async fn test_panicking_handler_yields_generic_error() {
    let store = Arc::new(InMemoryAuditStore::new());
    let recorder = Arc::new(AuditRecorder::new(store.clone(), AuditConfig::default()));

    let app = Router::new()
        .route(
            "/api/reports",
            get(|| async {
                let rows: Vec<u32> = Vec::new();
                rows[3].to_string()
            }),
        )
        .layer(AuditLayer::new(recorder.clone()))
        .layer(FailureTranslatorLayer::new(recorder));

    let response = app.oneshot(get_request("/api/reports")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(
        json,
        serde_json::json!({
            "success": false,
            "error": {
                "code": "INTERNAL_ERROR",
                "message": "Internal server error (see logs)."
            }
        })
    );

    let records = store.all().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status_code, Some(500));
    let message = records[0].error_message.as_deref().unwrap();
    assert!(message.contains("index out of bounds"));
}
