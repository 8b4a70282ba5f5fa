//! HTTP surface: router, handlers and server loop

pub mod response;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::{info, warn};

use crate::audit::{AuditLayer, AuditQuery, AuditRecorder, FailureTranslatorLayer};
use crate::config::Config;
use crate::error::AppResult;
use crate::middleware;
use response::ApiResponse;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub recorder: Arc<AuditRecorder>,
    /// Present when audit records go to Postgres
    pub db: Option<PgPool>,
}

impl AppState {
    pub fn new(recorder: Arc<AuditRecorder>, db: Option<PgPool>) -> Self {
        Self { recorder, db }
    }
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, config: &Config) -> Router {
    let recorder = state.recorder.clone();

    Router::new()
        .route("/actuator/health", get(health_check))
        .route("/audit", get(query_audit_logs))
        .with_state(state)
        // Apply layers from innermost to outermost
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(
            &config.cors,
            &config.audit.identity_header,
        ))
        .layer(AuditLayer::new(recorder.clone()))
        .layer(FailureTranslatorLayer::new(recorder))
}

/// Bind, serve until a shutdown signal, then drain for at most the configured timeout
pub async fn serve(config: Config, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state, &config);

    let addr: SocketAddr = config.bind_address().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on {}", addr);

    let shutdown_started = Arc::new(tokio::sync::Notify::new());
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown({
        let shutdown_started = shutdown_started.clone();
        async move {
            shutdown_signal().await;
            shutdown_started.notify_one();
        }
    });

    let timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            shutdown_started.notified().await;
            tokio::time::sleep(timeout).await;
        } => {
            warn!(
                timeout_secs = config.server.shutdown_timeout_secs,
                "Connections still open after shutdown timeout, exiting anyway"
            );
        },
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> Response {
    let store = state.recorder.store().backend();

    let Some(db) = &state.db else {
        return (StatusCode::OK, Json(json!({ "status": "UP", "store": store })))
            .into_response();
    };

    match sqlx::query("SELECT 1").execute(db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "UP",
                "store": store,
                "database": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "DOWN",
                    "store": store,
                    "database": "unreachable"
                })),
            )
                .into_response()
        },
    }
}

/// Query audit logs handler
async fn query_audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> AppResult<impl IntoResponse> {
    let records = state.recorder.store().query(&query).await?;

    let meta = json!({
        "count": records.len(),
        "limit": query.effective_limit(),
        "offset": query.effective_offset(),
    });

    Ok(ApiResponse::success_with_meta(records, meta))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
