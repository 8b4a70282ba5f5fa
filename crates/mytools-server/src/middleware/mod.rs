//! Middleware for the MyTools server
//!
//! This module provides middleware for:
//! - CORS (Cross-Origin Resource Sharing)
//! - Request tracing spans
//!
//! Audit logging and failure translation live in [`crate::audit`].

use axum::http::{header, HeaderName, Method};
use std::time::Duration;
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::config::CorsConfig;

/// Create CORS layer from configuration
///
/// `identity_header` is the header the audit layer reads the caller from,
/// so browsers may send it on cross-origin requests.
pub fn cors_layer(config: &CorsConfig, identity_header: &str) -> CorsLayer {
    let mut allowed_headers = vec![
        header::ACCEPT,
        header::ACCEPT_LANGUAGE,
        header::CONTENT_LANGUAGE,
        header::CONTENT_TYPE,
        header::AUTHORIZATION,
    ];
    match HeaderName::from_bytes(identity_header.as_bytes()) {
        Ok(name) => allowed_headers.push(name),
        Err(_) => warn!(
            header = %identity_header,
            "Invalid identity header name, not allowed by CORS"
        ),
    }

    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers(allowed_headers)
        .max_age(Duration::from_secs(3600));

    // Wildcard origins cannot be combined with credentials
    let wildcard =
        config.allowed_origins.is_empty() || config.allowed_origins.iter().any(|o| o == "*");

    if wildcard {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    if config.allow_credentials && !wildcard {
        cors = cors.allow_credentials(true);
    }

    cors
}

/// Create tracing/logging layer
pub fn tracing_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(
            DefaultOnResponse::new()
                .level(Level::DEBUG)
                .latency_unit(tower_http::LatencyUnit::Millis),
        )
}
