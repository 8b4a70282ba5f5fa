//! Request path classification
//!
//! Maps a request path to a [`Category`] and decides whether a call is
//! operationally interesting enough to be logged at INFO.

use axum::http::Method;

use super::models::Category;

const DOCS_MARKERS: &[&str] = &["/v3/api-docs", "/swagger"];
const INFRA_MARKERS: &[&str] = &["/actuator"];
const API_PREFIX: &str = "/api/";
/// Top-level business collections served outside the `/api/` prefix
const BUSINESS_COLLECTIONS: &[&str] = &["/products"];
const STATIC_EXTENSIONS: &[&str] = &[".css", ".js", ".ico"];
/// Paths that are high priority without being tagged as business traffic
const PRIORITY_PREFIXES: &[&str] = &["/users"];

/// Classify a request path; rules are evaluated in order and the first match wins
pub fn classify(path: &str) -> Category {
    if DOCS_MARKERS.iter().any(|m| path.contains(m)) {
        Category::SystemDocs
    } else if INFRA_MARKERS.iter().any(|m| path.contains(m)) {
        Category::Infra
    } else if is_business_path(path) {
        Category::BusinessApi
    } else if STATIC_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        Category::Static
    } else {
        Category::Other
    }
}

fn is_business_path(path: &str) -> bool {
    path.starts_with(API_PREFIX) || BUSINESS_COLLECTIONS.contains(&path)
}

/// Whether a call should be visible at INFO
///
/// Mutating calls are always high priority, even on low-traffic paths.
pub fn is_high_priority(method: &Method, path: &str) -> bool {
    is_business_path(path)
        || PRIORITY_PREFIXES.iter().any(|p| path.starts_with(p))
        || matches!(*method, Method::POST | Method::PUT | Method::DELETE)
}
