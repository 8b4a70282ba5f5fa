//! Per-call context captured once at the boundary

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, Method},
};
use std::net::SocketAddr;

use super::classify::{classify, is_high_priority};
use super::identity::IdentityResolver;
use super::models::Category;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Everything the audit pipeline needs to know about an inbound call
///
/// Captured before the request is handed to the inner service, so it stays
/// available after the request has been consumed.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub client_ip: Option<String>,
    pub username: String,
    pub category: Category,
    pub high_priority: bool,
}

impl CallContext {
    pub fn capture(request: &Request, identity: &dyn IdentityResolver) -> Self {
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            category: classify(&path),
            high_priority: is_high_priority(&method, &path),
            query: request.uri().query().map(str::to_string),
            client_ip: client_ip(request.headers(), peer),
            username: identity.current_username(request),
            method,
            path,
        }
    }
}

/// First `X-Forwarded-For` hop if present, otherwise the transport peer
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::identity::HeaderIdentityResolver;
    use axum::body::Body;

    fn peer() -> SocketAddr {
        "192.168.1.20:51234".parse().unwrap()
    }

    #[test]
    fn test_capture_business_call() {
        let mut request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/products?page=1&size=10")
            .header("x-forwarded-user", "alice")
            .body(Body::empty())
            .unwrap();
        request.extensions_mut().insert(ConnectInfo(peer()));

        let ctx = CallContext::capture(&request, &HeaderIdentityResolver::default());

        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.path, "/api/products");
        assert_eq!(ctx.query.as_deref(), Some("page=1&size=10"));
        assert_eq!(ctx.client_ip.as_deref(), Some("192.168.1.20"));
        assert_eq!(ctx.username, "alice");
        assert_eq!(ctx.category, Category::BusinessApi);
        assert!(ctx.high_priority);
    }

    #[test]
    fn test_capture_docs_call() {
        let request = axum::http::Request::builder()
            .uri("/v3/api-docs/swagger-config")
            .body(Body::empty())
            .unwrap();

        let ctx = CallContext::capture(&request, &HeaderIdentityResolver::default());

        assert_eq!(ctx.category, Category::SystemDocs);
        assert!(!ctx.high_priority);
        assert!(ctx.query.is_none());
        assert!(ctx.client_ip.is_none());
        assert_eq!(ctx.username, "anonymous");
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, " 203.0.113.7 , 10.0.0.1".parse().unwrap());
        assert_eq!(
            client_ip(&headers, Some(peer())).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn test_empty_forwarded_for_falls_back_to_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, "".parse().unwrap());
        assert_eq!(
            client_ip(&headers, Some(peer())).as_deref(),
            Some("192.168.1.20")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
