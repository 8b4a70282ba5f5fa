//! Caller identity resolution

use axum::{extract::Request, http::HeaderName};

use super::models::ANONYMOUS_USER;

/// Default header carrying the authenticated username from the auth proxy
pub const DEFAULT_IDENTITY_HEADER: &str = "x-forwarded-user";

/// Authenticated caller, inserted as a request extension by the auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

/// Resolves who is making a call
pub trait IdentityResolver: Send + Sync {
    /// Username of the caller, or `None` when unauthenticated
    fn resolve(&self, request: &Request) -> Option<String>;

    /// Username of the caller, or `"anonymous"`
    fn current_username(&self, request: &Request) -> String {
        self.resolve(request)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string())
    }
}

/// Looks for a [`CallerIdentity`] extension first, then a trusted header
#[derive(Debug, Clone)]
pub struct HeaderIdentityResolver {
    header: HeaderName,
}

impl HeaderIdentityResolver {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// Build from a configured header name, falling back to the default on invalid input
    pub fn from_name(name: &str) -> Self {
        let header = HeaderName::try_from(name.trim().to_ascii_lowercase())
            .unwrap_or_else(|_| HeaderName::from_static(DEFAULT_IDENTITY_HEADER));
        Self::new(header)
    }
}

impl Default for HeaderIdentityResolver {
    fn default() -> Self {
        Self::new(HeaderName::from_static(DEFAULT_IDENTITY_HEADER))
    }
}

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, request: &Request) -> Option<String> {
        if let Some(CallerIdentity(name)) = request.extensions().get::<CallerIdentity>() {
            return Some(name.clone());
        }

        request
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(header: Option<(&str, &str)>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/products");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_anonymous_without_identity() {
        let resolver = HeaderIdentityResolver::default();
        assert_eq!(resolver.current_username(&request(None)), "anonymous");
    }

    #[test]
    fn test_header_identity() {
        let resolver = HeaderIdentityResolver::default();
        let req = request(Some(("x-forwarded-user", "alice")));
        assert_eq!(resolver.current_username(&req), "alice");

        let blank = request(Some(("x-forwarded-user", "   ")));
        assert_eq!(resolver.current_username(&blank), "anonymous");
    }

    #[test]
    fn test_extension_wins_over_header() {
        let resolver = HeaderIdentityResolver::default();
        let mut req = request(Some(("x-forwarded-user", "spoofed")));
        req.extensions_mut().insert(CallerIdentity("bob".to_string()));
        assert_eq!(resolver.current_username(&req), "bob");
    }

    #[test]
    fn test_custom_header_name() {
        let resolver = HeaderIdentityResolver::from_name("X-Auth-Request-User");
        let req = request(Some(("x-auth-request-user", "carol")));
        assert_eq!(resolver.current_username(&req), "carol");

        let fallback = HeaderIdentityResolver::from_name("not a header");
        assert_eq!(fallback.header.as_str(), DEFAULT_IDENTITY_HEADER);
    }
}
