//! Audit data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::CallContext;

// ============================================================================
// Audit Query Constants
// ============================================================================

/// Default number of audit records returned per query
pub const DEFAULT_AUDIT_QUERY_LIMIT: i64 = 100;

/// Maximum number of audit records that can be returned in a single query.
pub const MAX_AUDIT_QUERY_LIMIT: i64 = 1000;

/// Username stored when no caller identity could be resolved
pub const ANONYMOUS_USER: &str = "anonymous";

/// Coarse traffic classification, fixed at entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// API documentation surface (OpenAPI document, Swagger UI)
    SystemDocs,
    /// Health and monitoring endpoints
    Infra,
    #[serde(rename = "BusinessAPI")]
    BusinessApi,
    Static,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemDocs => "SystemDocs",
            Self::Infra => "Infra",
            Self::BusinessApi => "BusinessAPI",
            Self::Static => "Static",
            Self::Other => "Other",
        }
    }

    /// Traffic whose failures are only logged minimally, never persisted
    pub fn is_noise_prone(&self) -> bool {
        matches!(self, Self::SystemDocs | Self::Infra)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored category label is not one of the known variants
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown audit category '{0}'")]
pub struct ParseCategoryError(pub String);

impl std::str::FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SystemDocs" => Ok(Self::SystemDocs),
            "Infra" => Ok(Self::Infra),
            "BusinessAPI" => Ok(Self::BusinessApi),
            "Static" => Ok(Self::Static),
            "Other" => Ok(Self::Other),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}

/// One persisted record per inbound call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Identifier assigned by the store at creation
    pub id: Uuid,
    pub method: String,
    pub endpoint: String,
    pub query_params: Option<String>,
    /// Reserved; the pipeline does not capture bodies
    pub request_body: Option<String>,
    /// Reserved; the pipeline does not capture bodies
    pub response_body: Option<String>,
    /// Absent until the call reaches a terminal state
    pub status_code: Option<i32>,
    /// Absent until the call reaches a terminal state
    pub duration_ms: Option<i64>,
    pub client_ip: Option<String>,
    pub username: String,
    pub category: Category,
    /// Wall-clock creation time
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
}

impl AuditRecord {
    /// Whether the terminal update has already been applied
    pub fn is_completed(&self) -> bool {
        self.status_code.is_some()
    }

    /// Apply the terminal transition
    ///
    /// Status and duration are written once; a second call leaves the first
    /// outcome in place and returns `false`.
    pub fn complete(&mut self, status_code: u16, duration_ms: u64) -> bool {
        if self.is_completed() {
            return false;
        }
        self.status_code = Some(i32::from(status_code));
        self.duration_ms = Some(i64::try_from(duration_ms).unwrap_or(i64::MAX));
        true
    }
}

/// Entry-time fields of a record, before the store has assigned an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub method: String,
    pub endpoint: String,
    pub query_params: Option<String>,
    pub client_ip: Option<String>,
    pub username: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}

impl NewAuditRecord {
    pub fn from_context(ctx: &CallContext, timestamp: DateTime<Utc>) -> Self {
        Self {
            method: ctx.method.to_string(),
            endpoint: ctx.path.clone(),
            query_params: ctx.query.clone(),
            client_ip: ctx.client_ip.clone(),
            username: ctx.username.clone(),
            category: ctx.category,
            timestamp,
        }
    }

    /// The record as it exists in the store right after creation
    pub fn into_record(self, id: Uuid) -> AuditRecord {
        AuditRecord {
            id,
            method: self.method,
            endpoint: self.endpoint,
            query_params: self.query_params,
            request_body: None,
            response_body: None,
            status_code: None,
            duration_ms: None,
            client_ip: self.client_ip,
            username: self.username,
            category: self.category,
            timestamp: self.timestamp,
            error_message: None,
            stack_trace: None,
        }
    }
}

/// Filters for inspecting the audit trail
#[derive(Debug, Clone, Deserialize)]
pub struct AuditQuery {
    pub method: Option<String>,
    pub endpoint: Option<String>,
    pub category: Option<Category>,
    pub status_code: Option<i32>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_AUDIT_QUERY_LIMIT
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            method: None,
            endpoint: None,
            category: None,
            status_code: None,
            start_time: None,
            end_time: None,
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl AuditQuery {
    /// Limit clamped to `1..=MAX_AUDIT_QUERY_LIMIT`
    pub fn effective_limit(&self) -> i64 {
        self.limit.clamp(1, MAX_AUDIT_QUERY_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.max(0)
    }

    /// Whether `record` satisfies every filter that is set
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.method
            .as_deref()
            .map_or(true, |m| record.method.eq_ignore_ascii_case(m))
            && self.endpoint.as_deref().map_or(true, |e| record.endpoint == e)
            && self.category.map_or(true, |c| record.category == c)
            && self.status_code.map_or(true, |s| record.status_code == Some(s))
            && self.start_time.map_or(true, |t| record.timestamp >= t)
            && self.end_time.map_or(true, |t| record.timestamp <= t)
    }
}
