//! Audit logging module
//!
//! Every inbound HTTP call leaves one record in the audit store and a short
//! line on the console. The record is written at entry, then completed once
//! with the outcome: status and duration on success, plus truncated error
//! text on failure.
//!
//! # Architecture
//!
//! - [`classify()`] sorts paths into [`Category`] values and flags high-priority calls
//! - [`AuditRecorder`] owns the record lifecycle and the console lines
//! - [`AuditLayer`] is the boundary interceptor around the routes
//! - [`FailureTranslatorLayer`] is the outermost layer; it records anything that
//!   escaped the interceptor and answers with a generic 500
//! - [`AuditRecordStore`] is the persistence port, with Postgres and in-memory adapters
//!
//! Documentation and infrastructure traffic (`/v3/api-docs`, `/swagger`,
//! `/actuator`) is written only once it succeeds. Its failures get a single
//! bounded console line and are never persisted.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use mytools_server::audit::{
//!     AuditLayer, AuditRecorder, FailureTranslatorLayer, InMemoryAuditStore,
//! };
//! use mytools_server::config::AuditConfig;
//!
//! let recorder = Arc::new(AuditRecorder::new(
//!     Arc::new(InMemoryAuditStore::new()),
//!     AuditConfig::default(),
//! ));
//!
//! let app: Router = Router::new()
//!     .route("/api/products", get(|| async { "[]" }))
//!     .layer(AuditLayer::new(recorder.clone()))
//!     .layer(FailureTranslatorLayer::new(recorder));
//! ```

pub mod classify;
pub mod clock;
pub mod context;
pub mod correlation;
pub mod error;
pub mod failure;
pub mod identity;
mod middleware;
pub mod models;
pub mod recorder;
pub mod store;
mod translator;
pub mod truncate;

#[cfg(test)]
pub(crate) mod test_support;

pub use classify::{classify, is_high_priority};
pub use clock::{Clock, SystemClock};
pub use context::CallContext;
pub use correlation::{Correlation, FailureSlot};
pub use error::{AuditError, AuditResult};
pub use failure::CallFailure;
pub use identity::{
    CallerIdentity, HeaderIdentityResolver, IdentityResolver, DEFAULT_IDENTITY_HEADER,
};
pub use middleware::{AuditLayer, AuditMiddleware};
pub use models::{
    AuditQuery, AuditRecord, Category, NewAuditRecord, DEFAULT_AUDIT_QUERY_LIMIT,
    MAX_AUDIT_QUERY_LIMIT,
};
pub use recorder::{exit_level, AuditRecorder, AUDIT_TARGET};
pub use store::{AuditRecordStore, InMemoryAuditStore, PgAuditStore};
pub use translator::{FailureTranslator, FailureTranslatorLayer};
pub use truncate::truncate_words;
