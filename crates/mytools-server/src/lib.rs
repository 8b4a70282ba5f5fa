//! MyTools Server Library
//!
//! HTTP backend with a complete audit trail of inbound calls.
//!
//! # Overview
//!
//! - **Audit Pipeline**: every call is classified, persisted at entry and
//!   completed at exit or failure, with one console line per outcome
//! - **Failure Translation**: anything that escapes the handlers becomes a
//!   generic `INTERNAL_ERROR` response
//! - **Database Management**: PostgreSQL integration with SQLx, or an
//!   in-memory store for local runs
//! - **Configuration**: Environment-based configuration management
//! - **Middleware**: CORS and request tracing
//!
//! ## Audit Logging
//!
//! Each record carries method, endpoint, query string, client IP, username,
//! category, status, duration and, for failures, truncated error text.
//! Query the audit trail via the `/audit` endpoint.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mytools_server::{api, audit, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let store = Arc::new(audit::InMemoryAuditStore::new());
//!     let recorder = Arc::new(audit::AuditRecorder::new(store, config.audit.clone()));
//!     api::serve(config, api::AppState::new(recorder, None)).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod middleware;

// Re-export commonly used types
pub use error::{AppError, AppResult};
