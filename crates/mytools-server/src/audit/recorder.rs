//! Audit record lifecycle and console lines
//!
//! [`AuditRecorder`] owns the three transitions of a call's record:
//!
//! - **entry**: create the record with no outcome
//! - **exit**: write status and duration
//! - **failure**: write status, duration and truncated error text
//!
//! Documentation and monitoring traffic defers the entry write to a
//! successful exit, so a failure there persists nothing.
//!
//! Persistence is awaited but its outcome is never returned to the caller.
//! Store errors become ERROR console lines and the call proceeds unchanged.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, Level};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::context::CallContext;
use super::correlation::Correlation;
use super::error::{AuditError, AuditResult};
use super::failure::CallFailure;
use super::identity::{HeaderIdentityResolver, IdentityResolver};
use super::models::NewAuditRecord;
use super::store::AuditRecordStore;
use super::truncate::truncate_words;
use crate::config::AuditConfig;

/// Target of every audit console line
pub const AUDIT_TARGET: &str = "mytools_server::audit";

/// Severity of the "Request completed" line
///
/// Client and server errors win over slowness, slowness wins over priority.
pub fn exit_level(
    status: StatusCode,
    duration_ms: u64,
    high_priority: bool,
    slow_request_ms: u64,
) -> Level {
    if status.as_u16() >= 400 {
        Level::ERROR
    } else if duration_ms > slow_request_ms {
        Level::WARN
    } else if high_priority {
        Level::INFO
    } else {
        Level::DEBUG
    }
}

// `tracing` needs the level at compile time
macro_rules! audit_event {
    ($level:expr, $($rest:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::event!(target: AUDIT_TARGET, Level::ERROR, $($rest)+);
        } else if level == Level::WARN {
            tracing::event!(target: AUDIT_TARGET, Level::WARN, $($rest)+);
        } else if level == Level::INFO {
            tracing::event!(target: AUDIT_TARGET, Level::INFO, $($rest)+);
        } else {
            tracing::event!(target: AUDIT_TARGET, Level::DEBUG, $($rest)+);
        }
    }};
}

/// Records the lifecycle of every inbound call
pub struct AuditRecorder {
    store: Arc<dyn AuditRecordStore>,
    clock: Arc<dyn Clock>,
    identity: Arc<dyn IdentityResolver>,
    config: AuditConfig,
}

impl AuditRecorder {
    /// Recorder on the system clock, resolving identity from the configured header
    pub fn new(store: Arc<dyn AuditRecordStore>, config: AuditConfig) -> Self {
        let identity = HeaderIdentityResolver::from_name(&config.identity_header);
        Self {
            store,
            clock: Arc::new(SystemClock::new()),
            identity: Arc::new(identity),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn store(&self) -> &Arc<dyn AuditRecordStore> {
        &self.store
    }

    pub fn identity(&self) -> &dyn IdentityResolver {
        self.identity.as_ref()
    }

    /// Current monotonic reading, used as a call's start time
    pub fn start_ms(&self) -> u64 {
        self.clock.monotonic_ms()
    }

    fn elapsed_ms(&self, correlation: Correlation) -> u64 {
        self.clock
            .monotonic_ms()
            .saturating_sub(correlation.started_at_ms)
    }

    // ========================================================================
    // Entry
    // ========================================================================

    /// Create the entry-time record and return the correlation for this call
    pub async fn on_entry(&self, ctx: &CallContext) -> Correlation {
        let started_at_ms = self.clock.monotonic_ms();
        self.entry_line(ctx);

        let record = NewAuditRecord::from_context(ctx, self.clock.now());
        match self.store.create(record).await {
            Ok(id) => Correlation::new(id, started_at_ms),
            Err(e) => {
                error!(
                    target: AUDIT_TARGET,
                    method = %ctx.method,
                    path = %ctx.path,
                    error = %e,
                    "Failed to persist audit record at entry"
                );
                Correlation::unrecorded(started_at_ms)
            },
        }
    }

    /// Entry for documentation and monitoring traffic
    ///
    /// Nothing is written yet. The record is created by [`Self::on_exit_deferred`]
    /// once the call has succeeded, so a failing call leaves no record behind.
    pub fn on_entry_deferred(&self, ctx: &CallContext) -> Correlation {
        let started_at_ms = self.clock.monotonic_ms();
        self.entry_line(ctx);
        Correlation::unrecorded(started_at_ms)
    }

    fn entry_line(&self, ctx: &CallContext) {
        let client_ip = ctx.client_ip.as_deref().unwrap_or("-");

        if ctx.high_priority {
            info!(
                target: AUDIT_TARGET,
                method = %ctx.method,
                path = %ctx.path,
                username = %ctx.username,
                client_ip = %client_ip,
                "Request received"
            );
        } else {
            debug!(
                target: AUDIT_TARGET,
                method = %ctx.method,
                path = %ctx.path,
                username = %ctx.username,
                client_ip = %client_ip,
                "Request received"
            );
        }
    }

    // ========================================================================
    // Normal exit
    // ========================================================================

    /// Write the terminal status and duration of a call that produced a response
    pub async fn on_exit(&self, ctx: &CallContext, correlation: Correlation, status: StatusCode) {
        let Some(record_id) = correlation.record_id else {
            return;
        };
        let duration_ms = self.elapsed_ms(correlation);

        match self.complete_record(record_id, status, duration_ms).await {
            Ok(true) => self.completed_line(ctx, status, duration_ms),
            Ok(false) => {},
            Err(e) => self.exit_persist_error(ctx, status, &e),
        }
    }

    /// Exit for a call entered with [`Self::on_entry_deferred`]
    ///
    /// Creates the record stamped with the entry time and completes it.
    pub async fn on_exit_deferred(
        &self,
        ctx: &CallContext,
        correlation: Correlation,
        status: StatusCode,
    ) {
        let duration_ms = self.elapsed_ms(correlation);
        let elapsed_ms = i64::try_from(duration_ms).unwrap_or(i64::MAX);
        let entered_at = self.clock.now() - chrono::Duration::milliseconds(elapsed_ms);

        match self.create_completed(ctx, entered_at, status, duration_ms).await {
            Ok(()) => self.completed_line(ctx, status, duration_ms),
            Err(e) => self.exit_persist_error(ctx, status, &e),
        }
    }

    async fn create_completed(
        &self,
        ctx: &CallContext,
        entered_at: DateTime<Utc>,
        status: StatusCode,
        duration_ms: u64,
    ) -> AuditResult<()> {
        let fresh = NewAuditRecord::from_context(ctx, entered_at);
        let id = self.store.create(fresh.clone()).await?;
        let mut record = fresh.into_record(id);
        record.complete(status.as_u16(), duration_ms);
        self.store.update(&record).await
    }

    fn completed_line(&self, ctx: &CallContext, status: StatusCode, duration_ms: u64) {
        let level = exit_level(
            status,
            duration_ms,
            ctx.high_priority,
            self.config.slow_request_ms,
        );
        audit_event!(
            level,
            method = %ctx.method,
            path = %ctx.path,
            status = status.as_u16(),
            duration_ms = duration_ms,
            "Request completed"
        );
    }

    fn exit_persist_error(&self, ctx: &CallContext, status: StatusCode, e: &AuditError) {
        error!(
            target: AUDIT_TARGET,
            method = %ctx.method,
            path = %ctx.path,
            status = status.as_u16(),
            error = %e,
            "Failed to persist audit record at exit"
        );
    }

    /// `Ok(false)` when there is no open record to complete
    async fn complete_record(
        &self,
        record_id: Uuid,
        status: StatusCode,
        duration_ms: u64,
    ) -> AuditResult<bool> {
        let Some(mut record) = self.store.find_by_id(record_id).await? else {
            return Ok(false);
        };
        if !record.complete(status.as_u16(), duration_ms) {
            return Ok(false);
        }
        self.store.update(&record).await?;
        Ok(true)
    }

    // ========================================================================
    // Failure
    // ========================================================================

    /// Record a failed call and emit the "Request failed" line
    ///
    /// `status` is the response status when the failure produced one; an
    /// unknown status is recorded as 500.
    pub async fn on_failure(
        &self,
        ctx: &CallContext,
        correlation: Correlation,
        status: Option<StatusCode>,
        failure: &CallFailure,
    ) {
        let status = status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let duration_ms = self.elapsed_ms(correlation);

        if let Err(e) = self
            .persist_failure(ctx, correlation, status, duration_ms, failure)
            .await
        {
            error!(
                target: AUDIT_TARGET,
                method = %ctx.method,
                path = %ctx.path,
                error = %e,
                "Failed to persist audit record for failed request"
            );
        }

        error!(
            target: AUDIT_TARGET,
            method = %ctx.method,
            path = %ctx.path,
            status = status.as_u16(),
            error = %truncate_words(&failure.message, self.config.console_words),
            duration_ms = duration_ms,
            username = %ctx.username,
            client_ip = %ctx.client_ip.as_deref().unwrap_or("-"),
            "Request failed"
        );
    }

    async fn persist_failure(
        &self,
        ctx: &CallContext,
        correlation: Correlation,
        status: StatusCode,
        duration_ms: u64,
        failure: &CallFailure,
    ) -> AuditResult<()> {
        let existing = match correlation.record_id {
            Some(id) => self.store.find_by_id(id).await?,
            None => None,
        };

        let mut record = match existing {
            Some(record) => record,
            None => {
                let fresh = NewAuditRecord::from_context(ctx, self.clock.now());
                let id = self.store.create(fresh.clone()).await?;
                fresh.into_record(id)
            },
        };

        record.complete(status.as_u16(), duration_ms);
        record.error_message = Some(truncate_words(&failure.message, self.config.record_words));
        record.stack_trace = Some(truncate_words(&failure.detail, self.config.record_words));

        self.store.update(&record).await
    }

    /// Console-only failure line for documentation and infrastructure traffic
    pub fn on_failure_minimal(
        &self,
        ctx: &CallContext,
        correlation: Correlation,
        failure: &CallFailure,
    ) {
        error!(
            target: AUDIT_TARGET,
            method = %ctx.method,
            path = %ctx.path,
            category = %ctx.category,
            duration_ms = self.elapsed_ms(correlation),
            error = %truncate_words(&failure.message, self.config.minimal_words),
            "Request failed"
        );
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("store", &self.store.backend())
            .field("config", &self.config)
            .finish()
    }
}
