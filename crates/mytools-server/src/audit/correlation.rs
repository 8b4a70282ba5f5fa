//! Correlation between a call's entry record and its later completion
//!
//! The correlation is an explicit value: [`AuditRecorder::on_entry`] returns
//! it and the interceptor hands it back at exit or failure. The only shared
//! piece is the [`FailureSlot`], a request extension owned by one call that
//! lets the outermost failure layer see what the interceptor already did.
//!
//! [`AuditRecorder::on_entry`]: super::recorder::AuditRecorder::on_entry

use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Links the entry-time record to the exit/failure update of one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correlation {
    /// `None` when the entry record could not be persisted
    pub record_id: Option<Uuid>,
    /// Monotonic clock reading taken at entry
    pub started_at_ms: u64,
}

impl Correlation {
    pub fn new(record_id: Uuid, started_at_ms: u64) -> Self {
        Self {
            record_id: Some(record_id),
            started_at_ms,
        }
    }

    /// A call that has no entry record
    pub fn unrecorded(started_at_ms: u64) -> Self {
        Self {
            record_id: None,
            started_at_ms,
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    correlation: Option<Correlation>,
    failure_recorded: bool,
}

/// Per-request handoff between the audit interceptor and the failure translator
#[derive(Debug, Clone, Default)]
pub struct FailureSlot {
    inner: Arc<Mutex<SlotState>>,
}

impl FailureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_correlation(&self, correlation: Correlation) {
        self.with_state(|state| state.correlation = Some(correlation));
    }

    pub fn correlation(&self) -> Option<Correlation> {
        self.with_state(|state| state.correlation)
    }

    pub fn mark_failure_recorded(&self) {
        self.with_state(|state| state.failure_recorded = true);
    }

    pub fn failure_recorded(&self) -> bool {
        self.with_state(|state| state.failure_recorded)
    }

    // A poisoned slot still holds valid data; the panic that poisoned it is
    // the failure being recorded.
    fn with_state<T>(&self, f: impl FnOnce(&mut SlotState) -> T) -> T {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }
}
