//! Test doubles for the audit pipeline

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use uuid::Uuid;

use super::clock::Clock;
use super::error::{AuditError, AuditResult};
use super::models::{AuditQuery, AuditRecord, NewAuditRecord};
use super::recorder::AUDIT_TARGET;
use super::store::{AuditRecordStore, InMemoryAuditStore};

// ============================================================================
// Clock
// ============================================================================

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    epoch: DateTime<Utc>,
    elapsed_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            epoch: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.elapsed_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.epoch + chrono::Duration::milliseconds(self.monotonic_ms() as i64)
    }

    fn monotonic_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Console capture
// ============================================================================

/// One event seen by [`CapturedLogs`]
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{:?}", value));
        }
    }
}

/// Layer that keeps every event emitted on the audit target
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    /// Make this the thread's subscriber until the guard drops
    ///
    /// Only reliable on a current-thread runtime.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::registry().with(self.clone());
        tracing::subscriber::set_default(subscriber)
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level) -> usize {
        self.events().iter().filter(|e| e.level == level).count()
    }

    pub fn with_message(&self, message: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target() != AUDIT_TARGET {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.events.lock().unwrap().push(CapturedEvent {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Store whose every operation fails
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl AuditRecordStore for FailingStore {
    async fn create(&self, _record: NewAuditRecord) -> AuditResult<Uuid> {
        Err(AuditError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn find_by_id(&self, _id: Uuid) -> AuditResult<Option<AuditRecord>> {
        Err(AuditError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn update(&self, _record: &AuditRecord) -> AuditResult<()> {
        Err(AuditError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn query(&self, _query: &AuditQuery) -> AuditResult<Vec<AuditRecord>> {
        Err(AuditError::Database(sqlx::Error::PoolTimedOut))
    }

    fn backend(&self) -> &'static str {
        "failing"
    }
}

/// In-memory store that counts writes
#[derive(Debug, Default)]
pub struct CountingStore {
    inner: InMemoryAuditStore,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryAuditStore {
        &self.inner
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuditRecordStore for CountingStore {
    async fn create(&self, record: NewAuditRecord) -> AuditResult<Uuid> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create(record).await
    }

    async fn find_by_id(&self, id: Uuid) -> AuditResult<Option<AuditRecord>> {
        self.inner.find_by_id(id).await
    }

    async fn update(&self, record: &AuditRecord) -> AuditResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(record).await
    }

    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditRecord>> {
        self.inner.query(query).await
    }

    fn backend(&self) -> &'static str {
        "counting"
    }
}
