//! Durable storage for audit records
//!
//! The recorder only talks to [`AuditRecordStore`]; the backend is picked at
//! startup from configuration.
//!
//! - [`PgAuditStore`] writes to the `api_logs` table
//! - [`InMemoryAuditStore`] keeps records in process memory (local runs and tests)

use async_trait::async_trait;
use uuid::Uuid;

use super::error::AuditResult;
use super::models::{AuditQuery, AuditRecord, NewAuditRecord};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryAuditStore;
pub use postgres::PgAuditStore;

/// Persistence port for audit records
#[async_trait]
pub trait AuditRecordStore: Send + Sync {
    /// Persist an entry-time record and return the id the store assigned
    async fn create(&self, record: NewAuditRecord) -> AuditResult<Uuid>;

    async fn find_by_id(&self, id: Uuid) -> AuditResult<Option<AuditRecord>>;

    /// Overwrite the mutable fields of an existing record
    ///
    /// Fails with [`AuditError::NotFound`](super::error::AuditError::NotFound)
    /// when the id is unknown.
    async fn update(&self, record: &AuditRecord) -> AuditResult<()>;

    /// Records matching `query`, newest first
    async fn query(&self, query: &AuditQuery) -> AuditResult<Vec<AuditRecord>>;

    /// Short backend name for health reporting
    fn backend(&self) -> &'static str;
}
