//! Audit persistence errors

use thiserror::Error;
use uuid::Uuid;

use super::models::ParseCategoryError;

/// Failure while reading or writing an audit record
///
/// These never reach a caller: the recorder logs them to the console and
/// carries on.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Audit record '{0}' not found")]
    NotFound(Uuid),

    #[error("Invalid audit record: {0}")]
    InvalidCategory(#[from] ParseCategoryError),
}

pub type AuditResult<T> = Result<T, AuditError>;
