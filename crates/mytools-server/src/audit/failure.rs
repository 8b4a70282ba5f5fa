//! Description of a failed call

use std::any::Any;
use std::error::Error as StdError;
use std::fmt::Display;

/// What went wrong in a call, as recorded by the audit pipeline
///
/// Handlers that fail attach one of these to their response extensions (see
/// [`AppError`](crate::error::AppError)); the audit interceptor picks it up
/// and records the call as failed while passing the response through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    /// Short human-readable message
    pub message: String,
    /// Longer diagnostic detail, stored as the record's stack trace
    pub detail: String,
}

impl CallFailure {
    pub fn new(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: detail.into(),
        }
    }

    /// From an error with a source chain; the chain becomes the detail
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let mut detail = format!("{:?}", err);
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str("\ncaused by: ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::new(err.to_string(), detail)
    }

    /// From a service error that only guarantees `Display`
    pub fn from_display(err: &dyn Display) -> Self {
        let message = err.to_string();
        Self::new(message.clone(), message)
    }

    /// From a caught panic payload
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string());
        let detail = format!("panic: {}", message);
        Self::new(message, detail)
    }
}
