//! Boundary interceptor recording every inbound call
//!
//! Each call moves `Idle -> Entered -> {Completed | Failed}`:
//! - a response without a [`CallFailure`] extension completes the call
//! - a response carrying one, an inner `Err`, or a panic fails it
//!
//! Documentation and monitoring calls write nothing at entry. A success
//! persists the completed record; a failure only gets the minimal console line.
//!
//! Responses and errors pass through unchanged; panics are resumed after
//! being recorded.

use axum::{extract::Request, http::StatusCode, response::Response};
use futures::FutureExt;
use std::{
    fmt::Display,
    future::Future,
    panic::{self, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};

use super::context::CallContext;
use super::correlation::{Correlation, FailureSlot};
use super::failure::CallFailure;
use super::recorder::AuditRecorder;

/// Audit logging layer
#[derive(Debug, Clone)]
pub struct AuditLayer {
    recorder: Arc<AuditRecorder>,
}

impl AuditLayer {
    pub fn new(recorder: Arc<AuditRecorder>) -> Self {
        Self { recorder }
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditMiddleware {
            inner,
            recorder: self.recorder.clone(),
        }
    }
}

/// Audit middleware service
#[derive(Debug, Clone)]
pub struct AuditMiddleware<S> {
    inner: S,
    recorder: Arc<AuditRecorder>,
}

impl<S> Service<Request> for AuditMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Display + Send,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        // Drive the clone that was polled ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let recorder = self.recorder.clone();

        Box::pin(async move {
            let ctx = CallContext::capture(&request, recorder.identity());
            let slot = request.extensions().get::<FailureSlot>().cloned();

            // Docs and monitoring calls are persisted only once they succeed
            let deferred = ctx.category.is_noise_prone();
            let correlation = if deferred {
                recorder.on_entry_deferred(&ctx)
            } else {
                recorder.on_entry(&ctx).await
            };
            if let Some(slot) = &slot {
                slot.set_correlation(correlation);
            }

            let outcome = AssertUnwindSafe(inner.call(request)).catch_unwind().await;

            match outcome {
                Ok(Ok(response)) => {
                    let status = response.status();
                    match response.extensions().get::<CallFailure>() {
                        None if deferred => {
                            recorder.on_exit_deferred(&ctx, correlation, status).await
                        },
                        None => recorder.on_exit(&ctx, correlation, status).await,
                        Some(failure) => {
                            record_failure(&recorder, &ctx, correlation, Some(status), failure)
                                .await;
                            mark_recorded(slot.as_ref());
                        },
                    }
                    Ok(response)
                },
                Ok(Err(e)) => {
                    let failure = CallFailure::from_display(&e);
                    record_failure(&recorder, &ctx, correlation, None, &failure).await;
                    mark_recorded(slot.as_ref());
                    Err(e)
                },
                Err(payload) => {
                    let failure = CallFailure::from_panic(payload.as_ref());
                    record_failure(&recorder, &ctx, correlation, None, &failure).await;
                    mark_recorded(slot.as_ref());
                    panic::resume_unwind(payload)
                },
            }
        })
    }
}

/// Full failure record, or the console-only line for docs and monitoring traffic
async fn record_failure(
    recorder: &AuditRecorder,
    ctx: &CallContext,
    correlation: Correlation,
    status: Option<StatusCode>,
    failure: &CallFailure,
) {
    if ctx.category.is_noise_prone() {
        recorder.on_failure_minimal(ctx, correlation, failure);
    } else {
        recorder.on_failure(ctx, correlation, status, failure).await;
    }
}

fn mark_recorded(slot: Option<&FailureSlot>) {
    if let Some(slot) = slot {
        slot.mark_failure_recorded();
    }
}
