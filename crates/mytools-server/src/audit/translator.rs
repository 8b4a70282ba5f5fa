//! Outermost layer turning escaped failures into the generic 500
//!
//! Any `Err` or panic that reaches this layer is recorded, unless the audit
//! interceptor already did so for the same call, and replaced by a fixed
//! `INTERNAL_ERROR` body. Error details never reach the client.
//!
//! An inner service whose readiness fails is reported ready; the call that
//! follows is recorded and answered with the same 500 without invoking it.

use axum::{
    extract::Request,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::FutureExt;
use std::{
    convert::Infallible,
    fmt::Display,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};

use super::context::CallContext;
use super::correlation::{Correlation, FailureSlot};
use super::failure::CallFailure;
use super::recorder::AuditRecorder;
use crate::api::response::ErrorResponse;

/// Layer installing [`FailureTranslator`]
#[derive(Debug, Clone)]
pub struct FailureTranslatorLayer {
    recorder: Arc<AuditRecorder>,
}

impl FailureTranslatorLayer {
    pub fn new(recorder: Arc<AuditRecorder>) -> Self {
        Self { recorder }
    }
}

impl<S> Layer<S> for FailureTranslatorLayer {
    type Service = FailureTranslator<S>;

    fn layer(&self, inner: S) -> Self::Service {
        FailureTranslator {
            inner,
            recorder: self.recorder.clone(),
            not_ready: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailureTranslator<S> {
    inner: S,
    recorder: Arc<AuditRecorder>,
    /// Set when the inner service failed to become ready; the next call is
    /// answered without reaching it
    not_ready: Option<CallFailure>,
}

impl<S> Service<Request> for FailureTranslator<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Display + Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.inner.poll_ready(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(())) => {
                self.not_ready = None;
                Poll::Ready(Ok(()))
            },
            Poll::Ready(Err(e)) => {
                self.not_ready = Some(CallFailure::from_display(&e));
                Poll::Ready(Ok(()))
            },
        }
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let recorder = self.recorder.clone();

        if let Some(failure) = self.not_ready.take() {
            let ctx = CallContext::capture(&request, recorder.identity());
            let correlation = Correlation::unrecorded(recorder.start_ms());
            return Box::pin(async move {
                record_escaped(&recorder, &ctx, correlation, &failure).await;
                Ok(internal_error_response())
            });
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let started_at_ms = recorder.start_ms();
            let slot = FailureSlot::new();
            request.extensions_mut().insert(slot.clone());

            // Captured up front; the request is gone by the time a failure shows up
            let ctx = CallContext::capture(&request, recorder.identity());

            let failure = match AssertUnwindSafe(inner.call(request)).catch_unwind().await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => CallFailure::from_display(&e),
                Err(payload) => CallFailure::from_panic(payload.as_ref()),
            };

            if !slot.failure_recorded() {
                let correlation = slot
                    .correlation()
                    .unwrap_or_else(|| Correlation::unrecorded(started_at_ms));
                record_escaped(&recorder, &ctx, correlation, &failure).await;
            }

            Ok(internal_error_response())
        })
    }
}

async fn record_escaped(
    recorder: &AuditRecorder,
    ctx: &CallContext,
    correlation: Correlation,
    failure: &CallFailure,
) {
    if ctx.category.is_noise_prone() {
        recorder.on_failure_minimal(ctx, correlation, failure);
    } else {
        recorder.on_failure(ctx, correlation, None, failure).await;
    }
}

fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::internal()),
    )
        .into_response()
}
