//! Metrics middleware for operations.
//!
//! Records per-operation call counts and durations through the `metrics`
//! facade, and wraps the call in a `tracing` span carrying the same fields.
//! Without an installed recorder the facade calls are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use day2_core::{OperationError, OperationOutput, OperationResult};
use metrics::{describe_counter, describe_histogram, Unit};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::Invocation;

/// Counter of completed calls, labeled by operation and outcome.
pub const CALLS_TOTAL: &str = "day2_operation_calls_total";
/// Histogram of time spent below the metrics stage, in seconds.
pub const DURATION_SECONDS: &str = "day2_operation_duration_seconds";

/// Registers help text for every dispatch metric with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(CALLS_TOTAL, "Completed operation calls by outcome");
    describe_histogram!(
        DURATION_SECONDS,
        Unit::Seconds,
        "Time spent executing operation bodies"
    );
    describe_counter!(
        super::throttle::THROTTLED_TOTAL,
        "Calls rejected by the per-caller rate limit"
    );
}

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records operation duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Invocation> for MetricsService<S>
where
    S: Service<Invocation, Response = OperationOutput, Error = OperationError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationOutput;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = OperationResult> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, inv: Invocation) -> Self::Future {
        let operation = inv.operation_name().to_string();

        let span = info_span!(
            "operation",
            operation = %operation,
            caller = %inv.ctx.caller_id,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(inv);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "success",
                    Err(err) => err.kind().as_str(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    CALLS_TOTAL,
                    "operation" => operation.clone(),
                    "outcome" => outcome,
                )
                .increment(1);
                metrics::histogram!(DURATION_SECONDS, "operation" => operation.clone())
                    .record(elapsed.as_secs_f64());

                tracing::info!(
                    operation = %operation,
                    duration_ms,
                    outcome,
                    "operation complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
