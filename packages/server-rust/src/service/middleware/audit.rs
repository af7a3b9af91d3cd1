//! Audit middleware for operations.
//!
//! Writes a `Started` record before the inner chain runs and a `Completed`
//! record after it returns, whatever the outcome. Sink failures are logged
//! and swallowed; they never change the operation's result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use async_trait::async_trait;
use day2_core::{ClockSource, ErrorKind, OperationError, OperationOutput, OperationResult};
use serde::Serialize;
use tower::{Layer, Service};
use tracing::{info, warn};
use uuid::Uuid;

use crate::service::operation::Invocation;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Result status recorded on completion.
///
/// Serializes as `"Success"` or as the failure's `errorKind` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Success,
    Failure { error_kind: ErrorKind },
}

impl Serialize for AuditStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl AuditStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Failure { error_kind } => error_kind.as_str(),
        }
    }

    fn of(result: &OperationResult) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => Self::Failure {
                error_kind: err.kind(),
            },
        }
    }
}

/// Which side of the invocation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AuditPhase {
    Started,
    Completed { status: AuditStatus, duration_ms: u64 },
}

/// One audit entry. Both entries of a call share `invocation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub invocation_id: Uuid,
    /// Milliseconds since Unix epoch.
    pub timestamp_ms: u64,
    pub caller_id: String,
    pub operation: String,
    pub target_resource_id: String,
    #[serde(flatten)]
    pub phase: AuditPhase,
}

impl AuditRecord {
    fn started(invocation_id: Uuid, timestamp_ms: u64, inv: &Invocation) -> Self {
        Self {
            invocation_id,
            timestamp_ms,
            caller_id: inv.ctx.caller_id.clone(),
            operation: inv.operation_name().to_string(),
            target_resource_id: inv.ctx.target_resource_id.clone(),
            phase: AuditPhase::Started,
        }
    }

    fn completed(&self, timestamp_ms: u64, status: AuditStatus, started_at: Instant) -> Self {
        Self {
            timestamp_ms,
            phase: AuditPhase::Completed {
                status,
                duration_ms: u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            },
            ..self.clone()
        }
    }

    #[must_use]
    pub fn is_completion(&self) -> bool {
        matches!(self.phase, AuditPhase::Completed { .. })
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination for audit records (log store, event hub, ...).
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()>;
}

/// Emits each record as a structured `tracing` event on the `day2::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()> {
        let payload = serde_json::to_string(record)?;
        info!(
            target: "day2::audit",
            invocation_id = %record.invocation_id,
            operation = %record.operation,
            caller = %record.caller_id,
            record = %payload,
            "audit"
        );
        Ok(())
    }
}

/// Keeps records in memory. Used by tests and for in-process inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: parking_lot::Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records written so far.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> anyhow::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

async fn write_record(sink: &dyn AuditSink, record: &AuditRecord) {
    if let Err(err) = sink.record(record).await {
        warn!(
            invocation_id = %record.invocation_id,
            operation = %record.operation,
            error = %err,
            "audit sink failed; continuing"
        );
    }
}

// ---------------------------------------------------------------------------
// AuditLayer
// ---------------------------------------------------------------------------

/// Tower layer that audits every invocation passing through it.
#[derive(Clone)]
pub struct AuditLayer {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn ClockSource>,
}

impl AuditLayer {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, clock: Arc<dyn ClockSource>) -> Self {
        Self { sink, clock }
    }
}

impl<S> Layer<S> for AuditLayer {
    type Service = AuditService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuditService {
            inner,
            sink: Arc::clone(&self.sink),
            clock: Arc::clone(&self.clock),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AuditService<S> {
    inner: S,
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn ClockSource>,
}

impl<S> Service<Invocation> for AuditService<S>
where
    S: Service<Invocation, Response = OperationOutput, Error = OperationError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
{
    type Response = OperationOutput;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = OperationResult> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, inv: Invocation) -> Self::Future {
        // Take the readied inner service; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let sink = Arc::clone(&self.sink);
        let clock = Arc::clone(&self.clock);

        Box::pin(async move {
            let started = AuditRecord::started(Uuid::new_v4(), clock.now_millis(), &inv);
            write_record(sink.as_ref(), &started).await;

            let mut guard = CompletionGuard {
                sink: Arc::clone(&sink),
                clock: Arc::clone(&clock),
                started: Some(started),
                started_at: Instant::now(),
            };

            let result = inner.call(inv).await;

            if let Some(started) = guard.disarm() {
                let completed =
                    started.completed(clock.now_millis(), AuditStatus::of(&result), guard.started_at);
                write_record(sink.as_ref(), &completed).await;
            }
            result
        })
    }
}

/// Writes a `Cancelled` completion if the audited future is dropped mid-flight,
/// so every `Started` record gets exactly one `Completed` record.
struct CompletionGuard {
    sink: Arc<dyn AuditSink>,
    clock: Arc<dyn ClockSource>,
    started: Option<AuditRecord>,
    started_at: Instant,
}

impl CompletionGuard {
    fn disarm(&mut self) -> Option<AuditRecord> {
        self.started.take()
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        let completed = started.completed(
            self.clock.now_millis(),
            AuditStatus::Failure {
                error_kind: ErrorKind::Cancelled,
            },
            self.started_at,
        );
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let sink = Arc::clone(&self.sink);
                handle.spawn(async move { write_record(sink.as_ref(), &completed).await });
            }
            Err(_) => warn!(
                invocation_id = %completed.invocation_id,
                "audited call dropped outside a runtime; completion record lost"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
