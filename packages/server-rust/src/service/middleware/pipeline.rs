//! Pipeline composition: combines all middleware layers into a single service stack.

use std::sync::Arc;

use day2_core::{ClockSource, OperationError, OperationOutput};
use tower::util::BoxCloneSyncService;
use tower::ServiceBuilder;

use super::audit::{AuditLayer, AuditSink};
use super::execute::ExecuteService;
use super::metrics::MetricsLayer;
use super::throttle::{OperationLimiter, ThrottleLayer};
use crate::service::config::ServerConfig;
use crate::service::operation::Invocation;

/// The composed chain shared by every dispatch. Cloning is cheap.
pub type DecoratorChain = BoxCloneSyncService<Invocation, OperationOutput, OperationError>;

/// Build the decorator chain around the execution stage.
///
/// Layer order (outermost to innermost):
/// 1. `AuditLayer` -- before/after records for every admitted call, throttled ones included
/// 2. `ThrottleLayer` -- per-(caller, operation) rate limit, the only short-circuit
/// 3. `MetricsLayer` -- call counts and durations
/// 4. `ExecuteService` -- runs the body under cancellation, timeout, and panic capture
#[must_use]
pub fn build_decorator_chain(
    config: &ServerConfig,
    limiter: Arc<OperationLimiter>,
    audit_sink: Arc<dyn AuditSink>,
    clock: Arc<dyn ClockSource>,
) -> DecoratorChain {
    let service = ServiceBuilder::new()
        .layer(AuditLayer::new(audit_sink, clock))
        .layer(ThrottleLayer::new(limiter))
        .layer(MetricsLayer)
        .service(ExecuteService::new(config.default_operation_timeout()));
    BoxCloneSyncService::new(service)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
