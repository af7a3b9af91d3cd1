//! Tower middleware layers for the decorator chain.
//!
//! - [`audit`]: Before/after audit records
//! - [`throttle`]: Per-(caller, operation) rate limiting
//! - [`metrics`]: Call counts and durations via the `metrics` facade
//! - [`execute`]: Runs the operation body
//! - [`pipeline`]: Composes all layers into a single service stack

pub mod audit;
pub mod execute;
pub mod metrics;
pub mod pipeline;
pub mod throttle;

pub use audit::{
    AuditLayer, AuditPhase, AuditRecord, AuditSink, AuditStatus, MemoryAuditSink,
    TracingAuditSink,
};
pub use execute::ExecuteService;
pub use self::metrics::{describe_metrics, MetricsLayer};
pub use pipeline::{build_decorator_chain, DecoratorChain};
pub use throttle::{OperationLimiter, ThrottleConfigError, ThrottleKey, ThrottleLayer};
