//! Single entry point for invoking a registered operation.
//!
//! Resolution, authorization, and validation run here, before the decorator
//! chain, so failures at those stages never reach a decorator. Everything that
//! passes is handed to the chain as an [`Invocation`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use day2_core::{
    validate, CallerClaims, ClockSource, ExecutionContext, OperationError, OperationResult,
    SystemClock,
};
use futures_util::FutureExt;
use tower::ServiceExt;
use tracing::{debug, info_span, warn, Instrument};

use crate::service::config::ServerConfig;
use crate::service::gate::AuthorizationGate;
use crate::service::middleware::audit::{AuditSink, TracingAuditSink};
use crate::service::middleware::execute::panic_message;
use crate::service::middleware::pipeline::{build_decorator_chain, DecoratorChain};
use crate::service::middleware::throttle::{OperationLimiter, ThrottleConfigError};
use crate::service::operation::{DispatchStage, Invocation};
use crate::service::registry::OperationRegistry;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Resolves, authorizes, validates, and executes operations.
///
/// Holds no per-call state; clones of the inner chain run concurrently.
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    gate: AuthorizationGate,
    chain: DecoratorChain,
    limiter: Arc<OperationLimiter>,
}

impl Dispatcher {
    #[must_use]
    pub fn builder(registry: Arc<OperationRegistry>) -> DispatcherBuilder {
        DispatcherBuilder {
            registry,
            config: ServerConfig::default(),
            audit_sink: None,
            clock: None,
        }
    }

    /// Dispatch `name` on behalf of `claims`.
    ///
    /// Never panics: a panic anywhere in the chain is reported as
    /// `ExecutionFailure`.
    pub async fn execute(
        &self,
        name: &str,
        ctx: ExecutionContext,
        claims: &CallerClaims,
    ) -> OperationResult {
        let span = info_span!(
            "dispatch",
            operation = name,
            caller = %ctx.caller_id,
            subject = %claims.subject_id,
            stage = DispatchStage::Received.as_str(),
        );
        self.dispatch(name, ctx, claims).instrument(span).await
    }

    async fn dispatch(
        &self,
        name: &str,
        ctx: ExecutionContext,
        claims: &CallerClaims,
    ) -> OperationResult {
        let Ok(descriptor) = self.registry.resolve(name) else {
            debug!("unknown operation");
            return Err(OperationError::NotFound {
                name: name.to_string(),
            });
        };
        record_stage(DispatchStage::Resolved);

        if !self.gate.check(&descriptor, claims).is_allowed() {
            warn!(
                capability = descriptor.required_capability(),
                "caller lacks required capability"
            );
            return Err(OperationError::Unauthorized {
                capability: descriptor.required_capability().to_string(),
            });
        }
        record_stage(DispatchStage::Authorized);

        let args = validate(descriptor.parameters(), &ctx.parameters).map_err(|violations| {
            debug!(violations = violations.len(), "parameter validation failed");
            OperationError::ValidationFailure { violations }
        })?;
        record_stage(DispatchStage::Validated);

        if ctx.is_cancelled() {
            return Err(OperationError::cancelled("cancelled before dispatch"));
        }
        record_stage(DispatchStage::Executing);

        let invocation = Invocation::new(descriptor, ctx, args);
        let result = AssertUnwindSafe(self.chain.clone().oneshot(invocation))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                warn!(panic = %message, "decorator chain panicked");
                Err(OperationError::execution(format!(
                    "operation panicked: {message}"
                )))
            });
        record_stage(DispatchStage::Completed);
        result
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Shared throttle state, for the background sweeper.
    #[must_use]
    pub fn limiter(&self) -> &Arc<OperationLimiter> {
        &self.limiter
    }
}

fn record_stage(stage: DispatchStage) {
    tracing::Span::current().record("stage", stage.as_str());
}

// ---------------------------------------------------------------------------
// DispatcherBuilder
// ---------------------------------------------------------------------------

pub struct DispatcherBuilder {
    registry: Arc<OperationRegistry>,
    config: ServerConfig,
    audit_sink: Option<Arc<dyn AuditSink>>,
    clock: Option<Arc<dyn ClockSource>>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Defaults to [`TracingAuditSink`].
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Defaults to [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Composes the decorator chain.
    ///
    /// # Errors
    ///
    /// Returns an error if the throttle configuration is invalid.
    pub fn build(self) -> Result<Dispatcher, ThrottleConfigError> {
        let limiter = Arc::new(OperationLimiter::new(&self.config.throttle)?);
        let audit_sink = self
            .audit_sink
            .unwrap_or_else(|| Arc::new(TracingAuditSink));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let chain = build_decorator_chain(&self.config, Arc::clone(&limiter), audit_sink, clock);

        Ok(Dispatcher {
            registry: self.registry,
            gate: AuthorizationGate,
            chain,
            limiter,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
