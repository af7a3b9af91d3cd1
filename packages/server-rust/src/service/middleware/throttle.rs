//! Throttle middleware for operations.
//!
//! Enforces a per-(caller, operation) rate limit and rejects excess calls with
//! `OperationError::Throttled` without invoking the inner chain. This is the
//! only stage of the chain allowed to short-circuit.
//!
//! The limiter is a keyed GCRA from `governor`: a burst of
//! `max_calls_per_window` calls is admitted, and one slot is replenished every
//! `window / max_calls_per_window`. Slot accounting is a lock-free CAS, so two
//! callers racing at the window edge cannot both slip past the limit.

use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use day2_core::{OperationError, OperationOutput, OperationResult};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower::{Layer, Service};
use tracing::debug;

use crate::service::config::ThrottleConfig;
use crate::service::operation::Invocation;
use crate::service::registry::OperationKey;

/// Counter of calls rejected by the throttle stage.
pub const THROTTLED_TOTAL: &str = "day2_operation_throttled_total";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThrottleConfigError {
    #[error("max_calls_per_window must be greater than zero")]
    ZeroCalls,
    #[error("throttle window is too short for {max_calls} calls")]
    WindowTooShort { max_calls: u32 },
}

/// Throttle bucket key: one bucket per caller and case-folded operation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey {
    pub caller_id: String,
    pub operation: OperationKey,
}

// ---------------------------------------------------------------------------
// OperationLimiter
// ---------------------------------------------------------------------------

/// Shared rate-limit state for the throttle stage.
pub struct OperationLimiter {
    /// `None` when throttling is disabled.
    limiter: Option<DefaultKeyedRateLimiter<ThrottleKey>>,
    clock: DefaultClock,
}

impl OperationLimiter {
    /// Builds a limiter from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the limit is zero or the window is too short to
    /// divide into `max_calls_per_window` slots.
    pub fn new(config: &ThrottleConfig) -> Result<Self, ThrottleConfigError> {
        let clock = DefaultClock::default();
        if !config.enabled {
            return Ok(Self {
                limiter: None,
                clock,
            });
        }

        let burst =
            NonZeroU32::new(config.max_calls_per_window).ok_or(ThrottleConfigError::ZeroCalls)?;
        let replenish = config.window / burst.get();
        let quota = Quota::with_period(replenish)
            .ok_or(ThrottleConfigError::WindowTooShort {
                max_calls: burst.get(),
            })?
            .allow_burst(burst);

        Ok(Self {
            limiter: Some(RateLimiter::keyed(quota)),
            clock,
        })
    }

    /// A limiter that admits everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            limiter: None,
            clock: DefaultClock::default(),
        }
    }

    /// Consumes one slot for `key`.
    ///
    /// # Errors
    ///
    /// Returns the time until the next slot frees up when the bucket is empty.
    pub fn check(&self, key: &ThrottleKey) -> Result<(), Duration> {
        match &self.limiter {
            None => Ok(()),
            Some(limiter) => limiter
                .check_key(key)
                .map_err(|not_until| not_until.wait_time_from(self.clock.now())),
        }
    }

    /// Drops buckets that are back at full capacity. Returns how many remain.
    pub fn prune(&self) -> usize {
        match &self.limiter {
            None => 0,
            Some(limiter) => {
                limiter.retain_recent();
                limiter.shrink_to_fit();
                limiter.len()
            }
        }
    }

    /// Number of tracked buckets.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}

// ---------------------------------------------------------------------------
// ThrottleLayer
// ---------------------------------------------------------------------------

/// Tower layer that applies an [`OperationLimiter`] to each invocation.
#[derive(Clone)]
pub struct ThrottleLayer {
    limiter: Arc<OperationLimiter>,
}

impl ThrottleLayer {
    #[must_use]
    pub fn new(limiter: Arc<OperationLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ThrottleService {
            inner,
            limiter: Arc::clone(&self.limiter),
        }
    }
}

// ---------------------------------------------------------------------------
// ThrottleService
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ThrottleService<S> {
    inner: S,
    limiter: Arc<OperationLimiter>,
}

impl<S> Service<Invocation> for ThrottleService<S>
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
        let key = ThrottleKey {
            caller_id: inv.ctx.caller_id.clone(),
            operation: OperationKey::new(inv.operation_name()),
        };

        if let Err(retry_after) = self.limiter.check(&key) {
            let operation = inv.operation_name().to_string();
            let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
            debug!(
                operation = %operation,
                caller = %key.caller_id,
                retry_after_ms,
                "operation throttled"
            );
            metrics::counter!(THROTTLED_TOTAL, "operation" => operation.clone()).increment(1);
            return Box::pin(async move {
                Err(OperationError::Throttled {
                    operation,
                    retry_after_ms,
                })
            });
        }

        let fut = self.inner.call(inv);
        Box::pin(fut)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
