//! Innermost stage of the decorator chain: runs the operation body.
//!
//! The body is raced against the context's cancellation token and its
//! timeout (or the server default). Either firing first yields
//! `OperationError::Cancelled`; a panic in the body becomes
//! `OperationError::ExecutionFailure`.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use day2_core::{OperationError, OperationOutput, OperationResult};
use futures_util::FutureExt;
use tower::Service;
use tracing::error;

use crate::service::operation::Invocation;

#[derive(Debug, Clone, Default)]
pub struct ExecuteService {
    default_timeout: Option<Duration>,
}

impl ExecuteService {
    /// `default_timeout` applies to contexts that carry no timeout of their own.
    #[must_use]
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }
}

impl Service<Invocation> for ExecuteService {
    type Response = OperationOutput;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = OperationResult> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, inv: Invocation) -> Self::Future {
        let timeout = inv.ctx.timeout.or(self.default_timeout);
        Box::pin(run_body(inv, timeout))
    }
}

async fn run_body(inv: Invocation, timeout: Option<Duration>) -> OperationResult {
    let Invocation {
        descriptor,
        ctx,
        args,
    } = inv;

    if ctx.is_cancelled() {
        return Err(OperationError::cancelled("cancelled before execution"));
    }

    let handler = descriptor.handler();
    let body = AssertUnwindSafe(handler.execute(&ctx, &args)).catch_unwind();
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        () = ctx.cancellation.cancelled() => {
            Err(OperationError::cancelled("cancelled by caller"))
        }
        () = deadline => {
            let limit_ms = timeout.map_or(0, |t| t.as_millis());
            Err(OperationError::cancelled(format!("timed out after {limit_ms}ms")))
        }
        caught = body => match caught {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(operation = descriptor.name(), panic = %message, "operation body panicked");
                Err(OperationError::execution(format!("operation panicked: {message}")))
            }
        },
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use day2_core::{
        handler_fn, validate, Arguments, ErrorKind, ExecutionContext, OperationDescriptor,
        OperationHandler, ParamType, ParameterSpec,
    };
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use super::*;

    fn make_inv<H: OperationHandler + 'static>(handler: H, ctx: ExecutionContext) -> Invocation {
        let descriptor = OperationDescriptor::builder("StartCluster", "AKS-Operator")
            .parameter(ParameterSpec::required(
                "ResourceId",
                ParamType::String,
                "Cluster to start",
            ))
            .handler(handler)
            .build()
            .unwrap();
        let target = ctx.target_resource_id.clone();
        let ctx = ctx.with_parameter("ResourceId", target);
        let args = validate(descriptor.parameters(), &ctx.parameters).unwrap();
        Invocation::new(Arc::new(descriptor), ctx, args)
    }

    #[tokio::test]
    async fn runs_body_with_validated_arguments() {
        let handler = handler_fn(|_ctx: ExecutionContext, args: Arguments| async move {
            Ok(serde_json::json!({ "started": args.str("ResourceId") }))
        });
        let out = ExecuteService::default()
            .oneshot(make_inv(handler, ExecutionContext::new("alice", "rg1/cluster1")))
            .await
            .unwrap();
        assert_eq!(out["started"], "rg1/cluster1");
    }

    #[tokio::test]
    async fn body_failure_is_returned_unchanged() {
        let handler = handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
            Err(OperationError::execution("cluster is locked"))
        });
        let err = ExecuteService::default()
            .oneshot(make_inv(handler, ExecutionContext::new("alice", "rg1/cluster1")))
            .await
            .unwrap_err();
        assert_eq!(err, OperationError::execution("cluster is locked"));
    }

    #[tokio::test]
    async fn panic_becomes_execution_failure() {
        let handler = handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
            if true {
                panic!("backend exploded");
            }
            Ok(serde_json::Value::Null)
        });
        let err = ExecuteService::default()
            .oneshot(make_inv(handler, ExecutionContext::new("alice", "rg1/cluster1")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
        assert!(err.to_string().contains("backend exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn context_timeout_cancels_body() {
        let handler = handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(serde_json::Value::Null)
        });
        let ctx = ExecutionContext::new("alice", "rg1/cluster1")
            .with_timeout(Duration::from_millis(100));
        let err = ExecuteService::default()
            .oneshot(make_inv(handler, ctx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(err.to_string().contains("100ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn default_timeout_applies_when_context_has_none() {
        let handler = handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(serde_json::Value::Null)
        });
        let err = ExecuteService::new(Some(Duration::from_secs(5)))
            .oneshot(make_inv(handler, ExecutionContext::new("alice", "rg1/cluster1")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_token_stops_body() {
        let token = CancellationToken::new();
        let handler = handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
            std::future::pending::<()>().await;
            Ok(serde_json::Value::Null)
        });
        let ctx = ExecutionContext::new("alice", "rg1/cluster1").with_cancellation(token.clone());
        let call = tokio::spawn(ExecuteService::default().oneshot(make_inv(handler, ctx)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err, OperationError::cancelled("cancelled by caller"));
    }

    #[tokio::test]
    async fn already_cancelled_context_skips_body() {
        let token = CancellationToken::new();
        token.cancel();
        let handler = handler_fn(|_ctx: ExecutionContext, _args: Arguments| async move {
            Err(OperationError::execution("must not run"))
        });
        let ctx = ExecutionContext::new("alice", "rg1/cluster1").with_cancellation(token);
        let err = ExecuteService::default()
            .oneshot(make_inv(handler, ctx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn panic_message_handles_common_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(s.as_ref()), "owned");
        let s: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(s.as_ref()), "unknown panic");
    }
}
