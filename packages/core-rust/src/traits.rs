use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::OperationError;
use crate::schema::Arguments;

/// Opaque payload returned by a successful operation.
pub type OperationOutput = serde_json::Value;

/// Normalized result of one dispatch.
pub type OperationResult = Result<OperationOutput, OperationError>;

/// Executable body of a governed operation.
///
/// Implementations receive parameters that already passed schema validation.
/// They may block on external systems; cancellation is enforced by the
/// caller, so bodies do not need to poll the context's token themselves.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn execute(&self, ctx: &ExecutionContext, args: &Arguments) -> OperationResult;
}

/// Adapter that lets an async closure act as an [`OperationHandler`].
///
/// ```
/// use day2_core::{handler_fn, ExecutionContext, Arguments};
///
/// let handler = handler_fn(|ctx: ExecutionContext, _args: Arguments| async move {
///     Ok(serde_json::json!({ "target": ctx.target_resource_id }))
/// });
/// # let _ = handler;
/// ```
pub struct HandlerFn<F>(F);

/// Wraps `f` so it can be registered as an operation body.
///
/// The closure receives owned copies of the context and arguments, which
/// keeps the returned future `'static`.
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(ExecutionContext, Arguments) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = OperationResult> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> OperationHandler for HandlerFn<F>
where
    F: Fn(ExecutionContext, Arguments) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = OperationResult> + Send + 'static,
{
    async fn execute(&self, ctx: &ExecutionContext, args: &Arguments) -> OperationResult {
        (self.0)(ctx.clone(), args.clone()).await
    }
}
