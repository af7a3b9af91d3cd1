use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::types::CredentialsHandle;

/// Per-invocation context built by the caller-facing adapter.
///
/// Owned by a single dispatch; never shared across concurrent invocations.
/// Cancelling `cancellation` (or exceeding `timeout`) makes the chain return
/// `OperationError::Cancelled` promptly.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Identifier of the caller, recorded by the audit stage.
    pub caller_id: String,
    /// Resource the operation targets (e.g. `"rg1/cluster1"`).
    pub target_resource_id: String,
    /// Raw wire parameters. Validated against the schema before execution.
    pub parameters: HashMap<String, String>,
    pub credentials: CredentialsHandle,
    pub cancellation: CancellationToken,
    /// Upper bound on the time spent inside the operation body.
    pub timeout: Option<Duration>,
}

impl ExecutionContext {
    /// Creates a context with no parameters, credentials, or timeout.
    pub fn new(caller_id: impl Into<String>, target_resource_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            target_resource_id: target_resource_id.into(),
            parameters: HashMap::new(),
            credentials: CredentialsHandle::none(),
            cancellation: CancellationToken::new(),
            timeout: None,
        }
    }

    /// Adds (or replaces) a raw parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: HashMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialsHandle) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
