//! Request type carried through the decorator chain.

use std::sync::Arc;

use day2_core::{Arguments, ExecutionContext, OperationDescriptor};

/// One admitted call: resolved descriptor, caller context, validated arguments.
///
/// Built by the dispatcher after resolution, authorization, and validation
/// succeed; every decorator receives and forwards the same value.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub descriptor: Arc<OperationDescriptor>,
    pub ctx: ExecutionContext,
    pub args: Arguments,
}

impl Invocation {
    #[must_use]
    pub fn new(descriptor: Arc<OperationDescriptor>, ctx: ExecutionContext, args: Arguments) -> Self {
        Self {
            descriptor,
            ctx,
            args,
        }
    }

    /// Registered name of the invoked operation.
    #[must_use]
    pub fn operation_name(&self) -> &str {
        self.descriptor.name()
    }
}

/// Dispatch lifecycle.
///
/// State machine: Received -> Resolved -> Authorized -> Validated -> Executing -> Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DispatchStage {
    Received,
    Resolved,
    Authorized,
    Validated,
    Executing,
    Completed,
}

impl DispatchStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Resolved => "resolved",
            Self::Authorized => "authorized",
            Self::Validated => "validated",
            Self::Executing => "executing",
            Self::Completed => "completed",
        }
    }
}
