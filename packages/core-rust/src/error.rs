//! Failure taxonomy shared by the dispatcher, the decorator chain, and handlers.
//!
//! Every failure maps to exactly one [`ErrorKind`], whose string form is the
//! stable `errorKind` value exposed on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable classification of an operation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No operation is registered under the requested name.
    NotFound,
    /// The caller's roles do not include the operation's capability.
    Unauthorized,
    /// Parameters are missing or do not match the declared schema.
    ValidationFailure,
    /// The per-caller, per-operation rate limit was exceeded.
    #[serde(rename = "ThrottledError")]
    Throttled,
    /// The operation's own logic failed or panicked.
    ExecutionFailure,
    /// The caller cancelled the call or its deadline elapsed.
    Cancelled,
}

impl ErrorKind {
    /// Returns the wire name of this kind (e.g. `"ThrottledError"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::Unauthorized => "Unauthorized",
            Self::ValidationFailure => "ValidationFailure",
            Self::Throttled => "ThrottledError",
            Self::ExecutionFailure => "ExecutionFailure",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether the dispatcher detects this kind before entering the decorator chain.
    #[must_use]
    pub const fn is_pre_dispatch(self) -> bool {
        matches!(
            self,
            Self::NotFound | Self::Unauthorized | Self::ValidationFailure
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rejected parameter, reported inside [`OperationError::ValidationFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Parameter name exactly as declared in the schema.
    pub field: String,
    /// Why the value was rejected.
    pub reason: ViolationReason,
}

/// Reason attached to a [`FieldViolation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    /// A required parameter is absent.
    Missing,
    /// A required parameter is present but empty or whitespace.
    Empty,
    /// The value does not parse as the declared type.
    InvalidType,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self.reason {
            ViolationReason::Missing => "missing",
            ViolationReason::Empty => "empty",
            ViolationReason::InvalidType => "invalid type",
        };
        write!(f, "{} ({reason})", self.field)
    }
}

/// Errors produced anywhere along the dispatch path.
///
/// The `Display` output is the human-readable `detail` sent to callers, so
/// variants never embed backtraces or internal identifiers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperationError {
    #[error("unknown operation: {name}")]
    NotFound { name: String },
    #[error("missing required capability: {capability}")]
    Unauthorized { capability: String },
    #[error("invalid parameters: {}", join_violations(.violations))]
    ValidationFailure { violations: Vec<FieldViolation> },
    #[error("rate limit exceeded for {operation}, retry after {retry_after_ms}ms")]
    Throttled {
        operation: String,
        retry_after_ms: u64,
    },
    #[error("{message}")]
    ExecutionFailure { message: String },
    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl OperationError {
    /// Shorthand for an [`OperationError::ExecutionFailure`].
    pub fn execution(message: impl Into<String>) -> Self {
        Self::ExecutionFailure {
            message: message.into(),
        }
    }

    /// Shorthand for an [`OperationError::Cancelled`].
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Returns the stable classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::ValidationFailure { .. } => ErrorKind::ValidationFailure,
            Self::Throttled { .. } => ErrorKind::Throttled,
            Self::ExecutionFailure { .. } => ErrorKind::ExecutionFailure,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns the human-readable detail string.
    #[must_use]
    pub fn detail(&self) -> String {
        self.to_string()
    }

    /// Names of the offending parameters, empty unless this is a validation failure.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        match self {
            Self::ValidationFailure { violations } => {
                violations.iter().map(|v| v.field.clone()).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl From<anyhow::Error> for OperationError {
    fn from(err: anyhow::Error) -> Self {
        // Alternate formatting keeps the context chain but never the backtrace.
        Self::ExecutionFailure {
            message: format!("{err:#}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_strings_are_stable() {
        assert_eq!(ErrorKind::NotFound.as_str(), "NotFound");
        assert_eq!(ErrorKind::Unauthorized.as_str(), "Unauthorized");
        assert_eq!(ErrorKind::ValidationFailure.as_str(), "ValidationFailure");
        assert_eq!(ErrorKind::Throttled.as_str(), "ThrottledError");
        assert_eq!(ErrorKind::ExecutionFailure.as_str(), "ExecutionFailure");
        assert_eq!(ErrorKind::Cancelled.as_str(), "Cancelled");
    }

    #[test]
    fn kind_serializes_to_wire_name() {
        let json = serde_json::to_string(&ErrorKind::Throttled).unwrap();
        assert_eq!(json, "\"ThrottledError\"");
    }

    #[test]
    fn validation_detail_names_fields() {
        let err = OperationError::ValidationFailure {
            violations: vec![
                FieldViolation {
                    field: "ResourceId".to_string(),
                    reason: ViolationReason::Missing,
                },
                FieldViolation {
                    field: "TargetVersion".to_string(),
                    reason: ViolationReason::InvalidType,
                },
            ],
        };
        assert_eq!(
            err.detail(),
            "invalid parameters: ResourceId (missing), TargetVersion (invalid type)"
        );
        assert_eq!(err.fields(), vec!["ResourceId", "TargetVersion"]);
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }

    #[test]
    fn anyhow_converts_to_execution_failure() {
        let err: OperationError = anyhow::anyhow!("backend unreachable")
            .context("start cluster")
            .into();
        assert_eq!(err.kind(), ErrorKind::ExecutionFailure);
        assert_eq!(err.detail(), "start cluster: backend unreachable");
    }

    #[test]
    fn pre_dispatch_kinds() {
        assert!(ErrorKind::NotFound.is_pre_dispatch());
        assert!(ErrorKind::Unauthorized.is_pre_dispatch());
        assert!(ErrorKind::ValidationFailure.is_pre_dispatch());
        assert!(!ErrorKind::Throttled.is_pre_dispatch());
        assert!(!ErrorKind::ExecutionFailure.is_pre_dispatch());
    }
}
