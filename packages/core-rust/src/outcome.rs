//! Wire envelope for dispatch results.
//!
//! Serializes as `{"status":"Success","output":...}` or
//! `{"status":"Failure","errorKind":...,"detail":...,"fields":[...]}`.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::traits::{OperationOutput, OperationResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum OperationOutcome {
    Success {
        output: OperationOutput,
    },
    Failure {
        #[serde(rename = "errorKind")]
        error_kind: ErrorKind,
        detail: String,
        /// Offending parameter names for validation failures.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        fields: Vec<String>,
    },
}

impl OperationOutcome {
    /// Error kind of a failure, `None` on success.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error_kind, .. } => Some(*error_kind),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<OperationResult> for OperationOutcome {
    fn from(result: OperationResult) -> Self {
        match result {
            Ok(output) => Self::Success { output },
            Err(err) => Self::Failure {
                error_kind: err.kind(),
                detail: err.detail(),
                fields: err.fields(),
            },
        }
    }
}
