//! Saga error types.

use common::WorkflowId;
use thiserror::Error;

use crate::state::WorkflowStatus;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The orchestration request is malformed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No workflow with this id is known.
    #[error("Workflow not found: {0}")]
    NotFound(WorkflowId),

    /// Workflow is in an invalid state for the requested operation.
    #[error("Invalid workflow state: expected {expected}, actual {actual}")]
    InvalidState {
        expected: String,
        actual: WorkflowStatus,
    },

    /// Another manual compensation of this workflow is still running.
    #[error("Compensation already in progress for workflow {0}")]
    CompensationInProgress(WorkflowId),

    /// A participant call failed or returned a non-success result.
    #[error("{participant} service error: {reason}")]
    Participant {
        participant: &'static str,
        reason: String,
    },

    /// A participant call did not answer in time.
    #[error("Step '{step}' timed out after {timeout_ms}ms")]
    Timeout { step: &'static str, timeout_ms: u64 },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected fault inside the engine.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SagaError {
    pub(crate) fn participant(participant: &'static str, reason: impl ToString) -> Self {
        SagaError::Participant {
            participant,
            reason: reason.to_string(),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
