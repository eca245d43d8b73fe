//! Workflow and step state machines.

use serde::{Deserialize, Serialize};

/// The status of a workflow in its lifecycle.
///
/// State transitions:
/// ```text
/// Running ──┬──► Completed
///           ├──► Compensated
///           └──► Failed ──► Compensated (manual)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Steps are being executed.
    #[default]
    Running,

    /// All steps completed successfully.
    Completed,

    /// The workflow stopped without compensating anything.
    Failed,

    /// A step failed and earlier steps were compensated.
    Compensated,
}

impl WorkflowStatus {
    /// Returns true if the workflow may move from this status to `next`.
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        matches!(
            (self, next),
            (WorkflowStatus::Running, WorkflowStatus::Completed)
                | (WorkflowStatus::Running, WorkflowStatus::Failed)
                | (WorkflowStatus::Running, WorkflowStatus::Compensated)
                | (WorkflowStatus::Failed, WorkflowStatus::Compensated)
        )
    }

    /// Returns true once the engine has finished with the workflow.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Running)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    /// Returns true once the step outcome is recorded.
    pub fn is_final(&self) -> bool {
        !matches!(self, StepStatus::Running)
    }
}
