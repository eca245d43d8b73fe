//! Workflow instance model.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, SalesId, WorkflowId};
use domain::OrderLine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};
use crate::state::{StepStatus, WorkflowStatus};

/// Request to place an order through the saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub customer_id: CustomerId,
    pub items: Vec<OrderLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
}

impl OrchestrationRequest {
    /// Checks the request before any workflow is created.
    pub fn validate(&self) -> Result<()> {
        if !self.customer_id.is_valid() {
            return Err(SagaError::Validation(
                "customer_id must be positive".to_string(),
            ));
        }
        if self.items.is_empty() {
            return Err(SagaError::Validation(
                "at least one item is required".to_string(),
            ));
        }
        for (index, item) in self.items.iter().enumerate() {
            if !item.product_id.is_valid() {
                return Err(SagaError::Validation(format!(
                    "items[{index}].product_id must be positive"
                )));
            }
            if item.quantity == 0 {
                return Err(SagaError::Validation(format!(
                    "items[{index}].quantity must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// One executed step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Aggregated result of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_id: Option<SalesId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_amount: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one compensation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationRecord {
    pub step: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// A single saga run.
///
/// Steps are append-only and a finished step never changes again. At most
/// one step is running at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub status: WorkflowStatus,
    pub steps: Vec<WorkflowStep>,
    pub request: OrchestrationRequest,
    pub response: OrchestrationResponse,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compensations: Vec<CompensationRecord>,
    /// Set while a manual compensation is in flight.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub compensating: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a running workflow for a request.
    pub fn new(request: OrchestrationRequest) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            status: WorkflowStatus::Running,
            steps: Vec::new(),
            request,
            response: OrchestrationResponse::default(),
            compensations: Vec::new(),
            compensating: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the step currently running, if any.
    pub fn running_step(&self) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.status == StepStatus::Running)
    }

    /// Names of completed steps in execution order.
    pub fn completed_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Appends a running step.
    pub fn begin_step(&mut self, name: &str) -> Result<()> {
        if self.status != WorkflowStatus::Running {
            return Err(SagaError::InvalidState {
                expected: WorkflowStatus::Running.to_string(),
                actual: self.status,
            });
        }
        if let Some(running) = self.running_step() {
            return Err(SagaError::Internal(format!(
                "cannot start step '{name}' while '{}' is running",
                running.name
            )));
        }

        self.steps.push(WorkflowStep {
            name: name.to_string(),
            status: StepStatus::Running,
            response: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        });
        self.touch();
        Ok(())
    }

    /// Marks the running step `name` completed with its response.
    pub fn complete_step(&mut self, name: &str, response: serde_json::Value) -> Result<()> {
        let step = self.running_step_mut(name)?;
        step.status = StepStatus::Completed;
        step.response = Some(response);
        step.finished_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Marks the running step `name` failed.
    pub fn fail_step(&mut self, name: &str, error: impl Into<String>) -> Result<()> {
        let step = self.running_step_mut(name)?;
        step.status = StepStatus::Failed;
        step.error = Some(error.into());
        step.finished_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Moves the workflow to `next` if the state machine allows it.
    pub fn transition(&mut self, next: WorkflowStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SagaError::InvalidState {
                expected: format!("a status that can become {next}"),
                actual: self.status,
            });
        }
        self.status = next;
        if next == WorkflowStatus::Completed {
            self.response.status = Some("success".to_string());
        }
        self.touch();
        Ok(())
    }

    /// Forces a running workflow to failed after an engine fault.
    ///
    /// A step left running is failed with the same reason. Terminal
    /// workflows are left untouched.
    pub fn force_failed(&mut self, reason: &str) {
        if self.status.is_terminal() {
            return;
        }
        let now = Utc::now();
        for step in self
            .steps
            .iter_mut()
            .filter(|s| s.status == StepStatus::Running)
        {
            step.status = StepStatus::Failed;
            step.error = Some(reason.to_string());
            step.finished_at = Some(now);
        }
        self.response.error = Some(reason.to_string());
        self.status = WorkflowStatus::Failed;
        self.touch();
    }

    /// Claims a failed workflow for manual compensation.
    ///
    /// Only one claim can be held at a time; it is released by
    /// [`end_compensation`](Self::end_compensation).
    pub fn begin_compensation(&mut self) -> Result<()> {
        if self.status != WorkflowStatus::Failed {
            return Err(SagaError::InvalidState {
                expected: WorkflowStatus::Failed.to_string(),
                actual: self.status,
            });
        }
        if self.compensating {
            return Err(SagaError::CompensationInProgress(self.id));
        }
        self.compensating = true;
        self.touch();
        Ok(())
    }

    /// Releases the compensation claim.
    pub fn end_compensation(&mut self) {
        self.compensating = false;
        self.touch();
    }

    /// Records the outcome of a compensation attempt.
    pub fn record_compensation(&mut self, step: &str, outcome: std::result::Result<(), String>) {
        self.compensations.push(CompensationRecord {
            step: step.to_string(),
            succeeded: outcome.is_ok(),
            error: outcome.err(),
            at: Utc::now(),
        });
        self.touch();
    }

    fn running_step_mut(&mut self, name: &str) -> Result<&mut WorkflowStep> {
        match self.steps.last_mut() {
            Some(step) if step.name == name && step.status == StepStatus::Running => Ok(step),
            _ => Err(SagaError::Internal(format!("step '{name}' is not running"))),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> OrchestrationRequest {
        OrchestrationRequest {
            customer_id: CustomerId::new(1),
            items: vec![OrderLine::new(5, 2)],
            voucher_code: None,
        }
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        assert!(request().validate().is_ok());

        let mut no_customer = request();
        no_customer.customer_id = CustomerId::new(0);
        assert!(matches!(no_customer.validate(), Err(SagaError::Validation(_))));

        let mut no_items = request();
        no_items.items.clear();
        assert!(matches!(no_items.validate(), Err(SagaError::Validation(_))));

        let mut zero_quantity = request();
        zero_quantity.items.push(OrderLine::new(1, 0));
        let err = zero_quantity.validate().unwrap_err();
        assert!(err.to_string().contains("items[1].quantity"));

        let mut bad_product = request();
        bad_product.items[0].product_id = common::ProductId::new(-3);
        assert!(matches!(bad_product.validate(), Err(SagaError::Validation(_))));
    }

    #[test]
    fn test_only_one_step_runs_at_a_time() {
        let mut workflow = Workflow::new(request());
        workflow.begin_step("create_order").unwrap();

        assert!(workflow.begin_step("process_sales").is_err());

        workflow
            .complete_step("create_order", json!({"order_id": 42}))
            .unwrap();
        workflow.begin_step("process_sales").unwrap();
        assert_eq!(workflow.running_step().unwrap().name, "process_sales");
    }

    #[test]
    fn test_finished_steps_are_immutable() {
        let mut workflow = Workflow::new(request());
        workflow.begin_step("create_order").unwrap();
        workflow.fail_step("create_order", "boom").unwrap();

        assert!(workflow.complete_step("create_order", json!({})).is_err());
        assert!(workflow.fail_step("create_order", "again").is_err());
        assert_eq!(workflow.steps[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_completion_sets_success() {
        let mut workflow = Workflow::new(request());
        workflow.transition(WorkflowStatus::Completed).unwrap();

        assert_eq!(workflow.response.status.as_deref(), Some("success"));
        assert!(workflow.transition(WorkflowStatus::Compensated).is_err());
        assert!(workflow.begin_step("create_order").is_err());
    }

    #[test]
    fn test_compensation_claim_is_exclusive() {
        let mut workflow = Workflow::new(request());
        assert!(matches!(
            workflow.begin_compensation(),
            Err(SagaError::InvalidState { .. })
        ));

        workflow.force_failed("boom");
        workflow.begin_compensation().unwrap();
        assert!(matches!(
            workflow.begin_compensation(),
            Err(SagaError::CompensationInProgress(id)) if id == workflow.id
        ));
        assert_eq!(serde_json::to_value(&workflow).unwrap()["compensating"], true);

        workflow.end_compensation();
        assert!(serde_json::to_value(&workflow).unwrap().get("compensating").is_none());
        workflow.begin_compensation().unwrap();
    }

    #[test]
    fn test_force_failed_fails_running_step() {
        let mut workflow = Workflow::new(request());
        workflow.begin_step("create_order").unwrap();

        workflow.force_failed("engine panicked");

        assert_eq!(workflow.status, WorkflowStatus::Failed);
        assert_eq!(workflow.steps[0].status, StepStatus::Failed);
        assert_eq!(workflow.response.error.as_deref(), Some("engine panicked"));

        // Already terminal: nothing changes.
        workflow.force_failed("second fault");
        assert_eq!(workflow.response.error.as_deref(), Some("engine panicked"));
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut workflow = Workflow::new(request());
        workflow.begin_step("create_order").unwrap();
        workflow
            .complete_step("create_order", json!({"order_id": 42}))
            .unwrap();
        workflow.response.order_id = Some(OrderId::new(42));
        workflow.record_compensation("create_order", Err("order service down".to_string()));

        let value = serde_json::to_value(&workflow).unwrap();

        assert_eq!(value["status"], "running");
        assert_eq!(value["steps"][0]["name"], "create_order");
        assert_eq!(value["steps"][0]["status"], "completed");
        assert_eq!(value["response"]["order_id"], 42);
        assert!(value["response"].get("sales_id").is_none());
        assert_eq!(value["request"]["items"][0]["product_id"], 5);
        assert_eq!(value["compensations"][0]["succeeded"], false);
        assert_eq!(value["compensations"][0]["error"], "order service down");
    }
}
