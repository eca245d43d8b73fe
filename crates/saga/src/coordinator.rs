//! Saga coordinator for the order placement workflow.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{OrderId, SalesId, WorkflowId};
use domain::ProcessSale;
use serde::Serialize;
use serde_json::json;
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use crate::error::{Result, SagaError};
use crate::order_placement::{STEP_CONFIRM_ORDER, STEP_CREATE_ORDER, STEP_PROCESS_SALES};
use crate::services::{OrderParticipant, SalesParticipant};
use crate::state::WorkflowStatus;
use crate::store::{WorkflowHandle, WorkflowStore};
use crate::workflow::{OrchestrationRequest, Workflow};

/// Engine settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound for every participant call, compensations included.
    pub step_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(10),
        }
    }
}

/// Orchestrates order placement workflows.
///
/// The coordinator drives a 3-step saga (create order → process sales →
/// confirm order). Each workflow runs on its own task; a failed step
/// compensates the completed ones in reverse order.
pub struct SagaCoordinator<O, P>
where
    O: OrderParticipant,
    P: SalesParticipant,
{
    store: WorkflowStore,
    orders: Arc<O>,
    sales: Arc<P>,
    config: CoordinatorConfig,
}

impl<O, P> Clone for SagaCoordinator<O, P>
where
    O: OrderParticipant,
    P: SalesParticipant,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            orders: self.orders.clone(),
            sales: self.sales.clone(),
            config: self.config.clone(),
        }
    }
}

impl<O, P> SagaCoordinator<O, P>
where
    O: OrderParticipant,
    P: SalesParticipant,
{
    /// Creates a new saga coordinator.
    pub fn new(store: WorkflowStore, orders: O, sales: P, config: CoordinatorConfig) -> Self {
        Self {
            store,
            orders: Arc::new(orders),
            sales: Arc::new(sales),
            config,
        }
    }

    /// Returns the workflow store.
    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    /// Validates the request, registers a workflow and starts it in the
    /// background. Returns as soon as the workflow is registered.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn start(&self, request: OrchestrationRequest) -> Result<WorkflowId> {
        let (id, _) = self.launch(request).await?;
        Ok(id)
    }

    /// Like [`start`](Self::start), but waits for the workflow to finish and
    /// returns its final state.
    pub async fn run_to_completion(&self, request: OrchestrationRequest) -> Result<Workflow> {
        let (id, supervisor) = self.launch(request).await?;
        supervisor
            .await
            .map_err(|e| SagaError::Internal(format!("workflow supervisor failed: {e}")))?;
        self.get_status(id).await
    }

    /// Returns a snapshot of a workflow.
    pub async fn get_status(&self, id: WorkflowId) -> Result<Workflow> {
        self.store.get(id).await.ok_or(SagaError::NotFound(id))
    }

    /// Compensates a failed workflow.
    ///
    /// Every completed step is compensated in reverse order, whether or not
    /// it was compensated before. The workflow is claimed under a short
    /// lock and the participant calls run without it, so status queries
    /// keep answering. A concurrent request is rejected while the claim is
    /// held. The compensation runs on its own task and finishes even if
    /// the caller goes away.
    #[tracing::instrument(skip(self))]
    pub async fn compensate(&self, id: WorkflowId) -> Result<Workflow> {
        let handle = self.store.handle(id).await.ok_or(SagaError::NotFound(id))?;

        let (completed, order_id, sales_id) = {
            let mut workflow = handle.write().await;
            workflow.begin_compensation()?;
            (
                workflow.completed_steps(),
                workflow.response.order_id,
                workflow.response.sales_id,
            )
        };

        let this = self.clone();
        let task_handle = handle.clone();
        let task = tokio::spawn(
            async move {
                let outcomes = this.run_compensations(&completed, order_id, sales_id).await;

                let mut workflow = task_handle.write().await;
                for (step, outcome) in outcomes {
                    workflow.record_compensation(step, outcome);
                }
                workflow.end_compensation();
                workflow.transition(WorkflowStatus::Compensated)?;

                metrics::counter!("saga_workflows_compensated_total").increment(1);
                tracing::info!(steps = completed.len(), "workflow compensated manually");
                Ok::<_, SagaError>(workflow.clone())
            }
            .in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(error) => {
                let reason = join_error_reason(error);
                handle.write().await.end_compensation();
                tracing::error!(%reason, "manual compensation aborted");
                Err(SagaError::Internal(reason))
            }
        }
    }

    async fn launch(&self, request: OrchestrationRequest) -> Result<(WorkflowId, JoinHandle<()>)> {
        request.validate()?;

        let workflow = Workflow::new(request);
        let id = workflow.id;
        let handle = self.store.insert(workflow).await;

        metrics::counter!("saga_workflows_started_total").increment(1);
        tracing::info!(workflow_id = %id, "workflow started");

        Ok((id, self.spawn(id, handle)))
    }

    /// Runs the workflow on its own task, supervised by a second task that
    /// turns an error or panic into a failed workflow.
    fn spawn(&self, id: WorkflowId, handle: WorkflowHandle) -> JoinHandle<()> {
        let span = tracing::info_span!("saga_workflow", workflow_id = %id);
        let engine = self.clone();
        let workflow = handle.clone();
        let execution =
            tokio::spawn(async move { engine.execute(workflow).await }.instrument(span.clone()));

        tokio::spawn(
            async move {
                let reason = match execution.await {
                    Ok(Ok(())) => return,
                    Ok(Err(e)) => format!("workflow execution failed: {e}"),
                    Err(e) => join_error_reason(e),
                };

                tracing::error!(%reason, "workflow aborted by an internal fault");
                handle.write().await.force_failed(&reason);
                metrics::counter!("saga_workflows_failed_total").increment(1);
            }
            .instrument(span),
        )
    }

    async fn execute(&self, handle: WorkflowHandle) -> Result<()> {
        let started = Instant::now();
        let request = handle.read().await.request.clone();

        // 1. Create the order
        let created = self
            .run_step(
                &handle,
                STEP_CREATE_ORDER,
                self.orders.create_order(request.customer_id, &request.items),
            )
            .await?;
        let created = match created {
            Ok(created) => created,
            Err(e) => return self.finish(&handle, Some(e), started).await,
        };
        handle.write().await.response.order_id = Some(created.order_id);

        // 2. Charge it
        let sale_request = ProcessSale {
            order_id: created.order_id,
            customer_id: request.customer_id,
            original_amount: created.total_amount,
            voucher_code: request.voucher_code.clone(),
        };
        let sale = self
            .run_step(
                &handle,
                STEP_PROCESS_SALES,
                self.sales.process_sales(&sale_request),
            )
            .await?;
        let sale = match sale {
            Ok(sale) => sale,
            Err(e) => return self.finish(&handle, Some(e), started).await,
        };
        {
            let mut workflow = handle.write().await;
            workflow.response.sales_id = Some(sale.sales_id);
            workflow.response.final_amount = Some(sale.final_amount);
        }

        // 3. Confirm it
        let order_id = created.order_id;
        let confirmed = self
            .run_step(&handle, STEP_CONFIRM_ORDER, async {
                self.orders
                    .confirm_order(order_id)
                    .await
                    .map(|()| json!({ "order_id": order_id, "status": "completed" }))
            })
            .await?;
        if let Err(e) = confirmed {
            return self.finish(&handle, Some(e), started).await;
        }

        self.finish(&handle, None, started).await
    }

    /// Records a running step, calls the participant with a timeout and
    /// records the outcome.
    ///
    /// The outer error is an engine fault; the inner one is the participant's.
    async fn run_step<T, F>(
        &self,
        handle: &WorkflowHandle,
        step: &'static str,
        call: F,
    ) -> Result<Result<T>>
    where
        T: Serialize,
        F: Future<Output = Result<T>>,
    {
        handle.write().await.begin_step(step)?;
        tracing::info!(step, "saga step started");

        let timer = Instant::now();
        let outcome = self.bounded(step, call).await;
        metrics::histogram!("saga_step_duration_seconds", "step" => step)
            .record(timer.elapsed().as_secs_f64());

        let mut workflow = handle.write().await;
        match &outcome {
            Ok(response) => {
                workflow.complete_step(step, serde_json::to_value(response)?)?;
                tracing::info!(step, "saga step completed");
            }
            Err(e) => {
                workflow.fail_step(step, e.to_string())?;
                tracing::warn!(step, error = %e, "saga step failed");
            }
        }
        Ok(outcome)
    }

    /// Moves the workflow to its terminal status, compensating first when a
    /// step failed after others had completed.
    async fn finish(
        &self,
        handle: &WorkflowHandle,
        failure: Option<SagaError>,
        started: Instant,
    ) -> Result<()> {
        let Some(error) = failure else {
            handle
                .write()
                .await
                .transition(WorkflowStatus::Completed)?;
            metrics::counter!("saga_workflows_completed_total").increment(1);
            let duration = started.elapsed().as_secs_f64();
            metrics::histogram!("saga_workflow_duration_seconds").record(duration);
            tracing::info!(duration, "workflow completed");
            return Ok(());
        };

        let (completed, order_id, sales_id) = {
            let mut workflow = handle.write().await;
            workflow.response.error = Some(error.to_string());
            (
                workflow.completed_steps(),
                workflow.response.order_id,
                workflow.response.sales_id,
            )
        };

        // Compensations run without the workflow lock so status queries
        // are never blocked on a participant.
        let status = if completed.is_empty() {
            WorkflowStatus::Failed
        } else {
            let outcomes = self.run_compensations(&completed, order_id, sales_id).await;
            let mut workflow = handle.write().await;
            for (step, outcome) in outcomes {
                workflow.record_compensation(step, outcome);
            }
            WorkflowStatus::Compensated
        };
        handle.write().await.transition(status)?;

        match status {
            WorkflowStatus::Failed => metrics::counter!("saga_workflows_failed_total").increment(1),
            _ => metrics::counter!("saga_workflows_compensated_total").increment(1),
        }
        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("saga_workflow_duration_seconds").record(duration);
        tracing::warn!(%status, %error, duration, "workflow did not complete");
        Ok(())
    }

    /// Runs the compensating action of each completed step, last first.
    ///
    /// Failures are logged and returned, never retried.
    async fn run_compensations(
        &self,
        completed: &[String],
        order_id: Option<OrderId>,
        sales_id: Option<SalesId>,
    ) -> Vec<(&'static str, std::result::Result<(), String>)> {
        let mut outcomes = Vec::new();

        for step in completed.iter().rev() {
            let (step, outcome) = match (step.as_str(), order_id, sales_id) {
                (STEP_CONFIRM_ORDER, Some(order_id), _) => (
                    STEP_CONFIRM_ORDER,
                    self.bounded(STEP_CONFIRM_ORDER, self.orders.cancel_order(order_id))
                        .await,
                ),
                (STEP_PROCESS_SALES, _, Some(sales_id)) => (
                    STEP_PROCESS_SALES,
                    self.bounded(STEP_PROCESS_SALES, self.sales.reverse_sales(sales_id))
                        .await,
                ),
                (STEP_CREATE_ORDER, Some(order_id), _) => (
                    STEP_CREATE_ORDER,
                    self.bounded(STEP_CREATE_ORDER, self.orders.cancel_order(order_id))
                        .await,
                ),
                _ => continue,
            };

            match &outcome {
                Ok(()) => {
                    metrics::counter!("saga_compensations_total", "step" => step, "outcome" => "succeeded")
                        .increment(1);
                    tracing::info!(step, "compensation step completed");
                }
                Err(e) => {
                    metrics::counter!("saga_compensations_total", "step" => step, "outcome" => "failed")
                        .increment(1);
                    tracing::error!(step, error = %e, "compensation step failed");
                }
            }
            outcomes.push((step, outcome.map_err(|e| e.to_string())));
        }

        outcomes
    }

    async fn bounded<T>(&self, step: &'static str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.step_timeout, call).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SagaError::Timeout {
                step,
                timeout_ms: self.config.step_timeout.as_millis() as u64,
            }),
        }
    }
}

fn join_error_reason(error: JoinError) -> String {
    if !error.is_panic() {
        return format!("workflow task cancelled: {error}");
    }
    let payload = error.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("workflow panic: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CallLog, InMemoryOrderParticipant, InMemorySalesParticipant, ProcessedSale};
    use crate::state::StepStatus;
    use async_trait::async_trait;
    use common::{CustomerId, Money};
    use domain::OrderLine;
    use tokio::sync::Notify;

    type TestCoordinator = SagaCoordinator<InMemoryOrderParticipant, InMemorySalesParticipant>;

    fn setup() -> (TestCoordinator, InMemoryOrderParticipant, InMemorySalesParticipant, CallLog) {
        let log = CallLog::new();
        let orders = InMemoryOrderParticipant::new(log.clone());
        let sales = InMemorySalesParticipant::new(log.clone());
        let coordinator = SagaCoordinator::new(
            WorkflowStore::new(),
            orders.clone(),
            sales.clone(),
            CoordinatorConfig::default(),
        );
        (coordinator, orders, sales, log)
    }

    fn request() -> OrchestrationRequest {
        OrchestrationRequest {
            customer_id: CustomerId::new(1),
            items: vec![OrderLine::new(5, 2)],
            voucher_code: Some("SAVE10".to_string()),
        }
    }

    fn step_statuses(workflow: &Workflow) -> Vec<(&str, StepStatus)> {
        workflow
            .steps
            .iter()
            .map(|s| (s.name.as_str(), s.status))
            .collect()
    }

    #[tokio::test]
    async fn test_happy_path() {
        let (coordinator, orders, _, log) = setup();

        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Completed);
        assert_eq!(
            step_statuses(&workflow),
            vec![
                (STEP_CREATE_ORDER, StepStatus::Completed),
                (STEP_PROCESS_SALES, StepStatus::Completed),
                (STEP_CONFIRM_ORDER, StepStatus::Completed),
            ]
        );
        assert_eq!(workflow.response.order_id, Some(OrderId::new(42)));
        assert_eq!(workflow.response.sales_id, Some(SalesId::new(7)));
        assert_eq!(workflow.response.final_amount, Some(Money::from_cents(1798)));
        assert_eq!(workflow.response.status.as_deref(), Some("success"));
        assert!(workflow.response.error.is_none());
        assert!(workflow.compensations.is_empty());

        assert_eq!(
            log.calls(),
            vec!["create_order", "process_sales(42)", "confirm_order(42)"]
        );
        assert_eq!(orders.order_status(OrderId::new(42)), Some("completed"));
    }

    #[tokio::test]
    async fn test_create_order_failure_fails_without_compensation() {
        let (coordinator, orders, _, log) = setup();
        orders.set_fail_on_create(true);

        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Failed);
        assert_eq!(
            step_statuses(&workflow),
            vec![(STEP_CREATE_ORDER, StepStatus::Failed)]
        );
        assert!(workflow.response.error.as_deref().unwrap().contains("out of stock"));
        assert!(workflow.compensations.is_empty());
        assert_eq!(log.calls(), vec!["create_order"]);
    }

    #[tokio::test]
    async fn test_process_sales_failure_cancels_order() {
        let (coordinator, orders, sales, log) = setup();
        sales.set_fail_on_process(true);

        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Compensated);
        assert_eq!(
            step_statuses(&workflow),
            vec![
                (STEP_CREATE_ORDER, StepStatus::Completed),
                (STEP_PROCESS_SALES, StepStatus::Failed),
            ]
        );
        assert_eq!(log.count("cancel_order(42)"), 1);
        assert_eq!(orders.order_status(OrderId::new(42)), Some("cancelled"));
        assert_eq!(
            workflow.response.error.as_deref(),
            Some("sales service error: payment declined")
        );
        assert_eq!(workflow.compensations.len(), 1);
        assert!(workflow.compensations[0].succeeded);
    }

    #[tokio::test]
    async fn test_confirm_failure_reverses_sale_then_cancels_order() {
        let (coordinator, orders, _, log) = setup();
        orders.set_fail_on_confirm(true);

        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Compensated);
        assert_eq!(workflow.steps.len(), 3);
        assert_eq!(workflow.steps[2].status, StepStatus::Failed);
        assert_eq!(
            log.calls(),
            vec![
                "create_order",
                "process_sales(42)",
                "confirm_order(42)",
                "reverse_sales(7)",
                "cancel_order(42)",
            ]
        );
        let compensated: Vec<&str> = workflow.compensations.iter().map(|c| c.step.as_str()).collect();
        assert_eq!(compensated, vec![STEP_PROCESS_SALES, STEP_CREATE_ORDER]);
    }

    #[tokio::test]
    async fn test_failed_compensation_is_recorded_and_not_retried() {
        let (coordinator, orders, sales, log) = setup();
        sales.set_fail_on_process(true);
        orders.set_fail_on_cancel(true);

        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Compensated);
        assert_eq!(log.count("cancel_order(42)"), 1);
        let record = &workflow.compensations[0];
        assert!(!record.succeeded);
        assert!(record.error.as_deref().unwrap().contains("unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_participant_times_out() {
        let log = CallLog::new();
        let orders = InMemoryOrderParticipant::new(log.clone());
        orders.set_create_delay(Some(Duration::from_secs(30)));
        let coordinator = SagaCoordinator::new(
            WorkflowStore::new(),
            orders,
            InMemorySalesParticipant::new(log),
            CoordinatorConfig {
                step_timeout: Duration::from_millis(500),
            },
        );

        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Failed);
        assert_eq!(
            workflow.steps[0].error.as_deref(),
            Some("Step 'create_order' timed out after 500ms")
        );
    }

    #[tokio::test]
    async fn test_invalid_request_creates_no_workflow() {
        let (coordinator, _, _, log) = setup();
        let mut invalid = request();
        invalid.items.clear();

        let err = coordinator.start(invalid).await.unwrap_err();

        assert!(matches!(err, SagaError::Validation(_)));
        assert!(coordinator.store().is_empty().await);
        assert!(log.calls().is_empty());
    }

    /// Sales participant that blocks until released.
    struct GatedSales {
        inner: InMemorySalesParticipant,
        reached: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl SalesParticipant for GatedSales {
        async fn process_sales(&self, request: &ProcessSale) -> Result<ProcessedSale> {
            self.reached.notify_one();
            self.release.notified().await;
            self.inner.process_sales(request).await
        }

        async fn reverse_sales(&self, sales_id: SalesId) -> Result<()> {
            self.inner.reverse_sales(sales_id).await
        }
    }

    #[tokio::test]
    async fn test_status_query_sees_one_running_step() {
        let log = CallLog::new();
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let coordinator = SagaCoordinator::new(
            WorkflowStore::new(),
            InMemoryOrderParticipant::new(log.clone()),
            GatedSales {
                inner: InMemorySalesParticipant::new(log),
                reached: reached.clone(),
                release: release.clone(),
            },
            CoordinatorConfig::default(),
        );

        let id = coordinator.start(request()).await.unwrap();
        reached.notified().await;

        let snapshot = coordinator.get_status(id).await.unwrap();
        assert_eq!(snapshot.status, WorkflowStatus::Running);
        assert_eq!(
            step_statuses(&snapshot),
            vec![
                (STEP_CREATE_ORDER, StepStatus::Completed),
                (STEP_PROCESS_SALES, StepStatus::Running),
            ]
        );

        release.notify_one();
        loop {
            let workflow = coordinator.get_status(id).await.unwrap();
            if workflow.status.is_terminal() {
                assert_eq!(workflow.status, WorkflowStatus::Completed);
                break;
            }
            tokio::task::yield_now().await;
        }
    }

    /// Sales participant with a bug.
    struct PanickingSales;

    #[async_trait]
    impl SalesParticipant for PanickingSales {
        async fn process_sales(&self, _request: &ProcessSale) -> Result<ProcessedSale> {
            panic!("sales client bug");
        }

        async fn reverse_sales(&self, _sales_id: SalesId) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panic_fails_workflow_and_allows_manual_compensation() {
        let log = CallLog::new();
        let orders = InMemoryOrderParticipant::new(log.clone());
        let coordinator = SagaCoordinator::new(
            WorkflowStore::new(),
            orders.clone(),
            PanickingSales,
            CoordinatorConfig::default(),
        );

        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Failed);
        assert_eq!(
            step_statuses(&workflow),
            vec![
                (STEP_CREATE_ORDER, StepStatus::Completed),
                (STEP_PROCESS_SALES, StepStatus::Failed),
            ]
        );
        assert_eq!(
            workflow.response.error.as_deref(),
            Some("workflow panic: sales client bug")
        );

        let compensated = coordinator.compensate(workflow.id).await.unwrap();

        assert_eq!(compensated.status, WorkflowStatus::Compensated);
        assert_eq!(log.count("cancel_order(42)"), 1);
        assert_eq!(orders.order_status(OrderId::new(42)), Some("cancelled"));

        // A second request finds nothing left to compensate.
        assert!(matches!(
            coordinator.compensate(workflow.id).await,
            Err(SagaError::InvalidState {
                actual: WorkflowStatus::Compensated,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_readable_during_manual_compensation() {
        let log = CallLog::new();
        let orders = InMemoryOrderParticipant::new(log.clone());
        let coordinator = SagaCoordinator::new(
            WorkflowStore::new(),
            orders.clone(),
            PanickingSales,
            CoordinatorConfig::default(),
        );
        let workflow = coordinator.run_to_completion(request()).await.unwrap();
        assert_eq!(workflow.status, WorkflowStatus::Failed);

        orders.set_cancel_delay(Some(Duration::from_millis(500)));
        let compensation = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.compensate(workflow.id).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = tokio::time::timeout(
            Duration::from_millis(100),
            coordinator.get_status(workflow.id),
        )
        .await
        .expect("status read blocked by compensation")
        .unwrap();
        assert_eq!(snapshot.status, WorkflowStatus::Failed);
        assert!(snapshot.compensating);

        assert!(matches!(
            coordinator.compensate(workflow.id).await,
            Err(SagaError::CompensationInProgress(id)) if id == workflow.id
        ));

        let compensated = compensation.await.unwrap().unwrap();
        assert_eq!(compensated.status, WorkflowStatus::Compensated);
        assert!(!compensated.compensating);
        assert_eq!(log.count("cancel_order(42)"), 1);
        assert_eq!(orders.order_status(OrderId::new(42)), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_compensate_requires_failed_workflow() {
        let (coordinator, _, _, _) = setup();
        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        assert!(matches!(
            coordinator.compensate(workflow.id).await,
            Err(SagaError::InvalidState {
                actual: WorkflowStatus::Completed,
                ..
            })
        ));
        assert!(matches!(
            coordinator.compensate(WorkflowId::new()).await,
            Err(SagaError::NotFound(_))
        ));
        assert!(matches!(
            coordinator.get_status(WorkflowId::new()).await,
            Err(SagaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_compensation_of_failed_first_step_is_a_no_op() {
        let (coordinator, orders, _, log) = setup();
        orders.set_fail_on_create(true);
        let workflow = coordinator.run_to_completion(request()).await.unwrap();

        let compensated = coordinator.compensate(workflow.id).await.unwrap();

        assert_eq!(compensated.status, WorkflowStatus::Compensated);
        assert!(compensated.compensations.is_empty());
        assert_eq!(log.calls(), vec!["create_order"]);
    }
}
