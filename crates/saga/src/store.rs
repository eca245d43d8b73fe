//! In-process registry of workflow instances.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::WorkflowId;
use tokio::sync::{RwLock, watch};

use crate::workflow::Workflow;

/// Shared handle to one workflow. Only its engine task writes through it.
pub type WorkflowHandle = Arc<RwLock<Workflow>>;

/// Concurrency-safe mapping from workflow id to workflow.
///
/// The map lock guards insert and lookup; each workflow has its own lock so
/// status queries read a consistent snapshot while the engine mutates it.
#[derive(Debug, Clone, Default)]
pub struct WorkflowStore {
    workflows: Arc<RwLock<HashMap<WorkflowId, WorkflowHandle>>>,
}

impl WorkflowStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a workflow and returns its handle.
    pub async fn insert(&self, workflow: Workflow) -> WorkflowHandle {
        let id = workflow.id;
        let handle = Arc::new(RwLock::new(workflow));
        self.workflows.write().await.insert(id, handle.clone());
        handle
    }

    /// Returns the handle of a workflow.
    pub async fn handle(&self, id: WorkflowId) -> Option<WorkflowHandle> {
        self.workflows.read().await.get(&id).cloned()
    }

    /// Returns a copy of a workflow as it is right now.
    pub async fn get(&self, id: WorkflowId) -> Option<Workflow> {
        let handle = self.handle(id).await?;
        let workflow = handle.read().await;
        Some(workflow.clone())
    }

    /// Returns the number of workflows held.
    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    /// Returns true if no workflows are held.
    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }

    /// Removes terminal workflows last updated more than `retention` ago.
    ///
    /// Running workflows, workflows being compensated and workflows whose
    /// lock is currently held are kept. Returns the number removed.
    pub async fn prune_terminal(&self, retention: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };

        let mut workflows = self.workflows.write().await;
        let before = workflows.len();
        workflows.retain(|_, handle| match handle.try_read() {
            Ok(workflow) => {
                workflow.compensating
                    || !(workflow.status.is_terminal() && workflow.updated_at < cutoff)
            }
            Err(_) => true,
        });
        before - workflows.len()
    }

    /// Prunes expired workflows every `interval` until shutdown is signalled.
    pub async fn run_sweeper(
        self,
        retention: Duration,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        tracing::info!(
            retention_secs = retention.as_secs(),
            interval_secs = interval.as_secs(),
            "workflow sweeper started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let removed = self.prune_terminal(retention).await;
                    if removed > 0 {
                        metrics::counter!("saga_workflows_pruned_total").increment(removed as u64);
                        tracing::debug!(removed, "pruned expired workflows");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("workflow sweeper stopped");
    }
}
