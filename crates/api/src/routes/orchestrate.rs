//! Orchestrator endpoints: start, inspect and compensate workflows.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::WorkflowId;
use saga::{OrchestrationRequest, OrderParticipant, SagaCoordinator, SalesParticipant, Workflow};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub workflow_id: WorkflowId,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CompensatedResponse {
    pub message: &'static str,
    pub workflow: Workflow,
}

fn parse_workflow_id(id: &str) -> Result<WorkflowId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::NotFound(format!("Workflow not found: {id}")))
}

/// POST /orchestrate/order: validate the request and start a workflow.
#[tracing::instrument(skip(coordinator, payload))]
pub async fn start<O: OrderParticipant, P: SalesParticipant>(
    State(coordinator): State<SagaCoordinator<O, P>>,
    payload: Result<Json<OrchestrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let Json(request) = payload?;
    let workflow_id = coordinator.start(request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            workflow_id,
            status: "accepted",
        }),
    ))
}

/// GET /orchestrate/{id}: full workflow snapshot.
#[tracing::instrument(skip(coordinator))]
pub async fn status<O: OrderParticipant, P: SalesParticipant>(
    State(coordinator): State<SagaCoordinator<O, P>>,
    Path(id): Path<String>,
) -> Result<Json<Workflow>, ApiError> {
    let id = parse_workflow_id(&id)?;
    Ok(Json(coordinator.get_status(id).await?))
}

/// POST /orchestrate/{id}/compensate: compensate a failed workflow.
#[tracing::instrument(skip(coordinator))]
pub async fn compensate<O: OrderParticipant, P: SalesParticipant>(
    State(coordinator): State<SagaCoordinator<O, P>>,
    Path(id): Path<String>,
) -> Result<Json<CompensatedResponse>, ApiError> {
    let id = parse_workflow_id(&id)?;
    let workflow = coordinator.compensate(id).await?;

    Ok(Json(CompensatedResponse {
        message: "Workflow compensated",
        workflow,
    }))
}
