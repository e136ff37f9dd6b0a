//! Workflow run and node run endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use hatchway_core::job::Job;
use hatchway_core::run::{NewNodeRun, NewWorkflowRun, NodeRun, WorkflowRun};
use hatchway_core::{NodeRunId, WorkflowRunId};
use hatchway_db::{JobFilter, JobRepo, RunRepo};
use hatchway_scheduler::RunStatuses;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workflow", post(create_workflow_run))
        .route("/workflow/{id}", get(get_workflow_run))
        .route("/workflow/{id}/stop", post(stop_workflow_run))
        .route("/node", post(create_node_run))
        .route("/node/{id}", get(get_node_run))
        .route("/node/{id}/stop", post(stop_node_run))
}

#[derive(Debug, Serialize)]
struct WorkflowRunResponse {
    #[serde(flatten)]
    run: WorkflowRun,
    node_runs: Vec<NodeRun>,
}

#[derive(Debug, Serialize)]
struct NodeRunResponse {
    #[serde(flatten)]
    run: NodeRun,
    jobs: Vec<Job>,
}

async fn create_workflow_run(
    State(state): State<AppState>,
    Json(req): Json<NewWorkflowRun>,
) -> Result<(StatusCode, Json<WorkflowRun>), ApiError> {
    let run = state.run_repo.insert_workflow_run(req).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn get_workflow_run(
    State(state): State<AppState>,
    Path(id): Path<WorkflowRunId>,
) -> Result<Json<WorkflowRunResponse>, ApiError> {
    let run = state.run_repo.load_workflow_run(id).await?;
    let node_runs = state.run_repo.list_node_runs(id).await?;
    Ok(Json(WorkflowRunResponse { run, node_runs }))
}

async fn stop_workflow_run(
    State(state): State<AppState>,
    Path(id): Path<WorkflowRunId>,
) -> Result<Json<WorkflowRun>, ApiError> {
    let run = state.broker.stop_workflow_run(id).await?;
    Ok(Json(run))
}

async fn create_node_run(
    State(state): State<AppState>,
    Json(req): Json<NewNodeRun>,
) -> Result<(StatusCode, Json<NodeRun>), ApiError> {
    let run = state.run_repo.insert_node_run(req).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

async fn get_node_run(
    State(state): State<AppState>,
    Path(id): Path<NodeRunId>,
) -> Result<Json<NodeRunResponse>, ApiError> {
    let run = state.run_repo.load_node_run(id).await?;
    let jobs = state.job_repo.list_jobs(&JobFilter::node_run(id)).await?;
    Ok(Json(NodeRunResponse { run, jobs }))
}

async fn stop_node_run(
    State(state): State<AppState>,
    Path(id): Path<NodeRunId>,
) -> Result<Json<RunStatuses>, ApiError> {
    let statuses = state.broker.stop_node_run(id).await?;
    Ok(Json(statuses))
}
