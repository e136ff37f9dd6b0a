//! Agent booking endpoints used by hatcheries.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use hatchway_core::hatchery::Hatchery;
use hatchway_core::job::Job;
use hatchway_core::{HatcheryId, JobId, Status};
use hatchway_scheduler::{Completion, StatusFilter};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", post(search))
        .route("/jobs/{id}/book", post(book))
        .route("/jobs/{id}/release", post(release))
        .route("/jobs/{id}/start", post(start))
        .route("/jobs/{id}/complete", post(complete))
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    statuses: Vec<Status>,
    hatchery: Hatchery,
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Vec<Job>>, ApiError> {
    let filter = StatusFilter::from_statuses(&req.statuses)?;
    let jobs = state.broker.list_bookable(filter, &req.hatchery).await?;
    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
struct BookRequest {
    hatchery: Hatchery,
}

async fn book(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Json(req): Json<BookRequest>,
) -> Result<Json<Job>, ApiError> {
    let job = state.broker.book(id, &req.hatchery).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
struct ReleaseRequest {
    hatchery: HatcheryId,
}

async fn release(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<Job>, ApiError> {
    let job = state.broker.release(id, req.hatchery).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    hatchery: HatcheryId,
    worker_id: String,
    worker_name: String,
}

async fn start(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Json(req): Json<StartRequest>,
) -> Result<Json<Job>, ApiError> {
    let job = state
        .broker
        .start(id, req.hatchery, req.worker_id, req.worker_name)
        .await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
struct CompleteRequest {
    status: Status,
}

async fn complete(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<Completion>, ApiError> {
    let completion = state.broker.complete(id, req.status).await?;
    Ok(Json(completion))
}
