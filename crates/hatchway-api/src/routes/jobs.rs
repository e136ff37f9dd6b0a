//! Job intake endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use hatchway_core::JobId;
use hatchway_core::job::{Job, NewJob};
use hatchway_db::JobRepo;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job))
        .route("/{id}", get(get_job))
        .route("/{id}/resolve", post(resolve_job))
}

async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<NewJob>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let job = state.intake.enqueue(req).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, ApiError> {
    let job = state.job_repo.load_job(id).await?;
    Ok(Json(job))
}

async fn resolve_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, ApiError> {
    let job = state.intake.resolve(id).await?;
    Ok(Json(job))
}
