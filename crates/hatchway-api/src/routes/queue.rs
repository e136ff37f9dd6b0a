//! Queue monitoring endpoints.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use hatchway_core::status::parse_status_list;
use hatchway_scheduler::{QueueEntry, StatusFilter, WorkerCount};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue", get(list_queue))
        .route("/queue/count", get(count_queue))
        .route("/workers", get(worker_counts))
}

#[derive(Debug, Deserialize)]
struct QueueQuery {
    /// Comma-separated statuses, e.g. `Waiting,Building`.
    status: Option<String>,
}

impl QueueQuery {
    fn filter(&self) -> Result<StatusFilter, ApiError> {
        let statuses = match &self.status {
            Some(raw) => parse_status_list(raw).map_err(|e| ApiError::BadRequest(e.to_string()))?,
            None => Vec::new(),
        };
        Ok(StatusFilter::from_statuses(&statuses)?)
    }
}

async fn list_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Vec<QueueEntry>>, ApiError> {
    let entries = state.queue.list(query.filter()?).await?;
    Ok(Json(entries))
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: usize,
}

async fn count_queue(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<CountResponse>, ApiError> {
    let count = state.queue.count(query.filter()?).await?;
    Ok(Json(CountResponse { count }))
}

async fn worker_counts(State(state): State<AppState>) -> Result<Json<Vec<WorkerCount>>, ApiError> {
    let counts = state.queue.worker_counts().await?;
    Ok(Json(counts))
}
