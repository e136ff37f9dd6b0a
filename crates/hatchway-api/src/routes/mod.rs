//! API routes.

pub mod booking;
pub mod health;
pub mod jobs;
pub mod queue;
pub mod runs;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .merge(queue::router())
        .nest("/booking", booking::router())
        .nest("/jobs", jobs::router())
        .nest("/runs", runs::router())
}
