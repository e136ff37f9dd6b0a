//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hatchway_core::hatchery::HatcheryRef;
use hatchway_core::{JobId, JobPhase};
use serde_json::json;

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Forbidden(String),
    /// A booking race or phase conflict. Carries enough context for the
    /// caller to decide whether to re-poll.
    Conflict {
        message: String,
        job_id: JobId,
        expected: Vec<JobPhase>,
        actual: Option<JobPhase>,
        booked_by: Option<HatcheryRef>,
    },
    Unprocessable {
        message: String,
        job_id: JobId,
    },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ApiError::Conflict {
                message,
                job_id,
                expected,
                actual,
                booked_by,
            } => (
                StatusCode::CONFLICT,
                json!({
                    "error": message,
                    "job_id": job_id,
                    "expected": expected,
                    "actual": actual,
                    "booked_by": booked_by,
                }),
            ),
            ApiError::Unprocessable { message, job_id } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": message, "job_id": job_id }),
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<hatchway_core::Error> for ApiError {
    fn from(err: hatchway_core::Error) -> Self {
        let message = err.to_string();
        match err {
            hatchway_core::Error::NotFound(msg) => ApiError::NotFound(msg),
            hatchway_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            hatchway_core::Error::Forbidden(msg) => ApiError::Forbidden(msg),
            hatchway_core::Error::AlreadyBooked { job_id, booked_by } => ApiError::Conflict {
                message,
                job_id,
                expected: vec![JobPhase::Waiting],
                actual: Some(JobPhase::Booked),
                booked_by: Some(booked_by),
            },
            hatchway_core::Error::Conflict {
                job_id,
                expected,
                actual,
            } => ApiError::Conflict {
                message,
                job_id,
                expected,
                actual: Some(actual),
                booked_by: None,
            },
            hatchway_core::Error::NotBookable { job_id, .. } => {
                ApiError::Unprocessable { message, job_id }
            }
            hatchway_core::Error::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<hatchway_db::DbError> for ApiError {
    fn from(err: hatchway_db::DbError) -> Self {
        hatchway_core::Error::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatchway_core::HatcheryId;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_already_booked_is_conflict_with_context() {
        let err: ApiError = hatchway_core::Error::AlreadyBooked {
            job_id: JobId::new(4),
            booked_by: HatcheryRef {
                id: HatcheryId::new(2),
                name: "swarm".to_string(),
            },
        }
        .into();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["job_id"], 4);
        assert_eq!(body["actual"], "Booked");
        assert_eq!(body["booked_by"]["name"], "swarm");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let cases = [
            (
                hatchway_core::Error::NotFound("job 1".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                hatchway_core::Error::InvalidInput("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                hatchway_core::Error::NotBookable {
                    job_id: JobId::new(1),
                    reason: "unresolved".to_string(),
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                hatchway_core::Error::Forbidden("owner".to_string()),
                StatusCode::FORBIDDEN,
            ),
            (
                hatchway_core::Error::Internal("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
