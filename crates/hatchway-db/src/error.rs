//! Database error types.

use hatchway_core::error::format_phases;
use hatchway_core::{JobId, JobPhase};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The conditional update found the job in an unexpected phase.
    #[error("job {job_id} is {actual}, expected one of {}", format_phases(.expected))]
    Conflict {
        job_id: JobId,
        expected: Vec<JobPhase>,
        actual: JobPhase,
    },

    /// The phase matched but the transition's own guard refused it.
    #[error("job {job_id}: {reason}")]
    Rejected { job_id: JobId, reason: String },

    /// A stored value could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for hatchway_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => hatchway_core::Error::NotFound(msg),
            DbError::Conflict {
                job_id,
                expected,
                actual,
            } => hatchway_core::Error::Conflict {
                job_id,
                expected,
                actual,
            },
            DbError::Rejected { job_id, reason } => {
                hatchway_core::Error::Forbidden(format!("job {job_id}: {reason}"))
            }
            _ => hatchway_core::Error::Internal(err.to_string()),
        }
    }
}
