//! Error types for Hatchway.

use thiserror::Error;

use crate::hatchery::HatcheryRef;
use crate::{JobId, JobPhase};

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Lost a booking race. The caller should re-poll the queue.
    #[error("job {job_id} already booked by {} ({})", .booked_by.name, .booked_by.id)]
    AlreadyBooked { job_id: JobId, booked_by: HatcheryRef },

    /// Someone else moved the job before this transition committed.
    #[error("job {job_id} is {actual}, expected one of {}", format_phases(.expected))]
    Conflict {
        job_id: JobId,
        expected: Vec<JobPhase>,
        actual: JobPhase,
    },

    #[error("job {job_id} cannot be booked: {reason}")]
    NotBookable { job_id: JobId, reason: String },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Render a phase set as `A|B` for error messages.
pub fn format_phases(phases: &[JobPhase]) -> String {
    phases
        .iter()
        .map(JobPhase::as_str)
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HatcheryId;

    #[test]
    fn test_conflict_message_carries_context() {
        let err = Error::Conflict {
            job_id: JobId::new(3),
            expected: vec![JobPhase::Booked, JobPhase::Building],
            actual: JobPhase::Done,
        };
        assert_eq!(err.to_string(), "job 3 is Done, expected one of Booked|Building");
    }

    #[test]
    fn test_already_booked_message() {
        let err = Error::AlreadyBooked {
            job_id: JobId::new(9),
            booked_by: HatcheryRef {
                id: HatcheryId::new(2),
                name: "swarm".to_string(),
            },
        };
        assert_eq!(err.to_string(), "job 9 already booked by swarm (2)");
    }
}
