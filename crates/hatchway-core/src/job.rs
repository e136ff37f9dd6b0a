//! Queued jobs and their booking lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::hatchery::HatcheryRef;
use crate::parameter::Parameter;
use crate::requirement::{RequirementList, RequirementTemplate};
use crate::{HatcheryId, JobId, NodeRunId, Status};

/// Where a job is in its booking lifecycle.
///
/// Derived from the job's status and booking; a booked job still reports
/// `Waiting` as its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    /// Queued and free to book.
    Waiting,
    /// Claimed by a hatchery that has not started a worker yet.
    Booked,
    /// A worker is executing the job.
    Building,
    /// Terminal status recorded.
    Done,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Waiting => "Waiting",
            JobPhase::Booked => "Booked",
            JobPhase::Building => "Building",
            JobPhase::Done => "Done",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exclusive claim on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedBy {
    pub hatchery: HatcheryRef,
    pub booked_at: DateTime<Utc>,
}

/// The worker executing a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedBy {
    pub worker_id: String,
    pub worker_name: String,
    pub started_at: DateTime<Utc>,
}

/// A schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub node_run_id: NodeRunId,
    pub status: Status,
    pub requirement_templates: Vec<RequirementTemplate>,
    /// Requirements from the last resolution pass, possibly partial.
    pub requirements: RequirementList,
    pub contains_service: bool,
    pub resolution_errors: Vec<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Parameters projected from the resolved requirements.
    pub parameters: Vec<Parameter>,
    pub queued_at: DateTime<Utc>,
    pub booked_by: Option<BookedBy>,
    pub executed_by: Option<ExecutedBy>,
    pub done_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn phase(&self) -> JobPhase {
        match self.status {
            Status::Waiting if self.booked_by.is_some() => JobPhase::Booked,
            Status::Waiting => JobPhase::Waiting,
            Status::Building => JobPhase::Building,
            _ => JobPhase::Done,
        }
    }

    /// A job may only be offered for booking once every requirement resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some() && self.resolution_errors.is_empty()
    }

    /// Apply a transition in place.
    ///
    /// The caller (the store) has already checked the expected phase; this
    /// enforces the guards carried by the transition itself.
    pub fn apply(&mut self, transition: &JobTransition) -> Result<(), TransitionRejected> {
        match transition {
            JobTransition::Resolve(resolution) => {
                self.requirements = resolution.requirements.clone();
                self.contains_service = resolution.contains_service;
                self.resolution_errors = resolution.errors.clone();
                self.parameters = resolution.parameters.clone();
                self.resolved_at = Some(resolution.resolved_at);
            }
            JobTransition::Book(booking) => {
                if let Some(current) = &self.booked_by {
                    return Err(TransitionRejected(format!(
                        "already booked by {} ({})",
                        current.hatchery.name, current.hatchery.id
                    )));
                }
                self.booked_by = Some(booking.clone());
            }
            JobTransition::Release { hatchery } => {
                self.check_owner(*hatchery)?;
                self.booked_by = None;
            }
            JobTransition::ExpireBooking { stale_before } => {
                match &self.booked_by {
                    Some(booking) if booking.booked_at <= *stale_before => {}
                    _ => {
                        return Err(TransitionRejected(
                            "booking is not stale".to_string(),
                        ));
                    }
                }
                self.booked_by = None;
            }
            JobTransition::Start { hatchery, worker } => {
                self.check_owner(*hatchery)?;
                self.status = Status::Building;
                self.executed_by = Some(worker.clone());
            }
            JobTransition::Finish { status, at } => {
                if !status.is_completion() {
                    return Err(TransitionRejected(format!(
                        "{status} is not a completion status"
                    )));
                }
                self.status = *status;
                self.booked_by = None;
                self.done_at = Some(*at);
            }
        }
        Ok(())
    }

    fn check_owner(&self, hatchery: HatcheryId) -> Result<(), TransitionRejected> {
        match &self.booked_by {
            Some(booking) if booking.hatchery.id == hatchery => Ok(()),
            Some(booking) => Err(TransitionRejected(format!(
                "booked by hatchery {}, not {}",
                booking.hatchery.id, hatchery
            ))),
            None => Err(TransitionRejected("job is not booked".to_string())),
        }
    }
}

/// A job to insert into the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub node_run_id: NodeRunId,
    #[serde(default)]
    pub requirement_templates: Vec<RequirementTemplate>,
}

/// Outcome of a resolution pass, as persisted on the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResolution {
    pub requirements: RequirementList,
    pub contains_service: bool,
    pub errors: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub resolved_at: DateTime<Utc>,
}

/// A state change applied through the store's conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// Record resolved requirements. Does not change the phase.
    Resolve(JobResolution),
    /// Waiting -> Booked.
    Book(BookedBy),
    /// Booked -> Waiting, by the owning hatchery.
    Release { hatchery: HatcheryId },
    /// Booked -> Waiting when the booking is at least as old as `stale_before`.
    ExpireBooking { stale_before: DateTime<Utc> },
    /// Booked -> Building, by the owning hatchery.
    Start {
        hatchery: HatcheryId,
        worker: ExecutedBy,
    },
    /// Any active phase -> Done.
    Finish { status: Status, at: DateTime<Utc> },
}

impl JobTransition {
    pub fn name(&self) -> &'static str {
        match self {
            JobTransition::Resolve(_) => "resolve",
            JobTransition::Book(_) => "book",
            JobTransition::Release { .. } => "release",
            JobTransition::ExpireBooking { .. } => "expire-booking",
            JobTransition::Start { .. } => "start",
            JobTransition::Finish { .. } => "finish",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transition rejected: {0}")]
pub struct TransitionRejected(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job() -> Job {
        Job {
            id: JobId::new(1),
            node_run_id: NodeRunId::new(1),
            status: Status::Waiting,
            requirement_templates: vec![],
            requirements: vec![],
            contains_service: false,
            resolution_errors: vec![],
            resolved_at: None,
            parameters: vec![],
            queued_at: Utc::now(),
            booked_by: None,
            executed_by: None,
            done_at: None,
        }
    }

    fn booking(id: i64, at: DateTime<Utc>) -> BookedBy {
        BookedBy {
            hatchery: HatcheryRef {
                id: HatcheryId::new(id),
                name: format!("hatchery-{id}"),
            },
            booked_at: at,
        }
    }

    #[test]
    fn test_phase_follows_status_and_booking() {
        let mut j = job();
        assert_eq!(j.phase(), JobPhase::Waiting);
        j.apply(&JobTransition::Book(booking(1, Utc::now()))).unwrap();
        assert_eq!(j.phase(), JobPhase::Booked);
        assert_eq!(j.status, Status::Waiting);

        let worker = ExecutedBy {
            worker_id: "w-1".to_string(),
            worker_name: "worker".to_string(),
            started_at: Utc::now(),
        };
        j.apply(&JobTransition::Start {
            hatchery: HatcheryId::new(1),
            worker,
        })
        .unwrap();
        assert_eq!(j.phase(), JobPhase::Building);

        j.apply(&JobTransition::Finish {
            status: Status::Success,
            at: Utc::now(),
        })
        .unwrap();
        assert_eq!(j.phase(), JobPhase::Done);
        assert!(j.booked_by.is_none());
        assert!(j.done_at.is_some());
    }

    #[test]
    fn test_start_and_release_require_owner() {
        let mut j = job();
        j.apply(&JobTransition::Book(booking(1, Utc::now()))).unwrap();

        let err = j
            .apply(&JobTransition::Release {
                hatchery: HatcheryId::new(2),
            })
            .unwrap_err();
        assert!(err.0.contains("not 2"));
        assert!(j.booked_by.is_some());

        j.apply(&JobTransition::Release {
            hatchery: HatcheryId::new(1),
        })
        .unwrap();
        assert!(j.booked_by.is_none());
    }

    #[test]
    fn test_expire_only_releases_stale_bookings() {
        let now = Utc::now();
        let mut j = job();
        j.apply(&JobTransition::Book(booking(1, now))).unwrap();

        assert!(
            j.apply(&JobTransition::ExpireBooking {
                stale_before: now - Duration::seconds(1),
            })
            .is_err()
        );
        j.apply(&JobTransition::ExpireBooking { stale_before: now })
            .unwrap();
        assert_eq!(j.phase(), JobPhase::Waiting);
    }

    #[test]
    fn test_finish_rejects_non_completion_status() {
        let mut j = job();
        for status in [Status::Waiting, Status::Building, Status::NeverBuilt] {
            assert!(
                j.apply(&JobTransition::Finish {
                    status,
                    at: Utc::now(),
                })
                .is_err()
            );
        }
    }

    #[test]
    fn test_is_resolved() {
        let mut j = job();
        assert!(!j.is_resolved());
        j.resolved_at = Some(Utc::now());
        assert!(j.is_resolved());
        j.resolution_errors.push("unresolved".to_string());
        assert!(!j.is_resolved());
    }
}
