//! Exclusive job booking between competing hatcheries.
//!
//! Every state change goes through [`JobRepo::save_job_transition`], which
//! checks the job's phase and applies the change atomically. When several
//! hatcheries race to book the same job, exactly one transition commits and
//! the others observe the winner's booking.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::future::try_join_all;
use hatchway_core::hatchery::Hatchery;
use hatchway_core::job::{BookedBy, ExecutedBy, Job, JobTransition};
use hatchway_core::run::WorkflowRun;
use hatchway_core::{Error, HatcheryId, JobId, JobPhase, NodeRunId, Result, Status, WorkflowRunId};
use hatchway_db::{DbError, JobFilter, JobRepo, RunRepo};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::queue::StatusFilter;
use crate::runs::{RunStatusUpdater, RunStatuses};

/// A job moved to a terminal status, with the run statuses it produced.
#[derive(Debug, Clone, Serialize)]
pub struct Completion {
    pub job: Job,
    #[serde(flatten)]
    pub runs: RunStatuses,
}

pub struct BookingBroker {
    jobs: Arc<dyn JobRepo>,
    runs: Arc<dyn RunRepo>,
    updater: Arc<RunStatusUpdater>,
    grace_period: TimeDelta,
}

impl BookingBroker {
    pub fn new(
        jobs: Arc<dyn JobRepo>,
        runs: Arc<dyn RunRepo>,
        updater: Arc<RunStatusUpdater>,
        grace_period: Duration,
    ) -> Self {
        Self {
            jobs,
            runs,
            updater,
            grace_period: TimeDelta::from_std(grace_period).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Jobs this hatchery could work on, oldest first.
    ///
    /// Waiting jobs already booked by someone, jobs whose requirements did
    /// not resolve and jobs the hatchery cannot satisfy are left out.
    pub async fn list_bookable(
        &self,
        filter: StatusFilter,
        hatchery: &Hatchery,
    ) -> Result<Vec<Job>> {
        let jobs = self
            .jobs
            .list_jobs(&JobFilter::statuses(filter.statuses()))
            .await?;

        let bookable: Vec<Job> = jobs
            .into_iter()
            .filter(|job| job.phase() != JobPhase::Booked)
            .filter(|job| job.is_resolved())
            .filter(|job| {
                let ok = hatchery.satisfies(&job.requirements);
                if !ok {
                    debug!(job_id = %job.id, hatchery = %hatchery.name, "Requirements not satisfied");
                }
                ok
            })
            .collect();

        Ok(bookable)
    }

    /// Claim a waiting job for a hatchery.
    ///
    /// Losing a race returns [`Error::AlreadyBooked`] naming the winner.
    pub async fn book(&self, job_id: JobId, hatchery: &Hatchery) -> Result<Job> {
        let job = self.jobs.load_job(job_id).await?;

        if let Some(booking) = &job.booked_by {
            if job.phase() == JobPhase::Booked {
                return Err(Error::AlreadyBooked {
                    job_id,
                    booked_by: booking.hatchery.clone(),
                });
            }
        }
        if !job.is_resolved() {
            let reason = if job.resolution_errors.is_empty() {
                "requirements are not resolved".to_string()
            } else {
                job.resolution_errors.join("; ")
            };
            return Err(Error::NotBookable { job_id, reason });
        }
        if !hatchery.satisfies(&job.requirements) {
            return Err(Error::NotBookable {
                job_id,
                reason: format!("hatchery {} cannot satisfy its requirements", hatchery.name),
            });
        }

        let booking = BookedBy {
            hatchery: hatchery.reference(),
            booked_at: Utc::now(),
        };
        match self
            .jobs
            .save_job_transition(job_id, &[JobPhase::Waiting], JobTransition::Book(booking))
            .await
        {
            Ok(job) => {
                info!(job_id = %job_id, hatchery = %hatchery.name, "Job booked");
                Ok(job)
            }
            Err(DbError::Conflict {
                actual: JobPhase::Booked,
                ..
            }) => {
                let winner = self.jobs.load_job(job_id).await?;
                match winner.booked_by {
                    Some(booking) => {
                        warn!(
                            job_id = %job_id,
                            hatchery = %hatchery.name,
                            booked_by = %booking.hatchery.name,
                            "Lost booking race"
                        );
                        Err(Error::AlreadyBooked {
                            job_id,
                            booked_by: booking.hatchery,
                        })
                    }
                    // Released again before we could read it
                    None => Err(Error::Conflict {
                        job_id,
                        expected: vec![JobPhase::Waiting],
                        actual: winner.phase(),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Give a booking back so other hatcheries can take the job.
    pub async fn release(&self, job_id: JobId, hatchery: HatcheryId) -> Result<Job> {
        let job = self
            .jobs
            .save_job_transition(
                job_id,
                &[JobPhase::Booked],
                JobTransition::Release { hatchery },
            )
            .await?;
        info!(job_id = %job_id, hatchery = %hatchery, "Booking released");
        Ok(job)
    }

    /// Record that the booking hatchery spawned a worker for the job.
    pub async fn start(
        &self,
        job_id: JobId,
        hatchery: HatcheryId,
        worker_id: impl Into<String>,
        worker_name: impl Into<String>,
    ) -> Result<Job> {
        let worker = ExecutedBy {
            worker_id: worker_id.into(),
            worker_name: worker_name.into(),
            started_at: Utc::now(),
        };
        let worker_id = worker.worker_id.clone();
        let job = match self
            .jobs
            .save_job_transition(
                job_id,
                &[JobPhase::Booked],
                JobTransition::Start { hatchery, worker },
            )
            .await
        {
            Ok(job) => {
                info!(job_id = %job_id, hatchery = %hatchery, "Job started");
                job
            }
            // A retry of a start that committed but failed to roll up
            Err(DbError::Conflict {
                actual: JobPhase::Building,
                ..
            }) => {
                let job = self.jobs.load_job(job_id).await?;
                let same_start = job.booked_by.as_ref().map(|b| b.hatchery.id) == Some(hatchery)
                    && job.executed_by.as_ref().map(|w| w.worker_id.as_str())
                        == Some(worker_id.as_str());
                if !same_start {
                    return Err(Error::Conflict {
                        job_id,
                        expected: vec![JobPhase::Booked],
                        actual: JobPhase::Building,
                    });
                }
                debug!(job_id = %job_id, hatchery = %hatchery, "Job already started");
                job
            }
            Err(e) => return Err(e.into()),
        };

        self.updater.recompute(job.node_run_id).await?;
        Ok(job)
    }

    /// Record a job's outcome and roll it up to its runs.
    pub async fn complete(&self, job_id: JobId, status: Status) -> Result<Completion> {
        if !status.is_completion() {
            return Err(Error::InvalidInput(format!(
                "{status} is not a completion status"
            )));
        }

        let job = match self
            .jobs
            .save_job_transition(
                job_id,
                &[JobPhase::Booked, JobPhase::Building],
                JobTransition::Finish {
                    status,
                    at: Utc::now(),
                },
            )
            .await
        {
            Ok(job) => {
                info!(job_id = %job_id, status = %status, "Job completed");
                job
            }
            // Completing again with the same outcome only redoes the roll-up
            Err(DbError::Conflict {
                expected,
                actual: JobPhase::Done,
                ..
            }) => {
                let job = self.jobs.load_job(job_id).await?;
                if job.status != status {
                    return Err(Error::Conflict {
                        job_id,
                        expected,
                        actual: JobPhase::Done,
                    });
                }
                debug!(job_id = %job_id, status = %status, "Job already completed");
                job
            }
            Err(e) => return Err(e.into()),
        };

        let runs = self.updater.recompute(job.node_run_id).await?;
        Ok(Completion { job, runs })
    }

    /// Release every booking older than the grace period. Returns the released jobs.
    pub async fn expire_bookings(&self, now: DateTime<Utc>) -> Result<Vec<JobId>> {
        // A grace period reaching back past the earliest timestamp expires nothing
        let Some(stale_before) = now.checked_sub_signed(self.grace_period) else {
            return Ok(Vec::new());
        };
        let stale = self
            .jobs
            .list_jobs(&JobFilter {
                statuses: vec![Status::Waiting],
                booked_before: Some(stale_before),
                ..JobFilter::default()
            })
            .await?;

        let mut released = Vec::new();
        for job in stale {
            match self
                .jobs
                .save_job_transition(
                    job.id,
                    &[JobPhase::Booked],
                    JobTransition::ExpireBooking { stale_before },
                )
                .await
            {
                Ok(_) => {
                    info!(job_id = %job.id, "Stale booking expired");
                    released.push(job.id);
                }
                // Started, finished, released or re-booked since the read
                Err(DbError::Conflict { .. } | DbError::Rejected { .. }) => {
                    debug!(job_id = %job.id, "Booking changed before expiry");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(released)
    }

    /// Stop every active job of a node run.
    ///
    /// Jobs that reach a terminal status on their own in the meantime keep it.
    pub async fn stop_node_run(&self, node_run_id: NodeRunId) -> Result<RunStatuses> {
        self.runs.load_node_run(node_run_id).await?;
        self.stop_jobs(node_run_id).await?;
        self.updater.recompute(node_run_id).await
    }

    /// Stop every active job of every node run of a workflow run.
    pub async fn stop_workflow_run(&self, workflow_run_id: WorkflowRunId) -> Result<WorkflowRun> {
        self.runs.load_workflow_run(workflow_run_id).await?;
        let node_runs = self.runs.list_node_runs(workflow_run_id).await?;

        try_join_all(node_runs.iter().map(|nr| async move {
            self.stop_jobs(nr.id).await?;
            self.updater.recompute_node_run(nr.id).await
        }))
        .await?;

        self.updater.recompute_workflow_run(workflow_run_id).await
    }

    async fn stop_jobs(&self, node_run_id: NodeRunId) -> Result<usize> {
        let jobs = self.jobs.list_jobs(&JobFilter::node_run(node_run_id)).await?;

        let mut stopped = 0;
        for job in jobs.into_iter().filter(|j| j.status.is_active()) {
            match self
                .jobs
                .save_job_transition(
                    job.id,
                    &[JobPhase::Waiting, JobPhase::Booked, JobPhase::Building],
                    JobTransition::Finish {
                        status: Status::Stopped,
                        at: Utc::now(),
                    },
                )
                .await
            {
                Ok(_) => stopped += 1,
                Err(DbError::Conflict {
                    actual: JobPhase::Done,
                    ..
                }) => {
                    debug!(job_id = %job.id, "Job finished before it could be stopped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(node_run_id = %node_run_id, stopped, "Node run stopped");
        Ok(stopped)
    }
}
