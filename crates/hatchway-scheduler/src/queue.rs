//! Read-only views of the job queue for monitoring.
//!
//! These read the store without taking any lock, so an entry may be one
//! booking behind. Booking decisions go through the broker instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hatchway_core::job::{BookedBy, ExecutedBy, Job};
use hatchway_core::{Error, HatcheryId, JobId, JobPhase, NodeRunId, Result, Status};
use hatchway_db::{JobFilter, JobRepo};
use serde::Serialize;

/// Which active jobs a queue read covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    Waiting,
    Building,
    #[default]
    Active,
}

impl StatusFilter {
    pub fn statuses(&self) -> &'static [Status] {
        match self {
            StatusFilter::Waiting => &[Status::Waiting],
            StatusFilter::Building => &[Status::Building],
            StatusFilter::Active => &[Status::Waiting, Status::Building],
        }
    }

    /// Build a filter from requested statuses. An empty list means both.
    pub fn from_statuses(statuses: &[Status]) -> Result<Self> {
        let waiting = statuses.contains(&Status::Waiting);
        let building = statuses.contains(&Status::Building);

        if let Some(other) = statuses.iter().find(|s| s.is_terminal()) {
            return Err(Error::InvalidInput(format!(
                "{other} is not a queue status"
            )));
        }

        Ok(match (waiting, building) {
            (true, false) => StatusFilter::Waiting,
            (false, true) => StatusFilter::Building,
            _ => StatusFilter::Active,
        })
    }
}

/// A queued job as shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: JobId,
    pub node_run_id: NodeRunId,
    pub status: Status,
    pub phase: JobPhase,
    pub queued_at: DateTime<Utc>,
    pub queued_seconds: i64,
    pub booked_by: Option<BookedBy>,
    pub executed_by: Option<ExecutedBy>,
    /// `type:name=value` for each resolved requirement.
    pub requirements: Vec<String>,
    pub contains_service: bool,
    pub resolution_errors: Vec<String>,
}

impl QueueEntry {
    pub fn from_job(job: Job, now: DateTime<Utc>) -> Self {
        let requirements = job
            .requirements
            .iter()
            .map(|r| format!("{}:{}={}", r.kind, r.name, r.value))
            .collect();

        Self {
            id: job.id,
            node_run_id: job.node_run_id,
            status: job.status,
            phase: job.phase(),
            queued_at: job.queued_at,
            queued_seconds: (now - job.queued_at).num_seconds().max(0),
            booked_by: job.booked_by,
            executed_by: job.executed_by,
            requirements,
            contains_service: job.contains_service,
            resolution_errors: job.resolution_errors,
        }
    }
}

/// Booked and building jobs held by one hatchery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerCount {
    pub hatchery_id: HatcheryId,
    pub hatchery_name: String,
    /// Job count keyed by status string.
    pub counts: BTreeMap<String, u32>,
}

pub struct QueueView {
    jobs: Arc<dyn JobRepo>,
}

impl QueueView {
    pub fn new(jobs: Arc<dyn JobRepo>) -> Self {
        Self { jobs }
    }

    /// Queued jobs, oldest first.
    pub async fn list(&self, filter: StatusFilter) -> Result<Vec<QueueEntry>> {
        let now = Utc::now();
        let jobs = self
            .jobs
            .list_jobs(&JobFilter::statuses(filter.statuses()))
            .await?;
        Ok(jobs
            .into_iter()
            .map(|job| QueueEntry::from_job(job, now))
            .collect())
    }

    pub async fn count(&self, filter: StatusFilter) -> Result<usize> {
        let jobs = self
            .jobs
            .list_jobs(&JobFilter::statuses(filter.statuses()))
            .await?;
        Ok(jobs.len())
    }

    /// Per-hatchery counts of the jobs they currently hold.
    pub async fn worker_counts(&self) -> Result<Vec<WorkerCount>> {
        let jobs = self
            .jobs
            .list_jobs(&JobFilter::statuses(StatusFilter::Active.statuses()))
            .await?;

        let mut by_hatchery: BTreeMap<HatcheryId, WorkerCount> = BTreeMap::new();
        for job in jobs {
            let Some(booking) = &job.booked_by else {
                continue;
            };
            let entry = by_hatchery
                .entry(booking.hatchery.id)
                .or_insert_with(|| WorkerCount {
                    hatchery_id: booking.hatchery.id,
                    hatchery_name: booking.hatchery.name.clone(),
                    counts: BTreeMap::new(),
                });
            *entry
                .counts
                .entry(job.status.as_str().to_string())
                .or_default() += 1;
        }

        Ok(by_hatchery.into_values().collect())
    }
}
