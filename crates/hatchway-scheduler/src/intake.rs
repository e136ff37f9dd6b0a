//! Job intake: queue a job and resolve its requirements.

use std::sync::Arc;

use chrono::Utc;
use hatchway_core::job::{Job, JobResolution, JobTransition, NewJob};
use hatchway_core::{JobId, JobPhase, Result};
use hatchway_db::JobRepo;
use tracing::{info, warn};

use crate::requirements::{project_requirements, resolve_requirements};
use crate::runs::RunStatusUpdater;

pub struct JobIntake {
    jobs: Arc<dyn JobRepo>,
    updater: Arc<RunStatusUpdater>,
}

impl JobIntake {
    pub fn new(jobs: Arc<dyn JobRepo>, updater: Arc<RunStatusUpdater>) -> Self {
        Self { jobs, updater }
    }

    /// Queue a job and resolve it straight away.
    ///
    /// A job whose requirements fail to resolve is still queued; it carries
    /// the errors and is not offered for booking until a later resolve
    /// succeeds.
    pub async fn enqueue(&self, new_job: NewJob) -> Result<Job> {
        let job = self.jobs.insert_job(new_job).await?;
        info!(job_id = %job.id, node_run_id = %job.node_run_id, "Job queued");

        let job = self.resolve(job.id).await?;
        self.updater.recompute(job.node_run_id).await?;
        Ok(job)
    }

    /// Resolve a waiting job against its node run's current build parameters.
    pub async fn resolve(&self, job_id: JobId) -> Result<Job> {
        let job = self.jobs.load_job(job_id).await?;
        let build_parameters = self.jobs.load_build_parameters(job_id).await?;

        let resolution = resolve_requirements(&job.requirement_templates, &build_parameters);
        let parameters = project_requirements(&resolution.requirements);
        let errors = resolution
            .errors
            .as_ref()
            .map(|e| e.messages())
            .unwrap_or_default();

        if let Some(e) = &resolution.errors {
            warn!(job_id = %job_id, error = %e, "Requirements not resolved");
        }

        let job = self
            .jobs
            .save_job_transition(
                job_id,
                &[JobPhase::Waiting],
                JobTransition::Resolve(JobResolution {
                    requirements: resolution.requirements,
                    contains_service: resolution.contains_service,
                    errors,
                    parameters,
                    resolved_at: Utc::now(),
                }),
            )
            .await?;
        Ok(job)
    }
}
