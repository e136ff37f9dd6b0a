//! In-process store for single-node deployments and tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use hatchway_core::job::{Job, JobTransition, NewJob};
use hatchway_core::parameter::Parameter;
use hatchway_core::run::{NewNodeRun, NewWorkflowRun, NodeRun, WorkflowRun};
use hatchway_core::{JobId, JobPhase, NodeRunId, Status, WorkflowRunId};
use tokio::sync::{Mutex, RwLock};

use super::job::{JobFilter, JobRepo, transition_job};
use super::run::RunRepo;
use crate::{DbError, DbResult};

/// Keeps every record in memory.
///
/// Each job sits behind its own mutex so transitions on one job are
/// serialised without blocking the rest of the queue.
#[derive(Default)]
pub struct MemoryRepo {
    next_id: AtomicI64,
    jobs: RwLock<BTreeMap<JobId, Arc<Mutex<Job>>>>,
    node_runs: RwLock<BTreeMap<NodeRunId, NodeRun>>,
    workflow_runs: RwLock<BTreeMap<WorkflowRunId, WorkflowRun>>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    async fn job_slot(&self, id: JobId) -> DbResult<Arc<Mutex<Job>>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))
    }
}

#[async_trait]
impl JobRepo for MemoryRepo {
    async fn insert_job(&self, job: NewJob) -> DbResult<Job> {
        if !self.node_runs.read().await.contains_key(&job.node_run_id) {
            return Err(DbError::NotFound(format!("node run {}", job.node_run_id)));
        }

        let id = JobId::new(self.next_id());
        let job = Job {
            id,
            node_run_id: job.node_run_id,
            status: Status::Waiting,
            requirement_templates: job.requirement_templates,
            requirements: Vec::new(),
            contains_service: false,
            resolution_errors: Vec::new(),
            resolved_at: None,
            parameters: Vec::new(),
            queued_at: Utc::now(),
            booked_by: None,
            executed_by: None,
            done_at: None,
        };
        self.jobs
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(job.clone())));
        Ok(job)
    }

    async fn load_job(&self, id: JobId) -> DbResult<Job> {
        let slot = self.job_slot(id).await?;
        let job = slot.lock().await.clone();
        Ok(job)
    }

    async fn save_job_transition(
        &self,
        id: JobId,
        expected: &[JobPhase],
        transition: JobTransition,
    ) -> DbResult<Job> {
        let slot = self.job_slot(id).await?;
        let mut job = slot.lock().await;
        let next = transition_job(&job, expected, &transition)?;
        *job = next.clone();
        Ok(next)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Vec<Job>> {
        let slots: Vec<_> = self.jobs.read().await.values().cloned().collect();

        let mut jobs = Vec::new();
        for slot in slots {
            let job = slot.lock().await;
            if filter.matches(&job) {
                jobs.push(job.clone());
            }
        }
        jobs.sort_by(|a, b| a.queued_at.cmp(&b.queued_at).then(a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn load_build_parameters(&self, job_id: JobId) -> DbResult<Vec<Parameter>> {
        let node_run_id = self.load_job(job_id).await?.node_run_id;
        let node_run = self.load_node_run(node_run_id).await?;
        Ok(node_run.build_parameters)
    }
}

#[async_trait]
impl RunRepo for MemoryRepo {
    async fn insert_workflow_run(&self, run: NewWorkflowRun) -> DbResult<WorkflowRun> {
        let run = WorkflowRun {
            id: WorkflowRunId::new(self.next_id()),
            name: run.name,
            number: run.number,
            status: Status::NeverBuilt,
        };
        self.workflow_runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn insert_node_run(&self, run: NewNodeRun) -> DbResult<NodeRun> {
        if !self
            .workflow_runs
            .read()
            .await
            .contains_key(&run.workflow_run_id)
        {
            return Err(DbError::NotFound(format!(
                "workflow run {}",
                run.workflow_run_id
            )));
        }

        let run = NodeRun {
            id: NodeRunId::new(self.next_id()),
            workflow_run_id: run.workflow_run_id,
            name: run.name,
            parents: run.parents,
            status: Status::NeverBuilt,
            build_parameters: run.build_parameters,
        };
        self.node_runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn load_workflow_run(&self, id: WorkflowRunId) -> DbResult<WorkflowRun> {
        self.workflow_runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("workflow run {}", id)))
    }

    async fn load_node_run(&self, id: NodeRunId) -> DbResult<NodeRun> {
        self.node_runs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("node run {}", id)))
    }

    async fn list_node_runs(&self, workflow_run_id: WorkflowRunId) -> DbResult<Vec<NodeRun>> {
        Ok(self
            .node_runs
            .read()
            .await
            .values()
            .filter(|r| r.workflow_run_id == workflow_run_id)
            .cloned()
            .collect())
    }

    async fn save_node_run_status(&self, id: NodeRunId, status: Status) -> DbResult<NodeRun> {
        let mut runs = self.node_runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("node run {}", id)))?;
        run.status = status;
        Ok(run.clone())
    }

    async fn save_workflow_run_status(
        &self,
        id: WorkflowRunId,
        status: Status,
    ) -> DbResult<WorkflowRun> {
        let mut runs = self.workflow_runs.write().await;
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("workflow run {}", id)))?;
        run.status = status;
        Ok(run.clone())
    }
}
