//! Node run and workflow run status propagation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use hatchway_core::run::{NodeRun, WorkflowRun};
use hatchway_core::{NodeRunId, Result, WorkflowRunId};
use hatchway_db::{JobFilter, JobRepo, RunRepo};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::aggregate::{StatusCounter, aggregate};

/// One async lock per key, created on demand.
///
/// Entries nobody holds or waits on are pruned on the next acquisition.
struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K: Eq + Hash + Copy> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn acquire(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Statuses after a recompute.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatuses {
    pub node_run: NodeRun,
    pub workflow_run: WorkflowRun,
}

/// Passes a recompute makes before settling for its last write.
const MAX_RECOMPUTE_PASSES: usize = 4;

/// Recomputes run statuses from their children.
///
/// A recompute for a given run is serialised with every other recompute of
/// the same run in this process and always reads the full set of children
/// after taking the lock. Another server sharing the store can still land a
/// write computed from an older read, so every write is followed by another
/// read of the run and its children, and the status is written again until
/// the stored value matches the children.
pub struct RunStatusUpdater {
    jobs: Arc<dyn JobRepo>,
    runs: Arc<dyn RunRepo>,
    node_locks: KeyedLocks<NodeRunId>,
    workflow_locks: KeyedLocks<WorkflowRunId>,
}

impl RunStatusUpdater {
    pub fn new(jobs: Arc<dyn JobRepo>, runs: Arc<dyn RunRepo>) -> Self {
        Self {
            jobs,
            runs,
            node_locks: KeyedLocks::new(),
            workflow_locks: KeyedLocks::new(),
        }
    }

    /// Recompute a node run from its jobs, then its workflow run from its node runs.
    pub async fn recompute(&self, node_run_id: NodeRunId) -> Result<RunStatuses> {
        let node_run = self.recompute_node_run(node_run_id).await?;
        let workflow_run = self.recompute_workflow_run(node_run.workflow_run_id).await?;
        Ok(RunStatuses {
            node_run,
            workflow_run,
        })
    }

    pub async fn recompute_node_run(&self, id: NodeRunId) -> Result<NodeRun> {
        let _guard = self.node_locks.acquire(id).await;

        let mut written = None;
        for _ in 0..MAX_RECOMPUTE_PASSES {
            let current = self.runs.load_node_run(id).await?;
            let jobs = self.jobs.list_jobs(&JobFilter::node_run(id)).await?;
            let status = aggregate(&StatusCounter::from_statuses(jobs.iter().map(|j| j.status)));

            if status == current.status {
                debug!(node_run_id = %id, status = %status, "Node run status settled");
                return Ok(current);
            }

            let updated = self.runs.save_node_run_status(id, status).await?;
            info!(
                node_run_id = %id,
                from = %current.status,
                to = %status,
                "Node run status changed"
            );
            written = Some(updated);
        }

        warn!(node_run_id = %id, "Node run status still changing, keeping last write");
        match written {
            Some(run) => Ok(run),
            None => Ok(self.runs.load_node_run(id).await?),
        }
    }

    pub async fn recompute_workflow_run(&self, id: WorkflowRunId) -> Result<WorkflowRun> {
        let _guard = self.workflow_locks.acquire(id).await;

        let mut written = None;
        for _ in 0..MAX_RECOMPUTE_PASSES {
            let current = self.runs.load_workflow_run(id).await?;
            let node_runs = self.runs.list_node_runs(id).await?;
            let status =
                aggregate(&StatusCounter::from_statuses(node_runs.iter().map(|r| r.status)));

            if status == current.status {
                return Ok(current);
            }

            let updated = self.runs.save_workflow_run_status(id, status).await?;
            info!(
                workflow_run_id = %id,
                from = %current.status,
                to = %status,
                "Workflow run status changed"
            );
            written = Some(updated);
        }

        warn!(workflow_run_id = %id, "Workflow run status still changing, keeping last write");
        match written {
            Some(run) => Ok(run),
            None => Ok(self.runs.load_workflow_run(id).await?),
        }
    }
}
