//! Store wrappers for exercising failure paths.

use std::sync::Arc;

use async_trait::async_trait;
use hatchway_core::run::{NewNodeRun, NewWorkflowRun, NodeRun, WorkflowRun};
use hatchway_core::{NodeRunId, Status, WorkflowRunId};
use hatchway_db::{DbError, DbResult, MemoryRepo, RunRepo};
use tokio::sync::Mutex;

/// What the next node run status write does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NextWrite {
    #[default]
    Pass,
    /// Fail without writing.
    Fail,
    /// Write, then have a late writer overwrite it with this status.
    Overwrite(Status),
}

/// A [`RunRepo`] over [`MemoryRepo`] whose next node run status write can misbehave.
pub struct FaultyRuns {
    inner: Arc<MemoryRepo>,
    next: Mutex<NextWrite>,
}

impl FaultyRuns {
    pub fn new(inner: Arc<MemoryRepo>) -> Self {
        Self {
            inner,
            next: Mutex::new(NextWrite::Pass),
        }
    }

    pub async fn set_next(&self, next: NextWrite) {
        *self.next.lock().await = next;
    }
}

#[async_trait]
impl RunRepo for FaultyRuns {
    async fn insert_workflow_run(&self, run: NewWorkflowRun) -> DbResult<WorkflowRun> {
        self.inner.insert_workflow_run(run).await
    }

    async fn insert_node_run(&self, run: NewNodeRun) -> DbResult<NodeRun> {
        self.inner.insert_node_run(run).await
    }

    async fn load_workflow_run(&self, id: WorkflowRunId) -> DbResult<WorkflowRun> {
        self.inner.load_workflow_run(id).await
    }

    async fn load_node_run(&self, id: NodeRunId) -> DbResult<NodeRun> {
        self.inner.load_node_run(id).await
    }

    async fn list_node_runs(&self, workflow_run_id: WorkflowRunId) -> DbResult<Vec<NodeRun>> {
        self.inner.list_node_runs(workflow_run_id).await
    }

    async fn save_node_run_status(&self, id: NodeRunId, status: Status) -> DbResult<NodeRun> {
        let next = std::mem::take(&mut *self.next.lock().await);
        match next {
            NextWrite::Pass => self.inner.save_node_run_status(id, status).await,
            NextWrite::Fail => Err(DbError::Corrupt("transient".to_string())),
            NextWrite::Overwrite(late) => {
                let written = self.inner.save_node_run_status(id, status).await?;
                self.inner.save_node_run_status(id, late).await?;
                Ok(written)
            }
        }
    }

    async fn save_workflow_run_status(
        &self,
        id: WorkflowRunId,
        status: Status,
    ) -> DbResult<WorkflowRun> {
        self.inner.save_workflow_run_status(id, status).await
    }
}
