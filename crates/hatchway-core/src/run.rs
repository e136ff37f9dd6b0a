//! Workflow runs and node runs.
//!
//! Which nodes exist and how they depend on each other is decided upstream;
//! this crate only carries the hierarchy so statuses can be rolled up.

use serde::{Deserialize, Serialize};

use crate::parameter::Parameter;
use crate::{NodeRunId, Status, WorkflowRunId};

/// A workflow run. Its status is derived from its node runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: WorkflowRunId,
    pub name: String,
    pub number: i64,
    pub status: Status,
}

/// One node of a workflow run. Owns the jobs whose `node_run_id` points at it;
/// its status is derived from theirs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRun {
    pub id: NodeRunId,
    pub workflow_run_id: WorkflowRunId,
    pub name: String,
    /// Node runs this one was triggered by.
    pub parents: Vec<NodeRunId>,
    pub status: Status,
    /// Parameters available to job requirement interpolation.
    pub build_parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWorkflowRun {
    pub name: String,
    pub number: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNodeRun {
    pub workflow_run_id: WorkflowRunId,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<NodeRunId>,
    #[serde(default)]
    pub build_parameters: Vec<Parameter>,
}
