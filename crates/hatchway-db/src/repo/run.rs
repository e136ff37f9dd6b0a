//! Workflow run and node run repository.

use async_trait::async_trait;
use hatchway_core::run::{NewNodeRun, NewWorkflowRun, NodeRun, WorkflowRun};
use hatchway_core::{NodeRunId, Status, WorkflowRunId};
use sqlx::PgPool;

use super::job::{decode_json, encode_json};
use crate::{DbError, DbResult};

#[async_trait]
pub trait RunRepo: Send + Sync {
    async fn insert_workflow_run(&self, run: NewWorkflowRun) -> DbResult<WorkflowRun>;
    async fn insert_node_run(&self, run: NewNodeRun) -> DbResult<NodeRun>;
    async fn load_workflow_run(&self, id: WorkflowRunId) -> DbResult<WorkflowRun>;
    async fn load_node_run(&self, id: NodeRunId) -> DbResult<NodeRun>;
    async fn list_node_runs(&self, workflow_run_id: WorkflowRunId) -> DbResult<Vec<NodeRun>>;
    async fn save_node_run_status(&self, id: NodeRunId, status: Status) -> DbResult<NodeRun>;
    async fn save_workflow_run_status(
        &self,
        id: WorkflowRunId,
        status: Status,
    ) -> DbResult<WorkflowRun>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkflowRunRecord {
    pub id: i64,
    pub name: String,
    pub number: i64,
    pub status: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NodeRunRecord {
    pub id: i64,
    pub workflow_run_id: i64,
    pub name: String,
    pub parents: serde_json::Value,
    pub status: String,
    pub build_parameters: serde_json::Value,
}

fn parse_status(raw: &str, what: &str) -> DbResult<Status> {
    raw.parse()
        .map_err(|e| DbError::Corrupt(format!("{what}: {e}")))
}

impl TryFrom<WorkflowRunRecord> for WorkflowRun {
    type Error = DbError;

    fn try_from(record: WorkflowRunRecord) -> DbResult<Self> {
        Ok(WorkflowRun {
            id: WorkflowRunId::new(record.id),
            status: parse_status(&record.status, &format!("workflow run {}", record.id))?,
            name: record.name,
            number: record.number,
        })
    }
}

impl TryFrom<NodeRunRecord> for NodeRun {
    type Error = DbError;

    fn try_from(record: NodeRunRecord) -> DbResult<Self> {
        Ok(NodeRun {
            id: NodeRunId::new(record.id),
            workflow_run_id: WorkflowRunId::new(record.workflow_run_id),
            status: parse_status(&record.status, &format!("node run {}", record.id))?,
            parents: decode_json(record.parents, "parents")?,
            build_parameters: decode_json(record.build_parameters, "build_parameters")?,
            name: record.name,
        })
    }
}

/// PostgreSQL implementation of RunRepo.
pub struct PgRunRepo {
    pool: PgPool,
}

impl PgRunRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepo for PgRunRepo {
    async fn insert_workflow_run(&self, run: NewWorkflowRun) -> DbResult<WorkflowRun> {
        let record = sqlx::query_as::<_, WorkflowRunRecord>(
            "INSERT INTO workflow_runs (name, number, status) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&run.name)
        .bind(run.number)
        .bind(Status::NeverBuilt.as_str())
        .fetch_one(&self.pool)
        .await?;
        record.try_into()
    }

    async fn insert_node_run(&self, run: NewNodeRun) -> DbResult<NodeRun> {
        let record = sqlx::query_as::<_, NodeRunRecord>(
            r#"
            INSERT INTO node_runs (workflow_run_id, name, parents, status, build_parameters)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(run.workflow_run_id.get())
        .bind(&run.name)
        .bind(encode_json(&run.parents, "parents")?)
        .bind(Status::NeverBuilt.as_str())
        .bind(encode_json(&run.build_parameters, "build_parameters")?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DbError::NotFound(format!("workflow run {}", run.workflow_run_id))
            }
            other => DbError::Database(other),
        })?;
        record.try_into()
    }

    async fn load_workflow_run(&self, id: WorkflowRunId) -> DbResult<WorkflowRun> {
        let record =
            sqlx::query_as::<_, WorkflowRunRecord>("SELECT * FROM workflow_runs WHERE id = $1")
                .bind(id.get())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("workflow run {}", id)))?;
        record.try_into()
    }

    async fn load_node_run(&self, id: NodeRunId) -> DbResult<NodeRun> {
        let record = sqlx::query_as::<_, NodeRunRecord>("SELECT * FROM node_runs WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("node run {}", id)))?;
        record.try_into()
    }

    async fn list_node_runs(&self, workflow_run_id: WorkflowRunId) -> DbResult<Vec<NodeRun>> {
        let records = sqlx::query_as::<_, NodeRunRecord>(
            "SELECT * FROM node_runs WHERE workflow_run_id = $1 ORDER BY id",
        )
        .bind(workflow_run_id.get())
        .fetch_all(&self.pool)
        .await?;
        records.into_iter().map(NodeRun::try_from).collect()
    }

    async fn save_node_run_status(&self, id: NodeRunId, status: Status) -> DbResult<NodeRun> {
        let record = sqlx::query_as::<_, NodeRunRecord>(
            "UPDATE node_runs SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id.get())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("node run {}", id)))?;
        record.try_into()
    }

    async fn save_workflow_run_status(
        &self,
        id: WorkflowRunId,
        status: Status,
    ) -> DbResult<WorkflowRun> {
        let record = sqlx::query_as::<_, WorkflowRunRecord>(
            "UPDATE workflow_runs SET status = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id.get())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("workflow run {}", id)))?;
        record.try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_run_record_decodes() {
        let record = NodeRunRecord {
            id: 4,
            workflow_run_id: 1,
            name: "build".to_string(),
            parents: serde_json::json!([2, 3]),
            status: "Building".to_string(),
            build_parameters: serde_json::json!([{"name": "cds.project", "value": "P"}]),
        };
        let run = NodeRun::try_from(record).unwrap();
        assert_eq!(run.parents, vec![NodeRunId::new(2), NodeRunId::new(3)]);
        assert_eq!(run.status, Status::Building);
        assert_eq!(run.build_parameters[0].value, "P");
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let record = WorkflowRunRecord {
            id: 1,
            name: "w".to_string(),
            number: 1,
            status: "fatal".to_string(),
        };
        assert!(matches!(
            WorkflowRun::try_from(record),
            Err(DbError::Corrupt(_))
        ));
    }
}
