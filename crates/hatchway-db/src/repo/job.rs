//! Job repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hatchway_core::hatchery::HatcheryRef;
use hatchway_core::job::{BookedBy, ExecutedBy, Job, JobTransition, NewJob};
use hatchway_core::parameter::Parameter;
use hatchway_core::{HatcheryId, JobId, JobPhase, NodeRunId, Status};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::debug;

use crate::{DbError, DbResult};

/// Which jobs `list_jobs` returns.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Statuses to include; empty means any.
    pub statuses: Vec<Status>,
    pub node_run_id: Option<NodeRunId>,
    /// Only jobs whose booking is at least this old.
    pub booked_before: Option<DateTime<Utc>>,
}

impl JobFilter {
    pub fn statuses(statuses: &[Status]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn node_run(node_run_id: NodeRunId) -> Self {
        Self {
            node_run_id: Some(node_run_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&job.status) {
            return false;
        }
        if self.node_run_id.is_some_and(|id| id != job.node_run_id) {
            return false;
        }
        if let Some(cutoff) = self.booked_before {
            match &job.booked_by {
                Some(booking) if booking.booked_at <= cutoff => {}
                _ => return false,
            }
        }
        true
    }
}

/// Job store.
///
/// `save_job_transition` is the only way a job changes. It must check the
/// job's current phase against `expected` and apply the transition as one
/// atomic step per job, so concurrent callers racing on the same job see
/// exactly one winner. Losers get [`DbError::Conflict`].
#[async_trait]
pub trait JobRepo: Send + Sync {
    async fn insert_job(&self, job: NewJob) -> DbResult<Job>;
    async fn load_job(&self, id: JobId) -> DbResult<Job>;
    async fn save_job_transition(
        &self,
        id: JobId,
        expected: &[JobPhase],
        transition: JobTransition,
    ) -> DbResult<Job>;
    /// Matching jobs, oldest queued first.
    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Vec<Job>>;
    /// Build parameters of the node run that owns the job.
    async fn load_build_parameters(&self, job_id: JobId) -> DbResult<Vec<Parameter>>;
}

/// Check the phase and apply a transition to a job already locked by the caller.
pub(crate) fn transition_job(
    job: &Job,
    expected: &[JobPhase],
    transition: &JobTransition,
) -> DbResult<Job> {
    let actual = job.phase();
    if !expected.contains(&actual) {
        return Err(DbError::Conflict {
            job_id: job.id,
            expected: expected.to_vec(),
            actual,
        });
    }

    let mut next = job.clone();
    next.apply(transition).map_err(|e| DbError::Rejected {
        job_id: job.id,
        reason: e.0,
    })?;
    Ok(next)
}

/// A job row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobRecord {
    pub id: i64,
    pub node_run_id: i64,
    pub status: String,
    pub requirement_templates: serde_json::Value,
    pub requirements: serde_json::Value,
    pub contains_service: bool,
    pub resolution_errors: serde_json::Value,
    pub resolved_at: Option<DateTime<Utc>>,
    pub parameters: serde_json::Value,
    pub queued_at: DateTime<Utc>,
    pub booked_by_id: Option<i64>,
    pub booked_by_name: Option<String>,
    pub booked_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub worker_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub done_at: Option<DateTime<Utc>>,
}

pub(crate) fn decode_json<T: DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> DbResult<T> {
    serde_json::from_value(value).map_err(|e| DbError::Corrupt(format!("{what}: {e}")))
}

pub(crate) fn encode_json<T: Serialize>(value: &T, what: &str) -> DbResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| DbError::Corrupt(format!("{what}: {e}")))
}

impl TryFrom<JobRecord> for Job {
    type Error = DbError;

    fn try_from(record: JobRecord) -> DbResult<Self> {
        let status = record
            .status
            .parse::<Status>()
            .map_err(|e| DbError::Corrupt(format!("job {}: {e}", record.id)))?;

        let booked_by = match (record.booked_by_id, record.booked_by_name, record.booked_at) {
            (Some(id), Some(name), Some(booked_at)) => Some(BookedBy {
                hatchery: HatcheryRef {
                    id: HatcheryId::new(id),
                    name,
                },
                booked_at,
            }),
            _ => None,
        };

        let executed_by = match (record.worker_id, record.worker_name, record.started_at) {
            (Some(worker_id), Some(worker_name), Some(started_at)) => Some(ExecutedBy {
                worker_id,
                worker_name,
                started_at,
            }),
            _ => None,
        };

        Ok(Job {
            id: JobId::new(record.id),
            node_run_id: NodeRunId::new(record.node_run_id),
            status,
            requirement_templates: decode_json(
                record.requirement_templates,
                "requirement_templates",
            )?,
            requirements: decode_json(record.requirements, "requirements")?,
            contains_service: record.contains_service,
            resolution_errors: decode_json(record.resolution_errors, "resolution_errors")?,
            resolved_at: record.resolved_at,
            parameters: decode_json(record.parameters, "parameters")?,
            queued_at: record.queued_at,
            booked_by,
            executed_by,
            done_at: record.done_at,
        })
    }
}

/// PostgreSQL implementation of JobRepo.
pub struct PgJobRepo {
    pool: PgPool,
}

impl PgJobRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepo for PgJobRepo {
    async fn insert_job(&self, job: NewJob) -> DbResult<Job> {
        let record = sqlx::query_as::<_, JobRecord>(
            r#"
            INSERT INTO jobs (node_run_id, status, requirement_templates, queued_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING *
            "#,
        )
        .bind(job.node_run_id.get())
        .bind(Status::Waiting.as_str())
        .bind(encode_json(&job.requirement_templates, "requirement_templates")?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                DbError::NotFound(format!("node run {}", job.node_run_id))
            }
            other => DbError::Database(other),
        })?;
        record.try_into()
    }

    async fn load_job(&self, id: JobId) -> DbResult<Job> {
        let record = sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        record.try_into()
    }

    async fn save_job_transition(
        &self,
        id: JobId,
        expected: &[JobPhase],
        transition: JobTransition,
    ) -> DbResult<Job> {
        let mut tx = self.pool.begin().await?;

        // The row lock serialises transitions on this job only
        let record =
            sqlx::query_as::<_, JobRecord>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(id.get())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| DbError::NotFound(format!("job {}", id)))?;
        let current: Job = record.try_into()?;
        let next = transition_job(&current, expected, &transition)?;

        let (booked_by_id, booked_by_name, booked_at) = match &next.booked_by {
            Some(b) => (
                Some(b.hatchery.id.get()),
                Some(b.hatchery.name.clone()),
                Some(b.booked_at),
            ),
            None => (None, None, None),
        };
        let (worker_id, worker_name, started_at) = match &next.executed_by {
            Some(w) => (
                Some(w.worker_id.clone()),
                Some(w.worker_name.clone()),
                Some(w.started_at),
            ),
            None => (None, None, None),
        };

        sqlx::query(
            r#"
            UPDATE jobs SET
                status = $2,
                requirements = $3,
                contains_service = $4,
                resolution_errors = $5,
                resolved_at = $6,
                parameters = $7,
                booked_by_id = $8,
                booked_by_name = $9,
                booked_at = $10,
                worker_id = $11,
                worker_name = $12,
                started_at = $13,
                done_at = $14
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .bind(next.status.as_str())
        .bind(encode_json(&next.requirements, "requirements")?)
        .bind(next.contains_service)
        .bind(encode_json(&next.resolution_errors, "resolution_errors")?)
        .bind(next.resolved_at)
        .bind(encode_json(&next.parameters, "parameters")?)
        .bind(booked_by_id)
        .bind(booked_by_name)
        .bind(booked_at)
        .bind(worker_id)
        .bind(worker_name)
        .bind(started_at)
        .bind(next.done_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            job_id = %id,
            transition = transition.name(),
            phase = %next.phase(),
            "Job transition saved"
        );
        Ok(next)
    }

    async fn list_jobs(&self, filter: &JobFilter) -> DbResult<Vec<Job>> {
        let statuses: Option<Vec<String>> = if filter.statuses.is_empty() {
            None
        } else {
            Some(
                filter
                    .statuses
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            )
        };

        let records = sqlx::query_as::<_, JobRecord>(
            r#"
            SELECT * FROM jobs
            WHERE ($1::text[] IS NULL OR status = ANY($1))
              AND ($2::bigint IS NULL OR node_run_id = $2)
              AND ($3::timestamptz IS NULL OR booked_at <= $3)
            ORDER BY queued_at ASC, id ASC
            "#,
        )
        .bind(statuses)
        .bind(filter.node_run_id.map(|id| id.get()))
        .bind(filter.booked_before)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(Job::try_from).collect()
    }

    async fn load_build_parameters(&self, job_id: JobId) -> DbResult<Vec<Parameter>> {
        let value = sqlx::query_scalar::<_, serde_json::Value>(
            r#"
            SELECT nr.build_parameters
            FROM jobs j JOIN node_runs nr ON nr.id = j.node_run_id
            WHERE j.id = $1
            "#,
        )
        .bind(job_id.get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job {}", job_id)))?;
        decode_json(value, "build_parameters")
    }
}
