//! Application state.

use hatchway_config::BookingConfig;
use hatchway_db::{JobRepo, MemoryRepo, PgJobRepo, PgRunRepo, RunRepo};
use hatchway_scheduler::{BookingBroker, JobIntake, QueueView, RunStatusUpdater};
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Set when backed by PostgreSQL; used by the readiness probe.
    pub pool: Option<PgPool>,
    pub job_repo: Arc<dyn JobRepo>,
    pub run_repo: Arc<dyn RunRepo>,
    pub broker: Arc<BookingBroker>,
    pub queue: Arc<QueueView>,
    pub intake: Arc<JobIntake>,
}

impl AppState {
    pub fn new(
        job_repo: Arc<dyn JobRepo>,
        run_repo: Arc<dyn RunRepo>,
        booking: &BookingConfig,
    ) -> Self {
        let updater = Arc::new(RunStatusUpdater::new(job_repo.clone(), run_repo.clone()));
        let broker = Arc::new(BookingBroker::new(
            job_repo.clone(),
            run_repo.clone(),
            updater.clone(),
            booking.grace_period,
        ));
        let queue = Arc::new(QueueView::new(job_repo.clone()));
        let intake = Arc::new(JobIntake::new(job_repo.clone(), updater));

        Self {
            pool: None,
            job_repo,
            run_repo,
            broker,
            queue,
            intake,
        }
    }

    pub fn in_memory(booking: &BookingConfig) -> Self {
        let repo = Arc::new(MemoryRepo::new());
        Self::new(repo.clone(), repo, booking)
    }

    pub fn postgres(pool: PgPool, booking: &BookingConfig) -> Self {
        let job_repo = Arc::new(PgJobRepo::new(pool.clone()));
        let run_repo = Arc::new(PgRunRepo::new(pool.clone()));
        Self {
            pool: Some(pool),
            ..Self::new(job_repo, run_repo, booking)
        }
    }
}
