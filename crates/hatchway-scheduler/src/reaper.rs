//! Background task that expires stale bookings.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::broker::BookingBroker;

/// Periodically hands stale bookings back to the queue.
pub struct BookingReaper {
    broker: Arc<BookingBroker>,
    interval: Duration,
}

impl BookingReaper {
    pub fn new(broker: Arc<BookingBroker>, interval: Duration) -> Self {
        Self { broker, interval }
    }

    /// Run one sweep. Returns the number of released bookings.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        match self.broker.expire_bookings(now).await {
            Ok(released) => {
                if !released.is_empty() {
                    info!(count = released.len(), "Released stale bookings");
                }
                released.len()
            }
            Err(e) => {
                warn!(error = %e, "Failed to expire bookings");
                0
            }
        }
    }

    /// Sweep on every interval until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting booking reaper");

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Booking reaper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use hatchway_core::HatcheryId;
    use hatchway_core::hatchery::Hatchery;
    use hatchway_core::job::NewJob;
    use hatchway_core::run::{NewNodeRun, NewWorkflowRun};
    use hatchway_db::{JobRepo, MemoryRepo, RunRepo};

    use crate::intake::JobIntake;
    use crate::runs::RunStatusUpdater;

    async fn setup() -> (Arc<MemoryRepo>, Arc<BookingBroker>, JobIntake, hatchway_core::NodeRunId) {
        let repo = Arc::new(MemoryRepo::new());
        let updater = Arc::new(RunStatusUpdater::new(repo.clone(), repo.clone()));
        let broker = Arc::new(BookingBroker::new(
            repo.clone(),
            repo.clone(),
            updater.clone(),
            Duration::from_secs(30),
        ));
        let intake = JobIntake::new(repo.clone(), updater);
        let wr = repo
            .insert_workflow_run(NewWorkflowRun {
                name: "w".to_string(),
                number: 1,
            })
            .await
            .unwrap();
        let nr = repo
            .insert_node_run(NewNodeRun {
                workflow_run_id: wr.id,
                name: "n".to_string(),
                parents: vec![],
                build_parameters: vec![],
            })
            .await
            .unwrap();
        (repo, broker, intake, nr.id)
    }

    fn hatchery() -> Hatchery {
        Hatchery {
            id: HatcheryId::new(1),
            uid: "uid".to_string(),
            name: "local".to_string(),
            model_type: "docker".to_string(),
            is_shared_infra: true,
            ratio_service: 0,
            capabilities: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_tick_releases_stale_bookings() {
        let (repo, broker, intake, nr) = setup().await;
        let job = intake
            .enqueue(NewJob {
                node_run_id: nr,
                requirement_templates: vec![],
            })
            .await
            .unwrap();
        broker.book(job.id, &hatchery()).await.unwrap();

        let reaper = BookingReaper::new(broker, Duration::from_secs(1));
        assert_eq!(reaper.tick(Utc::now()).await, 0);
        assert_eq!(reaper.tick(Utc::now() + TimeDelta::seconds(31)).await, 1);
        assert!(repo.load_job(job.id).await.unwrap().booked_by.is_none());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_repo, broker, _intake, _nr) = setup().await;
        let reaper = BookingReaper::new(broker, Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { reaper.run(rx).await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
