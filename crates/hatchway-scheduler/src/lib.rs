//! Job scheduling for Hatchway.
//!
//! Resolves job requirements, brokers exclusive bookings between hatcheries,
//! expires stale bookings and rolls job outcomes up into run statuses.

pub mod aggregate;
pub mod broker;
pub mod intake;
pub mod queue;
pub mod reaper;
pub mod requirements;
pub mod runs;

#[cfg(test)]
mod testing;

pub use aggregate::{StatusCounter, aggregate};
pub use broker::{BookingBroker, Completion};
pub use intake::JobIntake;
pub use queue::{QueueEntry, QueueView, StatusFilter, WorkerCount};
pub use reaper::BookingReaper;
pub use requirements::{Resolution, ResolutionErrors, project_requirements, resolve_requirements};
pub use runs::{RunStatusUpdater, RunStatuses};
