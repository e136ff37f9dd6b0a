//! Core domain types for the Hatchway job scheduler.
//!
//! This crate contains:
//! - Resource identifiers
//! - The shared status enumeration
//! - Jobs, their booking phases and transitions
//! - Requirements and parameters
//! - Hatchery profiles
//! - Workflow and node runs

pub mod error;
pub mod hatchery;
pub mod id;
pub mod job;
pub mod parameter;
pub mod requirement;
pub mod run;
pub mod status;

pub use error::{Error, Result};
pub use id::{HatcheryId, JobId, NodeRunId, WorkflowRunId};
pub use job::JobPhase;
pub use status::Status;
