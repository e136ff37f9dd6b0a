//! Repository traits and implementations.

pub mod job;
pub mod memory;
pub mod run;

pub use job::{JobFilter, JobRepo, PgJobRepo};
pub use memory::MemoryRepo;
pub use run::{PgRunRepo, RunRepo};
