//! API server for Hatchway.
//!
//! Exposes the agent booking API, the queue monitoring API and run control
//! over HTTP.

pub mod error;
pub mod routes;
pub mod state;

pub use state::AppState;
