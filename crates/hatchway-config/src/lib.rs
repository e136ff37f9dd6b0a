//! Configuration for Hatchway.
//!
//! This crate handles:
//! - Build parameter interpolation (`${name}` placeholders)
//! - System configuration (KDL)

pub mod error;
pub mod system;
pub mod variables;

pub use error::{ConfigError, ConfigResult, InterpolationError};
pub use system::{
    BookingConfig, DEFAULT_MAX_CONNECTIONS, ServerConfig, StoreConfig, SystemConfig,
    load_system_config, parse_system_config,
};
pub use variables::ParameterContext;
