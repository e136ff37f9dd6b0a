//! System configuration parsing.
//!
//! ```kdl
//! server listen="0.0.0.0:3000"
//! store "postgres" url="postgres://hatchway@localhost/hatchway" max-connections=10
//! booking grace-period-secs=120 reap-interval-secs=10
//! ```
//!
//! Every node is optional.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// System-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub booking: BookingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Backing store for jobs and runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreConfig {
    /// Process-local store; state is lost on restart.
    #[default]
    Memory,
    Postgres { url: String, max_connections: u32 },
}

/// Booking timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfig {
    /// How long a hatchery may hold a booking without starting a worker.
    pub grace_period: Duration,
    /// How often stale bookings are swept.
    pub reap_interval: Duration,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(120),
            reap_interval: Duration::from_secs(10),
        }
    }
}

/// Pool size when the configuration does not set one.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = SystemConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "server" => {
                if let Some(listen) = get_string_prop(node, "listen") {
                    config.server.listen = listen;
                }
            }
            "store" => {
                config.store = parse_store(node)?;
            }
            "booking" => {
                if let Some(secs) = get_secs_prop(node, "grace-period-secs")? {
                    config.booking.grace_period = secs;
                }
                if let Some(secs) = get_secs_prop(node, "reap-interval-secs")? {
                    config.booking.reap_interval = secs;
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

/// Read and parse a configuration file.
pub fn load_system_config(path: &Path) -> ConfigResult<SystemConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_system_config(&content)
}

fn parse_store(node: &KdlNode) -> ConfigResult<StoreConfig> {
    let backend = get_first_string_arg(node).unwrap_or_else(|| "memory".to_string());

    match backend.as_str() {
        "memory" => Ok(StoreConfig::Memory),
        "postgres" => {
            let url = get_string_prop(node, "url")
                .ok_or_else(|| ConfigError::MissingField("store url".to_string()))?;
            let max_connections = match get_integer_prop(node, "max-connections")? {
                Some(n) => u32::try_from(n).map_err(|_| ConfigError::InvalidValue {
                    field: "max-connections".to_string(),
                    message: format!("{n} is out of range"),
                })?,
                None => DEFAULT_MAX_CONNECTIONS,
            };
            Ok(StoreConfig::Postgres {
                url,
                max_connections,
            })
        }
        _ => Err(ConfigError::InvalidValue {
            field: "store".to_string(),
            message: format!("unknown store backend: {}", backend),
        }),
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

fn get_integer_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<i128>> {
    match node.get(name) {
        None => Ok(None),
        Some(v) => v
            .as_integer()
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: name.to_string(),
                message: format!("expected an integer, got {:?}", v),
            }),
    }
}

/// Longest duration a `*-secs` property may hold: 30 days.
const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

fn get_secs_prop(node: &KdlNode, name: &str) -> ConfigResult<Option<Duration>> {
    let Some(n) = get_integer_prop(node, name)? else {
        return Ok(None);
    };
    let secs = u64::try_from(n).map_err(|_| ConfigError::InvalidValue {
        field: name.to_string(),
        message: format!("{n} is not a valid number of seconds"),
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            field: name.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::InvalidValue {
            field: name.to_string(),
            message: format!("{secs} exceeds the maximum of {MAX_DURATION_SECS} seconds"),
        });
    }
    Ok(Some(Duration::from_secs(secs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_system_config("").unwrap();
        assert_eq!(config, SystemConfig::default());
        assert_eq!(config.booking.grace_period, Duration::from_secs(120));
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            server listen="127.0.0.1:8080"
            store "postgres" url="postgres://localhost/hatchway" max-connections=4
            booking grace-period-secs=30 reap-interval-secs=5
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8080");
        assert_eq!(
            config.store,
            StoreConfig::Postgres {
                url: "postgres://localhost/hatchway".to_string(),
                max_connections: 4,
            }
        );
        assert_eq!(config.booking.grace_period, Duration::from_secs(30));
        assert_eq!(config.booking.reap_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_postgres_requires_url() {
        let result = parse_system_config(r#"store "postgres""#);
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_unknown_backend() {
        let result = parse_system_config(r#"store "redis""#);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_rejects_zero_and_negative_durations() {
        assert!(parse_system_config("booking grace-period-secs=0").is_err());
        assert!(parse_system_config("booking reap-interval-secs=-3").is_err());
        assert!(parse_system_config(r#"booking grace-period-secs="soon""#).is_err());
    }

    #[test]
    fn test_rejects_durations_over_the_cap() {
        let result = parse_system_config("booking grace-period-secs=10000000000000");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { field, .. } if field == "grace-period-secs"
        ));

        let config = parse_system_config("booking grace-period-secs=2592000").unwrap();
        assert_eq!(config.booking.grace_period, Duration::from_secs(2_592_000));
    }

    #[test]
    fn test_parse_error() {
        let result = parse_system_config("server {");
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }
}
