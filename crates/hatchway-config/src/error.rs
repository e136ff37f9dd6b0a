//! Configuration and interpolation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Failure to substitute a placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterpolationError {
    #[error("unresolved variable ${{{name}}} in {input:?}")]
    Unresolved { name: String, input: String },

    #[error("malformed placeholder {placeholder:?} in {input:?}")]
    Malformed { placeholder: String, input: String },
}
