//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested file does not exist.
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension is unknown or its format feature is disabled.
    #[error("unsupported config file format: {0}")]
    UnsupportedFormat(PathBuf),

    /// The merged sources could not be extracted into [`FerrogramConfig`](super::FerrogramConfig).
    #[error("failed to extract config: {0}")]
    Extract(#[from] figment::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("missing config field: {0}")]
    MissingField(&'static str),

    /// A `transports.<name>` section does not match the transport's config type.
    #[error("invalid section for transport '{transport}': {reason}")]
    InvalidTransportSection { transport: String, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
