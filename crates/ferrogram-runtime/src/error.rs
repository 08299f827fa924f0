//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::supervisor::SupervisorState;
use ferrogram_core::TransportError;
use ferrogram_framework::DiscoveryFailed;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The operation is not valid in the supervisor's current state.
    #[error("cannot {operation} a supervisor in state {state}")]
    InvalidState {
        operation: &'static str,
        state: SupervisorState,
    },

    /// Handler discovery failed; nothing was started.
    #[error(transparent)]
    Discovery(#[from] DiscoveryFailed),

    /// Startup was cancelled before the supervisor began receiving.
    #[error("startup cancelled")]
    Cancelled,

    /// The transport failed to start.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The builder was not given a transport.
    #[error("no transport configured")]
    MissingTransport,
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
