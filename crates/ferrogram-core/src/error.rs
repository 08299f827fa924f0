//! Unified error types for the ferrogram core.
//!
//! Framework-level errors (registration, discovery, handler failures) are
//! defined in `ferrogram-framework`.

use thiserror::Error;

/// Boxed error type returned by user handlers and reporting hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors raised by a transport collaborator.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection to the gateway failed.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// Reason for failure.
        reason: String,
    },

    /// The transport is already receiving updates.
    #[error("transport is already receiving")]
    AlreadyReceiving,

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,

    /// The gateway rejected a request.
    #[error("gateway error ({code}): {description}")]
    Gateway {
        /// Gateway error code.
        code: i64,
        /// Human-readable description.
        description: String,
    },

    /// An envelope could not be decoded.
    #[error("failed to decode update: {0}")]
    Decode(String),

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for client API calls made by handlers.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The client is not connected.
    #[error("client is not connected")]
    NotConnected,
    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,
    /// The gateway answered with an error.
    #[error("API error ({code}): {description}")]
    Rejected { code: i64, description: String },
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
