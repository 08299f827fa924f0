//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ConfigError, ConfigResult};
use ferrogram_core::ReceiverOptions;
use ferrogram_framework::RouterOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FerrogramConfig {
    /// Gateway credentials.
    pub bot: BotConfig,

    /// Options forwarded to the transport's receiver.
    pub receiver: ReceiverConfig,

    /// Routing behaviour.
    pub routing: RouterOptions,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Transport-specific sections, keyed by transport name.
    pub transports: HashMap<String, Value>,
}

impl FerrogramConfig {
    /// Deserializes the section for the transport `name`.
    ///
    /// Returns `Ok(None)` when no section exists.
    pub fn transport_section<T: DeserializeOwned>(&self, name: &str) -> ConfigResult<Option<T>> {
        self.transports
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    ConfigError::InvalidTransportSection {
                        transport: name.to_string(),
                        reason: e.to_string(),
                    }
                })
            })
            .transpose()
    }
}

// =============================================================================
// Bot / receiver
// =============================================================================

/// Gateway credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Gateway token, `<bot id>:<secret>`.
    pub token: String,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("BotConfig").field("token", &token).finish()
    }
}

/// Receiver options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Updates fetched per request (1-100); unset lets the transport decide.
    pub limit: Option<u8>,

    /// Long-poll timeout in seconds.
    pub timeout_secs: u64,

    /// Update slot names to receive; empty receives everything.
    pub allowed_updates: Vec<String>,

    /// Discard updates queued while the bot was offline.
    pub drop_pending_on_start: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            limit: None,
            timeout_secs: 30,
            allowed_updates: Vec::new(),
            drop_pending_on_start: false,
        }
    }
}

impl ReceiverConfig {
    pub fn to_options(&self) -> ReceiverOptions {
        ReceiverOptions {
            limit: self.limit,
            timeout: Duration::from_secs(self.timeout_secs),
            allowed_updates: self.allowed_updates.clone(),
            drop_pending_on_start: self.drop_pending_on_start,
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file, required when `output = "file"`.
    pub file_path: Option<PathBuf>,
    pub thread_ids: bool,
    /// Include source file and line.
    pub file_location: bool,
    pub span_events: SpanEventConfig,
    /// Per-module level overrides, e.g. `ferrogram_framework = "debug"`.
    pub filters: HashMap<String, LogLevel>,
}
