//! Ferrogram runtime: configuration, logging and lifecycle supervision.
//!
//! The [`Supervisor`] ties the pieces together. At start it discovers the
//! registered handler sets, freezes them into a registry, builds a router
//! and subscribes it to a transport; at stop it closes the gate, drops
//! pending updates and cancels in-flight handlers.
//!
//! ```ignore
//! use ferrogram_runtime::Supervisor;
//! use ferrogram_transport::LocalTransport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let supervisor = Supervisor::builder()
//!         .connect::<LocalTransport>()
//!         .container(container)
//!         .handlers::<Greeter>()
//!         .build()?;
//!
//!     // Runs until Ctrl+C or SIGTERM
//!     supervisor.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! Configuration is read from `ferrogram.toml` (or `config.toml`), with
//! `FERROGRAM_`-prefixed environment variables layered on top; see
//! [`config::ConfigLoader`].

pub mod config;
pub mod error;
pub mod logging;
pub mod supervisor;

// Re-exports
pub use config::{
    BotConfig, ConfigError, ConfigLoader, ConfigResult, FerrogramConfig, LoggingConfig, Profile,
    ReceiverConfig,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use supervisor::{Supervisor, SupervisorBuilder, SupervisorState};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
