//! # Ferrogram
//!
//! Update routing for bots behind a messaging gateway.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  Update   ┌────────┐  resolve  ┌──────────┐
//! │ Transport │──────────▶│ Router │──────────▶│ Registry │
//! └───────────┘           └────────┘           └──────────┘
//!       ▲                      │ invoke              ▲
//!       │ start / stop         ▼                     │ discovery
//! ┌────────────┐        handler methods        ┌────────────┐
//! │ Supervisor │──────────────────────────────▶│ Discoverer │
//! └────────────┘                               └────────────┘
//! ```
//!
//! - **Transport**: delivers updates and owns the API client
//! - **Registry**: frozen handler tables keyed by update kind
//! - **Discoverer**: turns declared handler sets into registrations
//! - **Router**: classifies each update and invokes its handlers
//! - **Supervisor**: starts and stops the whole thing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrogram::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! impl Greeter {
//!     async fn start(
//!         self: Arc<Self>,
//!         client: BoxedClient,
//!         message: Message,
//!         _cancel: CancellationToken,
//!     ) -> ApiResult<()> {
//!         client.send_message(message.chat.id, "hello").await?;
//!         Ok(())
//!     }
//! }
//!
//! impl HandlerSet for Greeter {
//!     fn declare(decl: &mut Declarations<Self>) {
//!         decl.command("/start", Self::start);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut container = Container::new();
//!     container.register_default::<Greeter>();
//!
//!     Supervisor::builder()
//!         .connect::<LocalTransport>()
//!         .container(container)
//!         .handlers::<Greeter>()
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use ferrogram_core as core;
pub use ferrogram_framework as framework;
pub use ferrogram_runtime as runtime;
pub use ferrogram_transport as transport;

/// Commonly used types for writing handler sets and wiring a bot.
pub mod prelude {
    // Lifecycle
    pub use ferrogram_runtime::{Supervisor, SupervisorState};

    // Declaring handlers
    pub use ferrogram_framework::{Container, Declarations, HandlerSet};

    // Update model
    pub use ferrogram_core::{
        CallbackQuery, Chat, InlineQuery, Message, Payload, PreCheckoutQuery, Update, UpdateKind,
        User,
    };

    // Client and cancellation
    pub use ferrogram_core::{ApiError, ApiResult, BoxedClient, CancellationToken, Client};

    pub use ferrogram_transport::LocalTransport;

    pub use ferrogram_runtime::prelude::*;
}
