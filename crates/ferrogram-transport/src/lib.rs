//! # Ferrogram Transport
//!
//! Concrete [`Transport`](ferrogram_core::Transport) implementations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  ferrogram-runtime  │  (supervisor subscribes a router)
//! ├─────────────────────┤
//! │  ferrogram-core     │  (Transport / UpdateHandler traits)
//! ├─────────────────────┤
//! │  ferrogram-transport│  <- This crate (implementations)
//! └─────────────────────┘
//! ```
//!
//! | Transport        | Config key | Use Case                               |
//! |------------------|------------|----------------------------------------|
//! | [`LocalTransport`] | `local`  | In-process feed for tests, demos, replay |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ferrogram_transport::{LocalConfig, LocalTransport};
//!
//! let transport = LocalTransport::new("my-bot", LocalConfig::default());
//! let feeder = transport.feeder();
//! feeder.push_text(42, "/start")?;
//! ```

pub mod local;

pub use local::{ApiCall, LocalClient, LocalConfig, LocalTransport, UpdateFeeder};
