//! # Ferrogram Core
//!
//! The core types of the ferrogram update-routing framework.
//!
//! This crate holds everything the routing layer and the transports agree
//! on:
//!
//! - **Data model**: gateway envelopes and their slots ([`Update`], [`Message`],
//!   [`CallbackQuery`], [`InlineQuery`], [`PreCheckoutQuery`])
//! - **Classification**: the closed [`UpdateKind`] set and the typed
//!   [`Payload`] of a classified envelope
//! - **Collaborators**: the [`Client`] handle handlers reply through and the
//!   [`Transport`] / [`UpdateHandler`] pair that delivers envelopes
//! - **Reporting**: the process-wide [`ErrorReporter`] hook
//!
//! ## Data Flow
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌───────────┐
//! │  Transport  │────▶│   Router   │────▶│  Handler  │
//! │  (gateway)  │     │ (classify) │────▶│  Handler  │
//! └─────────────┘     └────────────┘     └───────────┘
//!        ▲                  │ failures
//!        │ replies          ▼
//!     Client          ErrorReporter
//! ```

pub mod client;
pub mod error;
pub mod kind;
pub mod report;
pub mod transport;
pub mod types;

pub use client::{BoxedClient, Client};
pub use error::{ApiError, ApiResult, BoxError, TransportError, TransportResult};
pub use kind::{Payload, UnknownKind, UpdateKind};
pub use report::{BoxedReporter, ErrorReporter, FnReporter, LogReporter, ReportedError, reporter_fn};
pub use transport::{
    BoxedTransport, ConfigurableTransport, ReceiverOptions, Transport, UpdateHandler,
};
pub use types::{CallbackQuery, Chat, InlineQuery, Message, PreCheckoutQuery, Update, User};

/// Cancellation signal threaded through every handler invocation.
pub use tokio_util::sync::CancellationToken;
