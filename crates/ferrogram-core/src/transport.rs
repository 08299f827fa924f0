//! Transport collaborator abstractions.
//!
//! A [`Transport`] delivers update envelopes from the gateway (long polling,
//! webhook, or an in-process feed) to an [`UpdateHandler`], and exposes the
//! [`Client`](crate::Client) handlers use to reply.
//!
//! ```text
//! Gateway ──▶ Transport ──handle_update──▶ UpdateHandler (router)
//!                 │      ──handle_error───▶ UpdateHandler (reporter)
//!                 └──── client() ─────────▶ handlers send replies
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::client::BoxedClient;
use crate::error::{TransportError, TransportResult};
use crate::types::Update;

/// Options forwarded to the transport when receiving starts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverOptions {
    /// Maximum number of updates fetched per request.
    pub limit: Option<u8>,
    /// Long-poll timeout.
    pub timeout: Duration,
    /// Update slot names to receive; empty means all.
    pub allowed_updates: Vec<String>,
    /// Discard updates queued before receiving starts.
    pub drop_pending_on_start: bool,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            limit: None,
            timeout: Duration::from_secs(30),
            allowed_updates: Vec::new(),
            drop_pending_on_start: false,
        }
    }
}

impl ReceiverOptions {
    /// Returns true if `update` passes the `allowed_updates` filter.
    pub fn allows(&self, update: &Update) -> bool {
        self.allowed_updates.is_empty()
            || self
                .allowed_updates
                .iter()
                .any(|name| name == update.slot_name())
    }
}

/// Callbacks a transport invokes while receiving.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    /// Called once per received envelope.
    ///
    /// The transport awaits this before delivering the next envelope unless
    /// it explicitly runs deliveries concurrently.
    async fn handle_update(&self, client: BoxedClient, update: Update, cancel: CancellationToken);

    /// Called when receiving fails (network errors, undecodable envelopes).
    async fn handle_error(
        &self,
        client: BoxedClient,
        error: TransportError,
        cancel: CancellationToken,
    );
}

/// The transport collaborator.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the client handle shared with handlers.
    fn client(&self) -> BoxedClient;

    /// Starts delivering updates to `handler` in the background.
    ///
    /// Returns once receiving is set up. Delivery stops when `cancel` fires.
    async fn start_receiving(
        &self,
        handler: Arc<dyn UpdateHandler>,
        options: ReceiverOptions,
        cancel: CancellationToken,
    ) -> TransportResult<()>;

    /// Discards updates the gateway has queued but not yet delivered.
    async fn drop_pending_updates(&self, cancel: CancellationToken) -> TransportResult<()>;
}

/// A shared transport trait object.
pub type BoxedTransport = Arc<dyn Transport>;

/// A transport that can be created from the runtime configuration.
pub trait ConfigurableTransport: Transport {
    /// The transport-specific configuration section.
    type Config: DeserializeOwned + Default;

    /// Returns the transport name used as the config key.
    fn name() -> &'static str
    where
        Self: Sized;

    /// Creates a transport from the gateway token and its config section.
    fn from_config(token: &str, config: Self::Config) -> TransportResult<Self>
    where
        Self: Sized;
}
