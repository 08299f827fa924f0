//! In-process transport.
//!
//! [`LocalTransport`] stands in for a gateway connection: updates are pushed
//! through an [`UpdateFeeder`] into a pending queue and delivered to the
//! subscriber in fetch batches, exactly like a long-polling receiver would
//! deliver them. Replies sent through the [`LocalClient`] are recorded in an
//! outbox instead of leaving the process.
//!
//! ```text
//! UpdateFeeder ──push──▶ pending queue ──fetch(limit)──▶ receive loop ──▶ UpdateHandler
//!                              ▲                                         │
//!                   drop_pending_updates                      LocalClient outbox
//! ```

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing::{debug, info, trace, warn};

use ferrogram_core::{
    ApiError, ApiResult, BoxedClient, CancellationToken, Client, ConfigurableTransport, Message,
    ReceiverOptions, Transport, TransportError, TransportResult, Update, UpdateHandler,
};

/// Upper bound of a single fetch when no limit is configured.
const DEFAULT_FETCH_LIMIT: usize = 100;

/// Configuration section of the local transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Maximum number of pending updates.
    pub capacity: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

enum Feed {
    Update(Update),
    Error(TransportError),
}

struct Shared {
    pending: Mutex<VecDeque<Feed>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn push(&self, feed: Feed) -> TransportResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.capacity {
                return Err(TransportError::Gateway {
                    code: 429,
                    description: format!("pending queue is full ({} updates)", self.capacity),
                });
            }
            pending.push_back(feed);
        }
        self.notify.notify_one();
        Ok(())
    }

    fn fetch(&self, limit: usize) -> Vec<Feed> {
        let mut pending = self.pending.lock();
        let n = limit.min(pending.len());
        pending.drain(..n).collect()
    }

    fn clear(&self) -> usize {
        let mut pending = self.pending.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }
}

// =============================================================================
// UpdateFeeder
// =============================================================================

/// The producing side of a [`LocalTransport`].
#[derive(Clone)]
pub struct UpdateFeeder {
    shared: Arc<Shared>,
    next_id: Arc<AtomicI64>,
}

impl UpdateFeeder {
    /// Queues an update.
    pub fn push(&self, update: Update) -> TransportResult<()> {
        self.next_id
            .fetch_max(update.update_id + 1, Ordering::Relaxed);
        self.shared.push(Feed::Update(update))
    }

    /// Queues a message update with the next free update id.
    pub fn push_text(&self, chat_id: i64, text: &str) -> TransportResult<i64> {
        let update_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared.push(Feed::Update(Update {
            update_id,
            message: Some(Message::text(chat_id, text)),
            ..Default::default()
        }))?;
        Ok(update_id)
    }

    /// Decodes and queues a raw JSON envelope.
    ///
    /// An undecodable envelope is queued as a decode error, so the subscriber
    /// sees it in order with the updates around it.
    pub fn push_json(&self, data: &[u8]) -> TransportResult<()> {
        match Update::from_json(data) {
            Ok(update) => self.push(update),
            Err(e) => self.shared.push(Feed::Error(e.into())),
        }
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: TransportError) -> TransportResult<()> {
        self.shared.push(Feed::Error(error))
    }

    /// Stops accepting updates.
    ///
    /// The receive loop delivers what is still queued and then exits.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.notify.notify_one();
    }

    /// Returns the number of queued, undelivered items.
    pub fn pending(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

// =============================================================================
// LocalClient
// =============================================================================

/// One recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    pub method: String,
    pub params: Value,
}

/// A client that records every call in an outbox.
pub struct LocalClient {
    id: String,
    outbox: Mutex<Vec<ApiCall>>,
    next_message_id: AtomicI64,
    connected: AtomicBool,
}

impl LocalClient {
    fn new(id: String) -> Self {
        Self {
            id,
            outbox: Mutex::new(Vec::new()),
            next_message_id: AtomicI64::new(1),
            connected: AtomicBool::new(true),
        }
    }

    /// Returns every call made so far.
    pub fn sent(&self) -> Vec<ApiCall> {
        self.outbox.lock().clone()
    }

    /// Removes and returns every call made so far.
    pub fn take_sent(&self) -> Vec<ApiCall> {
        std::mem::take(&mut *self.outbox.lock())
    }

    /// Makes further calls fail with [`ApiError::NotConnected`].
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
    }
}

#[async_trait]
impl Client for LocalClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call_api(&self, method: &str, params: Value) -> ApiResult<Value> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(ApiError::NotConnected);
        }
        trace!(method, "Recording API call");

        let result = match method {
            "sendMessage" => {
                let chat_id = params["chat_id"].as_i64().unwrap_or_default();
                let text = params["text"].as_str().unwrap_or_default();
                let mut message = Message::text(chat_id, text);
                message.message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
                serde_json::to_value(message)?
            }
            _ => json!(true),
        };

        self.outbox.lock().push(ApiCall {
            method: method.to_string(),
            params,
        });
        Ok(result)
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// =============================================================================
// LocalTransport
// =============================================================================

/// An in-process [`Transport`].
pub struct LocalTransport {
    shared: Arc<Shared>,
    feeder: UpdateFeeder,
    client: Arc<LocalClient>,
    receiving: Arc<AtomicBool>,
    finished: CancellationToken,
}

impl LocalTransport {
    /// Creates a transport for the bot `id` with the given configuration.
    pub fn new(id: impl Into<String>, config: LocalConfig) -> Self {
        let shared = Arc::new(Shared {
            pending: Mutex::new(VecDeque::new()),
            capacity: config.capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });
        let feeder = UpdateFeeder {
            shared: Arc::clone(&shared),
            next_id: Arc::new(AtomicI64::new(1)),
        };
        Self {
            shared,
            feeder,
            client: Arc::new(LocalClient::new(id.into())),
            receiving: Arc::new(AtomicBool::new(false)),
            finished: CancellationToken::new(),
        }
    }

    /// Returns a handle for pushing updates.
    pub fn feeder(&self) -> UpdateFeeder {
        self.feeder.clone()
    }

    /// Returns the concrete client, for inspecting the outbox.
    pub fn local_client(&self) -> Arc<LocalClient> {
        Arc::clone(&self.client)
    }

    /// Returns a token cancelled when the receive loop exits.
    pub fn finished(&self) -> CancellationToken {
        self.finished.clone()
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving.load(Ordering::Acquire)
    }
}

/// Derives the bot id from a gateway token of the form `<id>:<secret>`.
fn bot_id(token: &str) -> &str {
    token.split_once(':').map_or(token, |(id, _)| id)
}

#[async_trait]
impl Transport for LocalTransport {
    fn client(&self) -> BoxedClient {
        self.client.clone()
    }

    async fn start_receiving(
        &self,
        handler: Arc<dyn UpdateHandler>,
        options: ReceiverOptions,
        cancel: CancellationToken,
    ) -> TransportResult<()> {
        if self.receiving.swap(true, Ordering::AcqRel) {
            return Err(TransportError::AlreadyReceiving);
        }
        if options.drop_pending_on_start {
            let dropped = self.shared.clear();
            debug!(dropped, "Dropped pending updates before receiving");
        }

        info!(bot = %self.client.id, "Local transport receiving");
        let receiver = Receiver {
            shared: Arc::clone(&self.shared),
            client: self.client(),
            handler,
            options,
            cancel,
        };
        let receiving = Arc::clone(&self.receiving);
        let finished = self.finished.clone();
        tokio::spawn(async move {
            receiver.run().await;
            receiving.store(false, Ordering::Release);
            finished.cancel();
        });
        Ok(())
    }

    async fn drop_pending_updates(&self, _cancel: CancellationToken) -> TransportResult<()> {
        let dropped = self.shared.clear();
        debug!(dropped, "Dropped pending updates");
        Ok(())
    }
}

impl ConfigurableTransport for LocalTransport {
    type Config = LocalConfig;

    fn name() -> &'static str {
        "local"
    }

    fn from_config(token: &str, config: Self::Config) -> TransportResult<Self> {
        if config.capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "local transport capacity must be positive".to_string(),
            ));
        }
        Ok(Self::new(bot_id(token), config))
    }
}

/// The receive loop of one `start_receiving` call.
struct Receiver {
    shared: Arc<Shared>,
    client: BoxedClient,
    handler: Arc<dyn UpdateHandler>,
    options: ReceiverOptions,
    cancel: CancellationToken,
}

impl Receiver {
    async fn run(self) {
        let limit = self
            .options
            .limit
            .map_or(DEFAULT_FETCH_LIMIT, usize::from)
            .max(1);

        while !self.cancel.is_cancelled() {
            let batch = self.shared.fetch(limit);
            if batch.is_empty() {
                if self.shared.closed.load(Ordering::Acquire) {
                    info!("Update feed closed");
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.shared.notify.notified() => {}
                    _ = tokio::time::sleep(self.options.timeout) => {
                        trace!("Poll timeout, no updates");
                    }
                }
                continue;
            }

            trace!(count = batch.len(), "Fetched updates");
            for feed in batch {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.deliver(feed).await;
            }
        }
        debug!("Receive loop stopped");
    }

    async fn deliver(&self, feed: Feed) {
        match feed {
            Feed::Update(update) if self.options.allows(&update) => {
                self.handler
                    .handle_update(self.client.clone(), update, self.cancel.clone())
                    .await;
            }
            Feed::Update(update) => {
                trace!(
                    update_id = update.update_id,
                    slot = update.slot_name(),
                    "Update not in allowed_updates - skipped"
                );
            }
            Feed::Error(error) => {
                warn!(error = %error, "Transport error");
                self.handler
                    .handle_error(self.client.clone(), error, self.cancel.clone())
                    .await;
            }
        }
    }
}
