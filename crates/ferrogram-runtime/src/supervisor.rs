//! Lifecycle supervision.
//!
//! A [`Supervisor`] owns the startup and shutdown of the routing core:
//!
//! ```text
//!            start()                         stop()
//! Created ──────────▶ Starting ──▶ Running ──────────▶ Stopping ──▶ Stopped
//!    │                   │ discovery failed /                        ▲
//!    │                   └─ cancelled / transport error ─────────────┤
//!    └──────────────────────────── stop() ───────────────────────────┘
//! ```
//!
//! On start it runs handler discovery, freezes the registry, builds a
//! [`Router`] and subscribes it to the transport. On stop it closes the
//! delivery gate, asks the transport to drop pending updates and cancels the
//! lifetime token every in-flight handler observes.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use ferrogram_runtime::Supervisor;
//! use ferrogram_transport::LocalTransport;
//!
//! let mut container = Container::new();
//! container.register_default::<Greeter>();
//!
//! let supervisor = Supervisor::builder()
//!     .connect::<LocalTransport>()
//!     .container(container)
//!     .handlers::<Greeter>()
//!     .build()?;
//!
//! supervisor.run().await?;
//! ```

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, FerrogramConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use ferrogram_core::{
    BoxedClient, BoxedReporter, BoxedTransport, CancellationToken, ConfigurableTransport,
    LogReporter, ReportedError, TransportError, Update, UpdateHandler,
};
use ferrogram_framework::{
    Candidate, Construct, Container, Discoverer, DiscoverySummary, HandlerSet, Registry, Router,
    RouterOptions,
};

/// Lifecycle state of a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Gated subscriber
// =============================================================================

/// The [`UpdateHandler`] handed to the transport.
///
/// Drops updates once the gate is closed; transport errors go to the
/// reporter.
struct GatedRouter {
    router: Router,
    reporter: BoxedReporter,
    gate: Arc<AtomicBool>,
}

#[async_trait]
impl UpdateHandler for GatedRouter {
    async fn handle_update(&self, client: BoxedClient, update: Update, cancel: CancellationToken) {
        if !self.gate.load(Ordering::Acquire) {
            debug!(update_id = update.update_id, "Supervisor stopping, update ignored");
            return;
        }
        self.router.route(client, update, cancel).await;
    }

    async fn handle_error(
        &self,
        client: BoxedClient,
        error: TransportError,
        cancel: CancellationToken,
    ) {
        self.reporter
            .report(client, ReportedError::Transport(error), cancel)
            .await;
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Starts and stops the routing core around a transport.
pub struct Supervisor {
    config: FerrogramConfig,
    transport: BoxedTransport,
    construct: Arc<dyn Construct>,
    reporter: BoxedReporter,
    router_options: RouterOptions,
    discoverer: Mutex<Option<Discoverer>>,
    state: Mutex<SupervisorState>,
    gate: Arc<AtomicBool>,
    lifetime: Mutex<Option<CancellationToken>>,
    registry: Mutex<Option<Arc<Registry>>>,
    summary: Mutex<Option<DiscoverySummary>>,
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.lock()
    }

    pub fn config(&self) -> &FerrogramConfig {
        &self.config
    }

    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Returns the frozen registry once discovery has succeeded.
    pub fn registry(&self) -> Option<Arc<Registry>> {
        self.registry.lock().clone()
    }

    pub fn discovery_summary(&self) -> Option<DiscoverySummary> {
        self.summary.lock().clone()
    }

    fn set_state(&self, state: SupervisorState) {
        *self.state.lock() = state;
    }

    /// Discovers handlers and starts receiving.
    ///
    /// Valid only once, from [`SupervisorState::Created`]. On any failure the
    /// supervisor ends in [`SupervisorState::Stopped`] and the error is
    /// returned; cancelling `cancel` before receiving starts aborts startup.
    pub async fn start(&self, cancel: CancellationToken) -> RuntimeResult<()> {
        {
            let mut state = self.state.lock();
            if *state != SupervisorState::Created {
                return Err(RuntimeError::InvalidState {
                    operation: "start",
                    state: *state,
                });
            }
            *state = SupervisorState::Starting;
        }

        match self.start_inner(cancel).await {
            Ok(()) => {
                self.set_state(SupervisorState::Running);
                info!("Supervisor running");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Supervisor failed to start");
                self.gate.store(false, Ordering::Release);
                self.set_state(SupervisorState::Stopped);
                Err(e)
            }
        }
    }

    async fn start_inner(&self, cancel: CancellationToken) -> RuntimeResult<()> {
        let discoverer = self.discoverer.lock().take().unwrap_or_default();
        info!(
            candidates = discoverer.candidates().len(),
            "Discovering handlers"
        );

        let discovered = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
            result = discoverer.run(self.construct.as_ref()) => result?,
        };

        for skipped in &discovered.summary.skipped {
            self.reporter
                .report(
                    self.transport.client(),
                    ReportedError::Declaration(Box::new(skipped.clone())),
                    cancel.clone(),
                )
                .await;
        }

        let registry = Arc::new(discovered.registry);
        *self.registry.lock() = Some(Arc::clone(&registry));
        *self.summary.lock() = Some(discovered.summary);

        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let router = Router::new(registry)
            .with_reporter(Arc::clone(&self.reporter))
            .with_options(self.router_options);
        let subscriber = Arc::new(GatedRouter {
            router,
            reporter: Arc::clone(&self.reporter),
            gate: Arc::clone(&self.gate),
        });

        let lifetime = CancellationToken::new();
        self.gate.store(true, Ordering::Release);
        self.transport
            .start_receiving(subscriber, self.config.receiver.to_options(), lifetime.clone())
            .await?;
        *self.lifetime.lock() = Some(lifetime);
        Ok(())
    }

    /// Stops receiving.
    ///
    /// Updates arriving after this call are not routed. Failing to drop the
    /// transport's pending updates is logged and does not fail the stop.
    /// Stopping a supervisor that never started, or stopping twice, is a
    /// no-op apart from reaching [`SupervisorState::Stopped`].
    pub async fn stop(&self, cancel: CancellationToken) -> RuntimeResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                SupervisorState::Created => {
                    *state = SupervisorState::Stopped;
                    return Ok(());
                }
                SupervisorState::Stopping | SupervisorState::Stopped => return Ok(()),
                SupervisorState::Starting => {
                    return Err(RuntimeError::InvalidState {
                        operation: "stop",
                        state: *state,
                    });
                }
                SupervisorState::Running => *state = SupervisorState::Stopping,
            }
        }

        info!("Stopping supervisor");
        self.gate.store(false, Ordering::Release);

        if let Err(e) = self.transport.drop_pending_updates(cancel).await {
            warn!(error = %e, "Failed to drop pending updates");
        }

        let lifetime = self.lifetime.lock().take();
        if let Some(lifetime) = lifetime {
            lifetime.cancel();
        }

        self.set_state(SupervisorState::Stopped);
        info!("Supervisor stopped");
        Ok(())
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Starts, waits for `shutdown`, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start(CancellationToken::new()).await?;
        info!("Ferrogram is now running");
        shutdown.await;
        self.stop(CancellationToken::new()).await
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C, shutting down");
        return;
    }
    info!("Received Ctrl+C, shutting down");
}

// =============================================================================
// SupervisorBuilder
// =============================================================================

type TransportFactory = Box<dyn FnOnce(&FerrogramConfig) -> RuntimeResult<BoxedTransport> + Send>;

/// Builder for a [`Supervisor`].
pub struct SupervisorBuilder {
    config_loader: ConfigLoader,
    config: Option<FerrogramConfig>,
    transport: Option<TransportFactory>,
    construct: Option<Arc<dyn Construct>>,
    discoverer: Discoverer,
    reporter: Option<BoxedReporter>,
    router_options: Option<RouterOptions>,
    init_logging: bool,
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            config: None,
            transport: None,
            construct: None,
            discoverer: Discoverer::new(),
            reporter: None,
            router_options: None,
            init_logging: true,
        }
    }

    /// Loads configuration from this file instead of searching.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Overrides loaded values; see [`ConfigLoader::merge`].
    pub fn merge<T: Serialize>(mut self, overrides: T) -> Self {
        self.config_loader = self.config_loader.merge(overrides);
        self
    }

    /// Overrides one dotted config key; see [`ConfigLoader::set`].
    pub fn set<T: Serialize>(mut self, key: &str, value: T) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Uses an already-loaded configuration; no files are read.
    pub fn config(mut self, config: FerrogramConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses an existing transport.
    pub fn transport(mut self, transport: BoxedTransport) -> Self {
        self.transport = Some(Box::new(
            move |_: &FerrogramConfig| -> RuntimeResult<BoxedTransport> { Ok(transport) },
        ));
        self
    }

    /// Creates the transport `T` from the configuration.
    ///
    /// Reads the section `transports.<T::name()>`, falling back to the
    /// default config when it is absent, and passes `bot.token` along.
    pub fn connect<T>(mut self) -> Self
    where
        T: ConfigurableTransport + 'static,
    {
        self.transport = Some(Box::new(|config: &FerrogramConfig| -> RuntimeResult<BoxedTransport> {
            let name = T::name();
            let section = match config.transport_section::<T::Config>(name)? {
                Some(section) => section,
                None => {
                    warn!(
                        transport = name,
                        "No configuration found for transport, using default"
                    );
                    T::Config::default()
                }
            };
            let transport = T::from_config(&config.bot.token, section)?;
            info!(transport = name, "Transport created");
            Ok(Arc::new(transport) as BoxedTransport)
        }));
        self
    }

    /// Sets the construction capability used during discovery.
    pub fn construct(mut self, construct: impl Construct + 'static) -> Self {
        self.construct = Some(Arc::new(construct));
        self
    }

    /// Uses a [`Container`] as the construction capability.
    pub fn container(self, container: Container) -> Self {
        self.construct(container)
    }

    /// Adds `H` to the discovery candidates.
    pub fn handlers<H: HandlerSet>(mut self) -> Self {
        self.discoverer = self.discoverer.with::<H>();
        self
    }

    pub fn candidate(mut self, candidate: Candidate) -> Self {
        self.discoverer = self.discoverer.candidate(candidate);
        self
    }

    /// Sets the process-wide error reporter (default: [`LogReporter`]).
    pub fn reporter(mut self, reporter: BoxedReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Overrides the `routing` configuration section.
    pub fn router_options(mut self, options: RouterOptions) -> Self {
        self.router_options = Some(options);
        self
    }

    /// Whether `build` installs the global log subscriber (default: true).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    pub fn build(self) -> RuntimeResult<Supervisor> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let transport = (self.transport.ok_or(RuntimeError::MissingTransport)?)(&config)?;
        let construct = self
            .construct
            .unwrap_or_else(|| Arc::new(Container::new()));
        let reporter = self.reporter.unwrap_or_else(|| Arc::new(LogReporter));
        let router_options = self.router_options.unwrap_or(config.routing);

        info!(
            log_level = %config.logging.level,
            candidates = self.discoverer.candidates().len(),
            "Supervisor created"
        );

        Ok(Supervisor {
            config,
            transport,
            construct,
            reporter,
            router_options,
            discoverer: Mutex::new(Some(self.discoverer)),
            state: Mutex::new(SupervisorState::Created),
            gate: Arc::new(AtomicBool::new(false)),
            lifetime: Mutex::new(None),
            registry: Mutex::new(None),
            summary: Mutex::new(None),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrogram_core::{ApiResult, CallbackQuery, InlineQuery, Message, reporter_fn};
    use ferrogram_framework::{Declarations, DiscoveryError};
    use ferrogram_transport::{LocalConfig, LocalTransport};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct Echo;

    impl Echo {
        async fn start(
            self: Arc<Self>,
            client: BoxedClient,
            message: Message,
            _cancel: CancellationToken,
        ) -> ApiResult<()> {
            client.send_message(message.chat.id, "welcome").await?;
            Ok(())
        }
    }

    impl HandlerSet for Echo {
        fn declare(decl: &mut Declarations<Self>) {
            decl.command("/start", Self::start);
        }
    }

    struct Clash;

    impl Clash {
        async fn start(self: Arc<Self>, _c: BoxedClient, _m: Message, _x: CancellationToken) {}
    }

    impl HandlerSet for Clash {
        fn declare(decl: &mut Declarations<Self>) {
            decl.command("/start", Self::start);
        }
    }

    /// Counts invocations and waits for cancellation.
    #[derive(Default)]
    struct Slow {
        seen: AtomicUsize,
        cancelled: AtomicBool,
    }

    impl Slow {
        async fn hold(self: Arc<Self>, _c: BoxedClient, _m: Message, cancel: CancellationToken) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                _ = cancel.cancelled() => self.cancelled.store(true, Ordering::SeqCst),
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            }
        }
    }

    impl HandlerSet for Slow {
        fn declare(decl: &mut Declarations<Self>) {
            decl.command("/slow", Self::hold);
        }
    }

    fn local() -> Arc<LocalTransport> {
        Arc::new(LocalTransport::new("test-bot", LocalConfig::default()))
    }

    fn builder(transport: &Arc<LocalTransport>) -> SupervisorBuilder {
        let mut container = Container::new();
        container.register_default::<Echo>();
        container.register_instance(Arc::new(Clash));

        Supervisor::builder()
            .config(FerrogramConfig::default())
            .init_logging(false)
            .transport(transport.clone())
            .container(container)
    }

    #[tokio::test]
    async fn test_start_routes_updates() {
        let transport = local();
        let feeder = transport.feeder();
        let supervisor = builder(&transport).handlers::<Echo>().build().unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Created);

        feeder.push_text(7, "/start").unwrap();
        feeder.push_text(7, "ignored").unwrap();
        feeder.close();

        supervisor.start(CancellationToken::new()).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Running);
        assert_eq!(supervisor.registry().unwrap().len(), 1);
        assert_eq!(supervisor.discovery_summary().unwrap().registered, 1);

        tokio::time::timeout(Duration::from_secs(1), transport.finished().cancelled())
            .await
            .unwrap();
        let sent = transport.local_client().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].params, json!({ "chat_id": 7, "text": "welcome" }));

        supervisor.stop(CancellationToken::new()).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn test_discovery_failure_stops() {
        let transport = local();
        let supervisor = builder(&transport)
            .handlers::<Echo>()
            .handlers::<Clash>()
            .build()
            .unwrap();

        let err = supervisor
            .start(CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            RuntimeError::Discovery(failed) => {
                assert_eq!(failed.errors.len(), 1);
                assert!(matches!(failed.errors[0], DiscoveryError::Registry { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(supervisor.registry().is_none());
        assert!(!transport.is_receiving());
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let transport = local();
        let supervisor = builder(&transport).handlers::<Echo>().build().unwrap();

        supervisor.start(CancellationToken::new()).await.unwrap();
        assert!(matches!(
            supervisor.start(CancellationToken::new()).await,
            Err(RuntimeError::InvalidState {
                operation: "start",
                state: SupervisorState::Running
            })
        ));

        supervisor.stop(CancellationToken::new()).await.unwrap();
        supervisor.stop(CancellationToken::new()).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(supervisor.start(CancellationToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let transport = local();
        let supervisor = builder(&transport).build().unwrap();
        supervisor.stop(CancellationToken::new()).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(!transport.is_receiving());
    }

    #[tokio::test]
    async fn test_cancelled_start() {
        let transport = local();
        let supervisor = builder(&transport).handlers::<Echo>().build().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(matches!(
            supervisor.start(cancel).await,
            Err(RuntimeError::Cancelled)
        ));
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
        assert!(!transport.is_receiving());
    }

    #[tokio::test]
    async fn test_stop_drops_pending_and_cancels_handlers() {
        let transport = local();
        let feeder = transport.feeder();
        let slow = Arc::new(Slow::default());

        let mut container = Container::new();
        container.register_instance(Arc::clone(&slow));
        let mut config = FerrogramConfig::default();
        config.receiver.limit = Some(1);

        let supervisor = Supervisor::builder()
            .config(config)
            .init_logging(false)
            .transport(transport.clone())
            .container(container)
            .handlers::<Slow>()
            .build()
            .unwrap();
        supervisor.start(CancellationToken::new()).await.unwrap();

        for _ in 0..3 {
            feeder.push_text(1, "/slow").unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slow.seen.load(Ordering::SeqCst), 1);

        supervisor.stop(CancellationToken::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), transport.finished().cancelled())
            .await
            .unwrap();

        assert_eq!(feeder.pending(), 0);
        assert_eq!(slow.seen.load(Ordering::SeqCst), 1);
        assert!(slow.cancelled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_transport_errors_are_reported() {
        let transport = local();
        let feeder = transport.feeder();
        let reports = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reports);
        let reporter = reporter_fn(move |_client, error, _cancel| {
            let c = Arc::clone(&counter);
            async move {
                if matches!(error, ReportedError::Transport(_)) {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let supervisor = builder(&transport)
            .reporter(reporter)
            .handlers::<Echo>()
            .build()
            .unwrap();
        feeder.push_json(b"{broken").unwrap();
        feeder.close();

        supervisor.start(CancellationToken::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), transport.finished().cancelled())
            .await
            .unwrap();
        assert_eq!(reports.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connect_reads_transport_section() {
        let mut config = FerrogramConfig::default();
        config.bot.token = "42:secret".to_string();
        config
            .transports
            .insert("local".to_string(), json!({ "capacity": 0 }));

        let result = Supervisor::builder()
            .config(config.clone())
            .init_logging(false)
            .connect::<LocalTransport>()
            .build();
        assert!(matches!(
            result,
            Err(RuntimeError::Transport(TransportError::InvalidConfig(_)))
        ));

        config
            .transports
            .insert("local".to_string(), json!({ "capacity": 4 }));
        let supervisor = Supervisor::builder()
            .config(config)
            .init_logging(false)
            .connect::<LocalTransport>()
            .build()
            .unwrap();
        assert_eq!(supervisor.transport().client().id(), "42");
    }

    #[test]
    fn test_missing_transport() {
        let result = Supervisor::builder()
            .config(FerrogramConfig::default())
            .init_logging(false)
            .build();
        assert!(matches!(result, Err(RuntimeError::MissingTransport)));
    }

    /// Records what each handler saw.
    #[derive(Default)]
    struct Scenarios {
        seen: parking_lot::Mutex<Vec<String>>,
    }

    impl Scenarios {
        async fn start(self: Arc<Self>, _c: BoxedClient, m: Message, _x: CancellationToken) {
            self.seen.lock().push(format!("start:{}", m.plain_text()));
        }

        async fn act(self: Arc<Self>, _c: BoxedClient, q: CallbackQuery, _x: CancellationToken) {
            self.seen.lock().push(format!("act:{}", q.data.unwrap_or_default()));
        }

        async fn first(
            self: Arc<Self>,
            _c: BoxedClient,
            u: Update,
            _x: CancellationToken,
        ) -> Result<(), std::io::Error> {
            self.seen.lock().push(format!("first:{}", u.update_id));
            Err(std::io::Error::other("first failed"))
        }

        async fn second(self: Arc<Self>, _c: BoxedClient, u: Update, _x: CancellationToken) {
            self.seen.lock().push(format!("second:{}", u.update_id));
        }
    }

    impl HandlerSet for Scenarios {
        fn declare(decl: &mut Declarations<Self>) {
            decl.command("/start", Self::start)
                .callback("act-", Self::act)
                .unmatched(Self::first)
                .unmatched(Self::second);
        }
    }

    #[tokio::test]
    async fn test_routing_scenarios_end_to_end() {
        let transport = local();
        let feeder = transport.feeder();
        let scenarios = Arc::new(Scenarios::default());
        let reports = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let reporter = reporter_fn(move |_client, error, _cancel| {
            let sink = Arc::clone(&sink);
            async move { sink.lock().push(error.to_string()) }
        });

        let mut container = Container::new();
        container.register_instance(Arc::clone(&scenarios));
        let supervisor = Supervisor::builder()
            .config(FerrogramConfig::default())
            .init_logging(false)
            .transport(transport.clone())
            .container(container)
            .reporter(reporter)
            .handlers::<Scenarios>()
            .build()
            .unwrap();

        let updates = [
            json!({ "update_id": 1, "message": {
                "message_id": 1, "date": 0, "chat": { "id": 9, "type": "private" },
                "text": "/start extra" } }),
            json!({ "update_id": 2, "callback_query": { "id": "q1", "data": "act-42" } }),
            json!({ "update_id": 3, "callback_query": { "id": "q2", "data": "xyz" } }),
            json!({ "update_id": 4, "pre_checkout_query": {
                "id": "pc", "currency": "EUR", "total_amount": 100 } }),
            json!({ "update_id": 5, "poll": { "id": "p1" } }),
        ];
        for update in &updates {
            feeder.push_json(update.to_string().as_bytes()).unwrap();
        }
        feeder.close();

        supervisor.start(CancellationToken::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), transport.finished().cancelled())
            .await
            .unwrap();

        assert_eq!(
            *scenarios.seen.lock(),
            vec!["start:/start extra", "act:act-42", "first:5", "second:5"]
        );
        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("first failed"));
    }

    struct Crooked;

    impl Crooked {
        async fn wrong(self: Arc<Self>, _c: BoxedClient, _q: InlineQuery, _x: CancellationToken) {}
    }

    impl HandlerSet for Crooked {
        fn declare(decl: &mut Declarations<Self>) {
            decl.command("/wrong", Self::wrong);
        }
    }

    #[tokio::test]
    async fn test_skipped_declarations_are_reported() {
        let transport = local();
        let reports = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reports);
        let reporter = reporter_fn(move |_client, error, _cancel| {
            let c = Arc::clone(&counter);
            async move {
                if matches!(error, ReportedError::Declaration(_)) {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let mut container = Container::new();
        container.register_instance(Arc::new(Crooked));
        let supervisor = Supervisor::builder()
            .config(FerrogramConfig::default())
            .init_logging(false)
            .transport(transport.clone())
            .container(container)
            .reporter(reporter)
            .handlers::<Crooked>()
            .build()
            .unwrap();

        supervisor.start(CancellationToken::new()).await.unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Running);
        assert_eq!(supervisor.discovery_summary().unwrap().skipped.len(), 1);
        assert_eq!(reports.load(Ordering::SeqCst), 1);
        supervisor.stop(CancellationToken::new()).await.unwrap();
    }
}
