//! Handler discovery.
//!
//! Handler-bearing types implement [`HandlerSet`] and describe their handler
//! methods in [`HandlerSet::declare`]. A [`Discoverer`] walks a list of
//! [`Candidate`]s, obtains one instance of each through a [`Construct`]
//! capability, validates every declared method, and fills a [`Registry`].
//!
//! ```text
//! Candidate ──construct──▶ instance ──declare──▶ Declarations
//!                                                    │ validate
//!                                   skipped ◀────────┤
//!                                                    ▼
//!                                          Registry::register
//! ```
//!
//! Construction failures and registry conflicts are fatal: discovery keeps
//! going so every problem is collected, then returns [`DiscoveryFailed`] and
//! no registry. Methods with the wrong shape are skipped with a warning.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Greeter;
//!
//! impl Greeter {
//!     async fn start(self: Arc<Self>, client: BoxedClient, message: Message, _cancel: CancellationToken) -> ApiResult<()> {
//!         client.send_message(message.chat.id, "hello").await.map(drop)
//!     }
//! }
//!
//! impl HandlerSet for Greeter {
//!     fn declare(decl: &mut Declarations<Self>) {
//!         decl.command("/start", Self::start);
//!     }
//! }
//!
//! let mut container = Container::new();
//! container.register_default::<Greeter>();
//! let discovered = Discoverer::new()
//!     .with::<Greeter>()
//!     .run(&container)
//!     .await?;
//! ```

use std::any::{Any, TypeId, type_name};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::{
    ConstructError, DiscoveryError, DiscoveryFailed, HandlerSignatureError,
};
use crate::handler::{FromPayload, HandlerDescriptor, IntoOutcome, InvokeFn, erase};
use crate::registry::{Registry, RegistryStats};
use ferrogram_core::{BoxedClient, CancellationToken, UpdateKind};

/// A constructed handler-bearing instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

// =============================================================================
// HandlerSet / Declarations
// =============================================================================

/// A type that carries handler methods.
pub trait HandlerSet: Send + Sync + Sized + 'static {
    /// Declares the handler methods of this type.
    fn declare(decl: &mut Declarations<Self>);
}

type Bind<H> = Box<dyn FnOnce(Arc<H>) -> Arc<InvokeFn> + Send>;

struct Declaration<H> {
    kind: UpdateKind,
    key: Option<String>,
    handler: &'static str,
    payload: &'static str,
    accepts: fn(UpdateKind) -> bool,
    bind: Bind<H>,
}

impl<H> Declaration<H> {
    fn validate(&self) -> Result<(), HandlerSignatureError> {
        let handler = self.handler.to_string();
        if !(self.accepts)(self.kind) {
            return Err(HandlerSignatureError::PayloadMismatch {
                handler,
                kind: self.kind,
                payload: self.payload,
            });
        }
        match (&self.key, self.kind.is_keyed()) {
            (None, true) => Err(HandlerSignatureError::MissingKey {
                handler,
                kind: self.kind,
            }),
            (Some(key), true) if key.is_empty() => Err(HandlerSignatureError::MissingKey {
                handler,
                kind: self.kind,
            }),
            (Some(key), false) => Err(HandlerSignatureError::UnexpectedKey {
                handler,
                kind: self.kind,
                key: key.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn into_descriptor(
        self,
        instance: &Arc<H>,
    ) -> Result<HandlerDescriptor, HandlerSignatureError> {
        self.validate()?;
        let invoke = (self.bind)(Arc::clone(instance));
        Ok(HandlerDescriptor::new(
            self.kind,
            self.key,
            self.handler,
            invoke,
        ))
    }
}

/// The handler methods declared by one [`HandlerSet`].
///
/// A method has the shape
/// `Fn(Arc<H>, BoxedClient, P, CancellationToken) -> impl Future<Output = R>`
/// where `P: FromPayload` and `R` is `()` or `Result<(), E>`.
pub struct Declarations<H> {
    entries: Vec<Declaration<H>>,
}

impl<H: HandlerSet> Declarations<H> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Declares a handler method for `kind`.
    ///
    /// `key` is required for keyed kinds and must be absent otherwise; a
    /// mismatch is reported when the set is discovered.
    pub fn on<P, F, Fut, R>(&mut self, kind: UpdateKind, key: Option<&str>, method: F) -> &mut Self
    where
        P: FromPayload,
        F: Fn(Arc<H>, BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        let bind = move |instance: Arc<H>| {
            erase(move |client, payload: P, cancel| {
                method(Arc::clone(&instance), client, payload, cancel)
            })
        };
        self.entries.push(Declaration {
            kind,
            key: key.map(str::to_string),
            handler: type_name::<F>(),
            payload: type_name::<P>(),
            accepts: P::accepts,
            bind: Box::new(bind),
        });
        self
    }

    /// Declares a message handler for texts starting with `prefix`.
    pub fn command<P, F, Fut, R>(&mut self, prefix: &str, method: F) -> &mut Self
    where
        P: FromPayload,
        F: Fn(Arc<H>, BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        self.on(UpdateKind::Message, Some(prefix), method)
    }

    /// Declares a callback query handler for data starting with `prefix`.
    pub fn callback<P, F, Fut, R>(&mut self, prefix: &str, method: F) -> &mut Self
    where
        P: FromPayload,
        F: Fn(Arc<H>, BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        self.on(UpdateKind::Callback, Some(prefix), method)
    }

    /// Declares an inline query handler for identifiers starting with `prefix`.
    pub fn inline<P, F, Fut, R>(&mut self, prefix: &str, method: F) -> &mut Self
    where
        P: FromPayload,
        F: Fn(Arc<H>, BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        self.on(UpdateKind::Inline, Some(prefix), method)
    }

    pub fn edited_message<P, F, Fut, R>(&mut self, method: F) -> &mut Self
    where
        P: FromPayload,
        F: Fn(Arc<H>, BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        self.on(UpdateKind::EditedMessage, None, method)
    }

    pub fn pre_checkout<P, F, Fut, R>(&mut self, method: F) -> &mut Self
    where
        P: FromPayload,
        F: Fn(Arc<H>, BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        self.on(UpdateKind::PreCheckout, None, method)
    }

    /// Declares a handler for updates no other kind claims.
    pub fn unmatched<P, F, Fut, R>(&mut self, method: F) -> &mut Self
    where
        P: FromPayload,
        F: Fn(Arc<H>, BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        self.on(UpdateKind::Unmatched, None, method)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Candidate / Construct
// =============================================================================

type BindAll =
    fn(Instance) -> Result<Vec<Result<HandlerDescriptor, HandlerSignatureError>>, ConstructError>;

fn bind_all<H: HandlerSet>(
    instance: Instance,
) -> Result<Vec<Result<HandlerDescriptor, HandlerSignatureError>>, ConstructError> {
    let instance = instance
        .downcast::<H>()
        .map_err(|_| ConstructError::TypeMismatch {
            type_name: type_name::<H>(),
        })?;
    let mut decl = Declarations::<H>::new();
    H::declare(&mut decl);
    Ok(decl
        .entries
        .into_iter()
        .map(|entry| entry.into_descriptor(&instance))
        .collect())
}

/// A handler-bearing type waiting to be discovered.
#[derive(Clone, Copy)]
pub struct Candidate {
    type_id: TypeId,
    type_name: &'static str,
    bind: BindAll,
}

impl Candidate {
    pub fn of<H: HandlerSet>() -> Self {
        Self {
            type_id: TypeId::of::<H>(),
            type_name: type_name::<H>(),
            bind: bind_all::<H>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Candidate").field(&self.type_name).finish()
    }
}

/// The capability used to obtain handler-bearing instances.
#[async_trait]
pub trait Construct: Send + Sync {
    /// Produces one instance of the candidate's type.
    async fn construct(&self, candidate: &Candidate) -> Result<Instance, ConstructError>;
}

// =============================================================================
// Discoverer
// =============================================================================

/// What discovery found.
#[derive(Debug, Clone, Default)]
pub struct DiscoverySummary {
    /// Handler-bearing types constructed.
    pub types: usize,
    /// Handlers registered.
    pub registered: usize,
    /// Methods skipped for having the wrong shape.
    pub skipped: Vec<HandlerSignatureError>,
    pub stats: RegistryStats,
}

/// A successful discovery.
#[derive(Debug)]
pub struct Discovered {
    pub registry: Registry,
    pub summary: DiscoverySummary,
}

/// Builds a [`Registry`] from handler-bearing types.
#[derive(Debug, Clone, Default)]
pub struct Discoverer {
    candidates: Vec<Candidate>,
}

impl Discoverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a candidate.
    pub fn candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    /// Adds `H` as a candidate.
    pub fn with<H: HandlerSet>(self) -> Self {
        self.candidate(Candidate::of::<H>())
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Runs discovery.
    ///
    /// Candidates are processed in the order they were added; each type's
    /// handlers are registered in declaration order. A type listed twice is
    /// constructed once.
    pub async fn run(self, construct: &dyn Construct) -> Result<Discovered, DiscoveryFailed> {
        let mut registry = Registry::new();
        let mut summary = DiscoverySummary::default();
        let mut errors: Vec<DiscoveryError> = Vec::new();
        let mut seen = HashSet::new();

        for candidate in self.candidates {
            if !seen.insert(candidate.type_id) {
                warn!(
                    handler_type = candidate.type_name,
                    "Handler type listed more than once - skipping duplicate"
                );
                continue;
            }

            let bound = match construct.construct(&candidate).await {
                Ok(instance) => (candidate.bind)(instance),
                Err(e) => Err(e),
            };
            let bound = match bound {
                Ok(bound) => bound,
                Err(e) => {
                    error!(
                        handler_type = candidate.type_name,
                        error = %e,
                        "Failed to construct handler type"
                    );
                    errors.push(e.into());
                    continue;
                }
            };
            summary.types += 1;

            for result in bound {
                let descriptor = match result {
                    Ok(descriptor) => descriptor,
                    Err(e) => {
                        warn!(error = %e, "Skipping handler with invalid signature");
                        summary.skipped.push(e);
                        continue;
                    }
                };

                let handler = descriptor.name().to_string();
                let kind = descriptor.kind();
                let key = descriptor.match_key().map(str::to_string);
                match registry.register(descriptor) {
                    Ok(()) => {
                        debug!(handler = %handler, kind = %kind, key = ?key, "Registered handler");
                        summary.registered += 1;
                    }
                    Err(source) => {
                        error!(handler = %handler, error = %source, "Failed to register handler");
                        errors.push(DiscoveryError::Registry { handler, source });
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(DiscoveryFailed {
                errors,
                skipped: summary.skipped,
            });
        }

        summary.stats = registry.stats();
        info!(
            types = summary.types,
            registered = summary.registered,
            skipped = summary.skipped.len(),
            "{}",
            summary.stats
        );
        Ok(Discovered { registry, summary })
    }
}
