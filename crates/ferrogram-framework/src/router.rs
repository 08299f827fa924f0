//! Update routing.
//!
//! The [`Router`] classifies each inbound [`Update`], resolves its handlers
//! from the frozen [`Registry`] and invokes them. Every handler failure,
//! including a panic, is caught, reported once through the configured
//! [`ErrorReporter`](ferrogram_core::ErrorReporter) and never propagated to
//! the caller.
//!
//! | Kind            | Invoked                                              |
//! |-----------------|------------------------------------------------------|
//! | keyed kinds     | the first handler whose key prefixes the input      |
//! | ordered kinds   | every handler, started in order and awaited together |
//! | single-slot     | the handler, if registered                           |

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Level, debug, span, trace};

use crate::error::HandlerError;
use crate::handler::HandlerDescriptor;
use crate::registry::Registry;
use ferrogram_core::{
    BoxError, BoxedClient, BoxedReporter, CancellationToken, LogReporter, Payload, ReportedError,
    Update, UpdateKind,
};

/// Routing behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterOptions {
    /// Hand keyed updates that resolve to no handler to the unmatched
    /// handlers instead of dropping them.
    pub fallback_to_unmatched: bool,
}

/// Why an update was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A keyed update carried no usable key (empty text, no callback data).
    MissingKey,
    /// No handler is registered for the update.
    NoHandler,
}

/// The result of routing one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No handler ran.
    Dropped { kind: UpdateKind, reason: DropReason },
    /// At least one handler ran; `failed` of them failed.
    Dispatched {
        kind: UpdateKind,
        invoked: usize,
        failed: usize,
    },
}

impl RouteOutcome {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::Dropped { kind, .. } | Self::Dispatched { kind, .. } => *kind,
        }
    }

    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Routes updates to registered handlers.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
    reporter: BoxedReporter,
    options: RouterOptions,
}

impl Router {
    /// Creates a router that reports through a [`LogReporter`].
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            reporter: Arc::new(LogReporter),
            options: RouterOptions::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: BoxedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_options(mut self, options: RouterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn options(&self) -> RouterOptions {
        self.options
    }

    /// Routes one update and waits for every invoked handler to finish.
    pub async fn route(
        &self,
        client: BoxedClient,
        update: Update,
        cancel: CancellationToken,
    ) -> RouteOutcome {
        let payload = Payload::classify(&update);
        let kind = payload.kind();
        let span = span!(Level::DEBUG, "route", update_id = update.update_id, kind = %kind);

        async move {
            let outcome = self.dispatch(&client, &update, payload, &cancel).await;
            match outcome {
                RouteOutcome::Dropped { reason, .. } => {
                    debug!(?reason, "Update dropped");
                }
                RouteOutcome::Dispatched { invoked, failed, .. } => {
                    trace!(invoked, failed, "Update dispatched");
                }
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn dispatch(
        &self,
        client: &BoxedClient,
        update: &Update,
        payload: Payload,
        cancel: &CancellationToken,
    ) -> RouteOutcome {
        let kind = payload.kind();
        let update_id = update.update_id;

        if kind.is_keyed() {
            let resolved = match payload.match_key() {
                None => Err(DropReason::MissingKey),
                Some(key) => self
                    .registry
                    .resolve_keyed(kind, Some(key))
                    .ok_or(DropReason::NoHandler),
            };
            return match resolved {
                Ok(descriptor) => {
                    let failed = self
                        .invoke(descriptor, client, payload, update_id, cancel)
                        .await;
                    RouteOutcome::Dispatched {
                        kind,
                        invoked: 1,
                        failed: usize::from(failed),
                    }
                }
                Err(reason) if self.options.fallback_to_unmatched => {
                    match self.fan_out(UpdateKind::Unmatched, client, update, cancel).await {
                        Some(outcome) => outcome,
                        None => RouteOutcome::Dropped { kind, reason },
                    }
                }
                Err(reason) => RouteOutcome::Dropped { kind, reason },
            };
        }

        if kind.is_ordered() {
            let descriptors = self.registry.resolve_ordered(kind);
            if descriptors.is_empty() {
                return RouteOutcome::Dropped {
                    kind,
                    reason: DropReason::NoHandler,
                };
            }
            let failed = self
                .invoke_all(descriptors, client, &payload, update_id, cancel)
                .await;
            return RouteOutcome::Dispatched {
                kind,
                invoked: descriptors.len(),
                failed,
            };
        }

        match self.registry.resolve_single(kind) {
            Some(descriptor) => {
                let failed = self
                    .invoke(descriptor, client, payload, update_id, cancel)
                    .await;
                RouteOutcome::Dispatched {
                    kind,
                    invoked: 1,
                    failed: usize::from(failed),
                }
            }
            None => RouteOutcome::Dropped {
                kind,
                reason: DropReason::NoHandler,
            },
        }
    }

    /// Runs the unmatched handlers on a keyed update nobody claimed.
    async fn fan_out(
        &self,
        kind: UpdateKind,
        client: &BoxedClient,
        update: &Update,
        cancel: &CancellationToken,
    ) -> Option<RouteOutcome> {
        let descriptors = self.registry.resolve_ordered(kind);
        if descriptors.is_empty() {
            return None;
        }
        debug!("Falling back to unmatched handlers");
        let payload = Payload::Unmatched(update.clone());
        let failed = self
            .invoke_all(descriptors, client, &payload, update.update_id, cancel)
            .await;
        Some(RouteOutcome::Dispatched {
            kind,
            invoked: descriptors.len(),
            failed,
        })
    }

    /// Starts every handler in order and waits for all of them.
    ///
    /// Returns the number of failures.
    async fn invoke_all(
        &self,
        descriptors: &[HandlerDescriptor],
        client: &BoxedClient,
        payload: &Payload,
        update_id: i64,
        cancel: &CancellationToken,
    ) -> usize {
        let invocations = descriptors.iter().map(|descriptor| {
            self.invoke(descriptor, client, payload.clone(), update_id, cancel)
        });
        future::join_all(invocations)
            .await
            .into_iter()
            .filter(|failed| *failed)
            .count()
    }

    /// Invokes one handler, reporting its failure.
    ///
    /// Returns true if the handler failed.
    async fn invoke(
        &self,
        descriptor: &HandlerDescriptor,
        client: &BoxedClient,
        payload: Payload,
        update_id: i64,
        cancel: &CancellationToken,
    ) -> bool {
        let kind = payload.kind();
        trace!(handler = descriptor.name(), "Invoking handler");

        // Calling the invoke fn may itself panic, so it runs inside the guard.
        let invocation =
            future::lazy(|_| descriptor.invoke(Arc::clone(client), payload, cancel.clone()))
                .flatten();
        let error: BoxError = match AssertUnwindSafe(invocation).catch_unwind().await {
            Ok(Ok(())) => return false,
            Ok(Err(error)) => error,
            Err(panic) => Box::new(HandlerError::Panicked(panic_message(panic.as_ref()))),
        };

        let reported = ReportedError::Handler {
            kind,
            handler: descriptor.name().to_string(),
            update_id,
            error,
        };
        self.reporter
            .report(Arc::clone(client), reported, cancel.clone())
            .await;
        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerFuture, InvokeFn};
    use crate::test_support::{mock_client, recorder};
    use ferrogram_core::{CallbackQuery, InlineQuery, Message, PreCheckoutQuery};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting<P: crate::handler::FromPayload>(
        kind: UpdateKind,
        key: Option<&str>,
        counter: &Arc<AtomicUsize>,
        add: usize,
    ) -> HandlerDescriptor {
        let counter = Arc::clone(counter);
        HandlerDescriptor::from_fn(
            kind,
            key,
            move |_client: BoxedClient, _payload: P, _cancel: CancellationToken| {
                let c = Arc::clone(&counter);
                async move {
                    c.fetch_add(add, Ordering::SeqCst);
                }
            },
        )
    }

    fn message(update_id: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message::text(1, text)),
            ..Default::default()
        }
    }

    fn router(registry: Registry) -> Router {
        Router::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_command_prefix_routing() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register(counting::<Message>(UpdateKind::Message, Some("/start"), &counter, 1))
            .unwrap();
        registry
            .register(counting::<Message>(UpdateKind::Message, Some("/stop"), &counter, 100))
            .unwrap();
        let router = router(registry);

        let outcome = router
            .route(mock_client(), message(1, "/start now"), CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            RouteOutcome::Dispatched {
                kind: UpdateKind::Message,
                invoked: 1,
                failed: 0
            }
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unresolved_and_keyless_updates_are_dropped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register(counting::<Message>(UpdateKind::Message, Some("/start"), &counter, 1))
            .unwrap();
        registry
            .register(counting::<Update>(UpdateKind::Unmatched, None, &counter, 10))
            .unwrap();
        let router = router(registry);

        let outcome = router
            .route(mock_client(), message(1, "hello"), CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            RouteOutcome::Dropped {
                kind: UpdateKind::Message,
                reason: DropReason::NoHandler
            }
        );

        let outcome = router
            .route(mock_client(), message(2, ""), CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            RouteOutcome::Dropped {
                kind: UpdateKind::Message,
                reason: DropReason::MissingKey
            }
        );

        // unmatched handlers do not see dropped keyed updates by default
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_to_unmatched() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register(counting::<Update>(UpdateKind::Unmatched, None, &counter, 10))
            .unwrap();
        let router = router(registry).with_options(RouterOptions {
            fallback_to_unmatched: true,
        });

        let outcome = router
            .route(mock_client(), message(1, "hello"), CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            RouteOutcome::Dispatched {
                kind: UpdateKind::Unmatched,
                invoked: 1,
                failed: 0
            }
        );
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_classification_precedence() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register(counting::<Message>(UpdateKind::Message, Some("/a"), &counter, 1))
            .unwrap();
        registry
            .register(counting::<CallbackQuery>(UpdateKind::Callback, Some("cb"), &counter, 100))
            .unwrap();
        let router = router(registry);

        let update = Update {
            update_id: 7,
            message: Some(Message::text(1, "/a")),
            callback_query: Some(CallbackQuery {
                data: Some("cb".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let outcome = router
            .route(mock_client(), update, CancellationToken::new())
            .await;

        assert_eq!(outcome.kind(), UpdateKind::Message);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ordered_handlers_all_run_and_failures_are_isolated() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (reporter, reports) = recorder();

        let mut registry = Registry::new();
        registry
            .register(counting::<Message>(UpdateKind::EditedMessage, None, &counter, 1))
            .unwrap();
        registry
            .register(HandlerDescriptor::from_fn(
                UpdateKind::EditedMessage,
                None,
                |_client: BoxedClient, _message: Message, _cancel: CancellationToken| async {
                    Err::<(), _>("edit rejected")
                },
            ))
            .unwrap();
        registry
            .register(counting::<Message>(UpdateKind::EditedMessage, None, &counter, 10))
            .unwrap();
        let router = router(registry).with_reporter(reporter);

        let update = Update {
            update_id: 3,
            edited_message: Some(Message::text(1, "edited")),
            ..Default::default()
        };
        let outcome = router
            .route(mock_client(), update, CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            RouteOutcome::Dispatched {
                kind: UpdateKind::EditedMessage,
                invoked: 3,
                failed: 1
            }
        );
        assert_eq!(counter.load(Ordering::SeqCst), 11);

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("edit rejected"));
        assert!(reports[0].contains("update 3"));
    }

    #[tokio::test]
    async fn test_ordered_handlers_run_concurrently() {
        let mut registry = Registry::new();
        for _ in 0..2 {
            registry
                .register(HandlerDescriptor::from_fn(
                    UpdateKind::Unmatched,
                    None,
                    |_client: BoxedClient, _update: Update, _cancel: CancellationToken| async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    },
                ))
                .unwrap();
        }
        let router = router(registry);

        let started = tokio::time::Instant::now();
        let outcome = router
            .route(
                mock_client(),
                Update {
                    update_id: 9,
                    ..Default::default()
                },
                CancellationToken::new(),
            )
            .await;

        assert!(outcome.is_dispatched());
        assert!(started.elapsed() < Duration::from_millis(390));
    }

    async fn explode(_client: BoxedClient, _query: InlineQuery, _cancel: CancellationToken) {
        panic!("inline exploded")
    }

    #[tokio::test]
    async fn test_panicking_handler_is_reported() {
        let (reporter, reports) = recorder();
        let mut registry = Registry::new();
        registry
            .register(HandlerDescriptor::from_fn(UpdateKind::Inline, Some("q"), explode))
            .unwrap();
        let router = router(registry).with_reporter(reporter);

        let update = Update {
            update_id: 4,
            inline_query: Some(InlineQuery {
                id: "q1".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let outcome = router
            .route(mock_client(), update, CancellationToken::new())
            .await;

        assert_eq!(
            outcome,
            RouteOutcome::Dispatched {
                kind: UpdateKind::Inline,
                invoked: 1,
                failed: 1
            }
        );
        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].contains("inline exploded"));
    }

    #[tokio::test]
    async fn test_pre_checkout_single_slot() {
        let counter = Arc::new(AtomicUsize::new(0));
        let update = Update {
            update_id: 5,
            pre_checkout_query: Some(PreCheckoutQuery::default()),
            ..Default::default()
        };

        let empty = router(Registry::new());
        let outcome = empty
            .route(mock_client(), update.clone(), CancellationToken::new())
            .await;
        assert_eq!(
            outcome,
            RouteOutcome::Dropped {
                kind: UpdateKind::PreCheckout,
                reason: DropReason::NoHandler
            }
        );

        let mut registry = Registry::new();
        registry
            .register(counting::<PreCheckoutQuery>(UpdateKind::PreCheckout, None, &counter, 1))
            .unwrap();
        let outcome = router(registry)
            .route(mock_client(), update, CancellationToken::new())
            .await;
        assert!(outcome.is_dispatched());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unmatched_without_handlers() {
        let outcome = router(Registry::new())
            .route(
                mock_client(),
                Update {
                    update_id: 6,
                    ..Default::default()
                },
                CancellationToken::new(),
            )
            .await;
        assert_eq!(
            outcome,
            RouteOutcome::Dropped {
                kind: UpdateKind::Unmatched,
                reason: DropReason::NoHandler
            }
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_block_later_updates() {
        let (reporter, reports) = recorder();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();
        registry
            .register(HandlerDescriptor::from_fn(
                UpdateKind::Message,
                Some("/fail"),
                |_client: BoxedClient, _message: Message, _cancel: CancellationToken| async {
                    Err::<(), _>(std::io::Error::other("fail exploded"))
                },
            ))
            .unwrap();
        // Panics while building the future, before any poll.
        let invoke: Arc<InvokeFn> = Arc::new(
            |_client: BoxedClient, _payload: Payload, _cancel: CancellationToken| -> HandlerFuture {
                panic!("invoke exploded")
            },
        );
        registry
            .register(HandlerDescriptor::new(
                UpdateKind::Message,
                Some("/boom".to_string()),
                "boom",
                invoke,
            ))
            .unwrap();
        registry
            .register(counting::<Message>(UpdateKind::Message, Some("/ok"), &counter, 1))
            .unwrap();
        let router = router(registry).with_reporter(reporter);

        let failed = RouteOutcome::Dispatched {
            kind: UpdateKind::Message,
            invoked: 1,
            failed: 1,
        };
        let cancel = CancellationToken::new();
        assert_eq!(
            router.route(mock_client(), message(1, "/fail"), cancel.clone()).await,
            failed
        );
        assert_eq!(
            router.route(mock_client(), message(2, "/boom"), cancel.clone()).await,
            failed
        );
        assert_eq!(
            router.route(mock_client(), message(3, "/ok"), cancel).await,
            RouteOutcome::Dispatched {
                kind: UpdateKind::Message,
                invoked: 1,
                failed: 0
            }
        );

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let reports = reports.lock();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].contains("fail exploded"));
        assert!(reports[1].contains("invoke exploded"));
    }
}
