//! Process-wide error reporting hook.
//!
//! Handler failures never propagate into the transport's receive loop.
//! Instead they are turned into a [`ReportedError`] and handed to the single
//! [`ErrorReporter`] configured for the process. Transport failures and
//! handler declarations skipped at startup arrive through the same hook.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::client::BoxedClient;
use crate::error::{BoxError, TransportError};
use crate::kind::UpdateKind;

/// A failure observed by the reporting hook.
#[derive(Debug, Error)]
pub enum ReportedError {
    /// A handler failed while processing an update.
    #[error("handler '{handler}' failed on {kind} update {update_id}: {error}")]
    Handler {
        /// Kind the update was classified as.
        kind: UpdateKind,
        /// Name of the failing handler.
        handler: String,
        /// Identifier of the update being processed.
        update_id: i64,
        /// The handler's error.
        error: BoxError,
    },

    /// A declared handler was skipped at startup for having the wrong shape.
    #[error("handler declaration skipped: {0}")]
    Declaration(BoxError),

    /// The transport reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ReportedError {
    /// Returns the originating update kind for handler failures.
    pub fn kind(&self) -> Option<UpdateKind> {
        match self {
            Self::Handler { kind, .. } => Some(*kind),
            Self::Declaration(_) | Self::Transport(_) => None,
        }
    }
}

/// Receives every handler and transport failure.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Observes one failure. Must not panic.
    async fn report(&self, client: BoxedClient, error: ReportedError, cancel: CancellationToken);
}

/// A shared reporter trait object.
pub type BoxedReporter = Arc<dyn ErrorReporter>;

/// Default reporter: logs every failure at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl ErrorReporter for LogReporter {
    async fn report(&self, client: BoxedClient, error: ReportedError, _cancel: CancellationToken) {
        match &error {
            ReportedError::Handler {
                kind,
                handler,
                update_id,
                error,
            } => {
                error!(
                    client = client.id(),
                    kind = %kind,
                    handler = %handler,
                    update_id,
                    error = %error,
                    "Handler returned an error"
                );
            }
            ReportedError::Declaration(e) => {
                error!(client = client.id(), error = %e, "Handler declaration skipped");
            }
            ReportedError::Transport(e) => {
                error!(client = client.id(), error = %e, "Transport error");
            }
        }
    }
}

/// Adapts an async closure into an [`ErrorReporter`].
pub struct FnReporter<F>(F);

#[async_trait]
impl<F, Fut> ErrorReporter for FnReporter<F>
where
    F: Fn(BoxedClient, ReportedError, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn report(&self, client: BoxedClient, error: ReportedError, cancel: CancellationToken) {
        (self.0)(client, error, cancel).await;
    }
}

/// Creates a reporter from an async closure.
///
/// ```rust,ignore
/// let reporter = reporter_fn(|_client, error, _cancel| async move {
///     eprintln!("{error}");
/// });
/// ```
pub fn reporter_fn<F, Fut>(f: F) -> BoxedReporter
where
    F: Fn(BoxedClient, ReportedError, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(FnReporter(f))
}
