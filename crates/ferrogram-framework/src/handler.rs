//! Handler descriptors and the traits that make typed handlers invocable.
//!
//! A [`HandlerDescriptor`] is the routing layer's view of one handler: the
//! update kind it serves, its match key (for keyed kinds), a diagnostic name
//! and a type-erased invocation closure.
//!
//! Typed handlers are erased through two traits:
//!
//! - [`FromPayload`] turns a classified [`Payload`] into the parameter type
//!   the handler declared (`Message`, `CallbackQuery`, ...).
//! - [`IntoOutcome`] turns the handler's return value (`()` or
//!   `Result<(), E>`) into a uniform `Result<(), BoxError>`.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};

use crate::error::HandlerError;
use ferrogram_core::{
    BoxError, BoxedClient, CallbackQuery, CancellationToken, InlineQuery, Message, Payload,
    PreCheckoutQuery, Update, UpdateKind,
};

/// The future returned by an erased handler invocation.
pub type HandlerFuture = BoxFuture<'static, Result<(), BoxError>>;

/// The erased invocation closure stored in a descriptor.
pub type InvokeFn = dyn Fn(BoxedClient, Payload, CancellationToken) -> HandlerFuture + Send + Sync;

// =============================================================================
// FromPayload
// =============================================================================

/// A handler parameter type that can be extracted from a classified payload.
pub trait FromPayload: Sized + Send + 'static {
    /// Returns true if a payload of `kind` can be converted into `Self`.
    fn accepts(kind: UpdateKind) -> bool;

    /// Extracts `Self`, or `None` if the payload has another kind.
    fn from_payload(payload: Payload) -> Option<Self>;
}

impl FromPayload for Message {
    fn accepts(kind: UpdateKind) -> bool {
        matches!(kind, UpdateKind::Message | UpdateKind::EditedMessage)
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Message(message) | Payload::EditedMessage(message) => Some(message),
            _ => None,
        }
    }
}

impl FromPayload for CallbackQuery {
    fn accepts(kind: UpdateKind) -> bool {
        kind == UpdateKind::Callback
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Callback(query) => Some(query),
            _ => None,
        }
    }
}

impl FromPayload for InlineQuery {
    fn accepts(kind: UpdateKind) -> bool {
        kind == UpdateKind::Inline
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Inline(query) => Some(query),
            _ => None,
        }
    }
}

impl FromPayload for PreCheckoutQuery {
    fn accepts(kind: UpdateKind) -> bool {
        kind == UpdateKind::PreCheckout
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::PreCheckout(query) => Some(query),
            _ => None,
        }
    }
}

/// The whole envelope; only unmatched updates carry one.
impl FromPayload for Update {
    fn accepts(kind: UpdateKind) -> bool {
        kind == UpdateKind::Unmatched
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        match payload {
            Payload::Unmatched(update) => Some(update),
            _ => None,
        }
    }
}

/// The raw payload; accepts every kind.
impl FromPayload for Payload {
    fn accepts(_kind: UpdateKind) -> bool {
        true
    }

    fn from_payload(payload: Payload) -> Option<Self> {
        Some(payload)
    }
}

// =============================================================================
// IntoOutcome
// =============================================================================

/// Converts a handler's return value into an invocation outcome.
pub trait IntoOutcome: Send {
    fn into_outcome(self) -> Result<(), BoxError>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> IntoOutcome for Result<(), E>
where
    E: Into<BoxError> + Send,
{
    fn into_outcome(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

/// Erases a typed handler function into an [`InvokeFn`].
///
/// The handler is only called inside the returned future, so a panic while
/// building its future surfaces when the future is polled.
pub(crate) fn erase<P, F, Fut, R>(f: F) -> Arc<InvokeFn>
where
    P: FromPayload,
    F: Fn(BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome,
{
    let f = Arc::new(f);
    Arc::new(
        move |client: BoxedClient, payload: Payload, cancel: CancellationToken| -> HandlerFuture {
            let got = payload.kind();
            let Some(param) = P::from_payload(payload) else {
                let error = HandlerError::PayloadMismatch {
                    expected: type_name::<P>(),
                    got,
                };
                return Box::pin(future::ready(Err(Box::new(error) as BoxError)));
            };
            let f = Arc::clone(&f);
            Box::pin(async move { f(client, param, cancel).await.into_outcome() })
        },
    )
}

// =============================================================================
// HandlerDescriptor
// =============================================================================

/// One registered handler.
///
/// Cheap to clone; the invocation closure is shared.
#[derive(Clone)]
pub struct HandlerDescriptor {
    kind: UpdateKind,
    match_key: Option<String>,
    name: Cow<'static, str>,
    invoke: Arc<InvokeFn>,
}

impl HandlerDescriptor {
    /// Creates a descriptor from an already-erased invocation closure.
    pub fn new(
        kind: UpdateKind,
        match_key: Option<String>,
        name: impl Into<Cow<'static, str>>,
        invoke: Arc<InvokeFn>,
    ) -> Self {
        Self {
            kind,
            match_key,
            name: name.into(),
            invoke,
        }
    }

    /// Creates a descriptor from a typed handler function.
    ///
    /// The descriptor is named after the function's type.
    ///
    /// ```rust,ignore
    /// let start = HandlerDescriptor::from_fn(
    ///     UpdateKind::Message,
    ///     Some("/start"),
    ///     |client: BoxedClient, message: Message, _cancel| async move {
    ///         client.send_message(message.chat.id, "hello").await?;
    ///         Ok::<_, ApiError>(())
    ///     },
    /// );
    /// ```
    pub fn from_fn<P, F, Fut, R>(kind: UpdateKind, match_key: Option<&str>, f: F) -> Self
    where
        P: FromPayload,
        F: Fn(BoxedClient, P, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        Self::new(
            kind,
            match_key.map(str::to_string),
            type_name::<F>(),
            erase(f),
        )
    }

    /// Replaces the diagnostic name.
    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    pub fn match_key(&self) -> Option<&str> {
        self.match_key.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts one invocation.
    pub fn invoke(
        &self,
        client: BoxedClient,
        payload: Payload,
        cancel: CancellationToken,
    ) -> HandlerFuture {
        (self.invoke)(client, payload, cancel)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("kind", &self.kind)
            .field("match_key", &self.match_key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
