//! Error types for the ferrogram framework.

use thiserror::Error;

use ferrogram_core::{BoxError, UpdateKind};

/// Errors raised when inserting into a [`Registry`](crate::Registry).
///
/// A failed insert never changes the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A handler with the same key is already registered for this kind.
    #[error("duplicate key '{key}' for {kind} handlers")]
    DuplicateKey {
        /// The kind the key was registered under.
        kind: UpdateKind,
        /// The duplicate key.
        key: String,
    },

    /// The single handler slot for this kind is already filled.
    #[error("a {kind} handler is already registered")]
    AlreadyRegistered {
        /// The single-slot kind.
        kind: UpdateKind,
    },

    /// Keyed registration with an empty key.
    #[error("empty key for {kind} handler")]
    EmptyKey {
        /// The keyed kind.
        kind: UpdateKind,
    },

    /// The registration call does not fit the kind's storage.
    #[error("{kind} handlers cannot be registered as {storage}")]
    KindMismatch {
        /// The kind passed in.
        kind: UpdateKind,
        /// The storage the caller asked for (`keyed`, `ordered`, `single`).
        storage: &'static str,
    },
}

/// A declared handler method has the wrong shape for its declaration.
///
/// The method is skipped; discovery continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerSignatureError {
    /// The payload parameter cannot carry the declared kind.
    #[error("handler '{handler}' takes {payload}, which cannot receive {kind} updates")]
    PayloadMismatch {
        handler: String,
        kind: UpdateKind,
        payload: &'static str,
    },

    /// A keyed kind was declared without a key.
    #[error("handler '{handler}' is declared for {kind} updates without a match key")]
    MissingKey { handler: String, kind: UpdateKind },

    /// A non-keyed kind was declared with a key.
    #[error("handler '{handler}' declares key '{key}' but {kind} updates are not keyed")]
    UnexpectedKey {
        handler: String,
        kind: UpdateKind,
        key: String,
    },
}

impl HandlerSignatureError {
    /// Returns the name of the offending handler.
    pub fn handler(&self) -> &str {
        match self {
            Self::PayloadMismatch { handler, .. }
            | Self::MissingKey { handler, .. }
            | Self::UnexpectedKey { handler, .. } => handler,
        }
    }
}

/// Errors raised by a construction capability.
#[derive(Debug, Error)]
pub enum ConstructError {
    /// No factory knows how to build this type.
    #[error("no factory registered for '{type_name}'")]
    NotRegistered { type_name: &'static str },

    /// The factory ran and failed.
    #[error("factory for '{type_name}' failed: {source}")]
    Failed {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    /// The factory produced an instance of another type.
    #[error("constructed instance is not a '{type_name}'")]
    TypeMismatch { type_name: &'static str },
}

/// A fatal problem found while discovering handlers.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A handler-bearing type could not be constructed.
    #[error(transparent)]
    Construct(#[from] ConstructError),

    /// A declared handler was rejected by the registry.
    #[error("cannot register '{handler}': {source}")]
    Registry {
        handler: String,
        #[source]
        source: RegistryError,
    },
}

/// Discovery finished with fatal errors; no registry is produced.
///
/// Carries every error found, not only the first.
#[derive(Debug, Error)]
#[error("handler discovery failed with {} error(s): {}", .errors.len(), join(.errors))]
pub struct DiscoveryFailed {
    /// Fatal errors, in discovery order.
    pub errors: Vec<DiscoveryError>,
    /// Methods skipped for having the wrong shape.
    pub skipped: Vec<HandlerSignatureError>,
}

fn join(errors: &[DiscoveryError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures produced by the routing layer itself while invoking a handler.
///
/// Errors returned by user handlers are reported as-is; these variants cover
/// what the router catches around them.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler was handed a payload it cannot accept.
    #[error("handler expects {expected} but got a {got} update")]
    PayloadMismatch {
        expected: &'static str,
        got: UpdateKind,
    },
}
