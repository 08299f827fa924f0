//! Handler registry.
//!
//! Handlers are stored per [`UpdateKind`] according to how the kind is
//! resolved:
//!
//! | Kind                               | Storage           | Resolution                   |
//! |------------------------------------|-------------------|------------------------------|
//! | `message`, `callback_query`, `inline_query` | keyed table | first registered key that prefixes the input |
//! | `edited_message`, `unmatched`      | ordered list      | every handler, in order      |
//! | `pre_checkout_query`               | single slot       | the handler, if any          |
//!
//! The registry is filled during discovery through `&mut self` and then
//! frozen behind an `Arc`; lookups never lock.

use std::fmt;

use crate::error::RegistryError;
use crate::handler::HandlerDescriptor;
use ferrogram_core::UpdateKind;

#[derive(Debug, Clone)]
struct KeyedEntry {
    key: String,
    descriptor: HandlerDescriptor,
}

/// Mapping from update kinds to their handlers.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    message: Vec<KeyedEntry>,
    callback: Vec<KeyedEntry>,
    inline: Vec<KeyedEntry>,
    edited_message: Vec<HandlerDescriptor>,
    unmatched: Vec<HandlerDescriptor>,
    pre_checkout: Option<HandlerDescriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn keyed(&self, kind: UpdateKind) -> Option<&[KeyedEntry]> {
        match kind {
            UpdateKind::Message => Some(&self.message),
            UpdateKind::Callback => Some(&self.callback),
            UpdateKind::Inline => Some(&self.inline),
            _ => None,
        }
    }

    fn keyed_mut(&mut self, kind: UpdateKind) -> Result<&mut Vec<KeyedEntry>, RegistryError> {
        match kind {
            UpdateKind::Message => Ok(&mut self.message),
            UpdateKind::Callback => Ok(&mut self.callback),
            UpdateKind::Inline => Ok(&mut self.inline),
            _ => Err(RegistryError::KindMismatch {
                kind,
                storage: "keyed",
            }),
        }
    }

    fn ordered(&self, kind: UpdateKind) -> Option<&[HandlerDescriptor]> {
        match kind {
            UpdateKind::EditedMessage => Some(&self.edited_message),
            UpdateKind::Unmatched => Some(&self.unmatched),
            _ => None,
        }
    }

    fn ordered_mut(
        &mut self,
        kind: UpdateKind,
    ) -> Result<&mut Vec<HandlerDescriptor>, RegistryError> {
        match kind {
            UpdateKind::EditedMessage => Ok(&mut self.edited_message),
            UpdateKind::Unmatched => Ok(&mut self.unmatched),
            _ => Err(RegistryError::KindMismatch {
                kind,
                storage: "ordered",
            }),
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Adds a keyed handler.
    ///
    /// Fails with [`RegistryError::DuplicateKey`] if `key` is already
    /// registered for `kind`. Keys are compared exactly; overlapping prefixes
    /// such as `/s` and `/start` may coexist.
    pub fn register_keyed(
        &mut self,
        kind: UpdateKind,
        key: impl Into<String>,
        descriptor: HandlerDescriptor,
    ) -> Result<(), RegistryError> {
        let key = key.into();
        let table = self.keyed_mut(kind)?;
        if key.is_empty() {
            return Err(RegistryError::EmptyKey { kind });
        }
        if table.iter().any(|entry| entry.key == key) {
            return Err(RegistryError::DuplicateKey { kind, key });
        }
        table.push(KeyedEntry { key, descriptor });
        Ok(())
    }

    /// Appends a handler to an ordered kind.
    pub fn register_ordered(
        &mut self,
        kind: UpdateKind,
        descriptor: HandlerDescriptor,
    ) -> Result<(), RegistryError> {
        self.ordered_mut(kind)?.push(descriptor);
        Ok(())
    }

    /// Fills a single-slot kind.
    ///
    /// A second registration fails with [`RegistryError::AlreadyRegistered`]
    /// and leaves the first handler in place.
    pub fn register_single(
        &mut self,
        kind: UpdateKind,
        descriptor: HandlerDescriptor,
    ) -> Result<(), RegistryError> {
        if !kind.is_single() {
            return Err(RegistryError::KindMismatch {
                kind,
                storage: "single",
            });
        }
        if self.pre_checkout.is_some() {
            return Err(RegistryError::AlreadyRegistered { kind });
        }
        self.pre_checkout = Some(descriptor);
        Ok(())
    }

    /// Registers a descriptor under its own kind and match key.
    pub fn register(&mut self, descriptor: HandlerDescriptor) -> Result<(), RegistryError> {
        let kind = descriptor.kind();
        if kind.is_keyed() {
            let key = descriptor.match_key().unwrap_or_default().to_string();
            self.register_keyed(kind, key, descriptor)
        } else if kind.is_ordered() {
            self.register_ordered(kind, descriptor)
        } else {
            self.register_single(kind, descriptor)
        }
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Returns the first handler, in registration order, whose key is a
    /// prefix of `input`.
    ///
    /// Matching is case-sensitive. Returns `None` when `input` is missing,
    /// empty, or matches nothing.
    pub fn resolve_keyed(&self, kind: UpdateKind, input: Option<&str>) -> Option<&HandlerDescriptor> {
        let input = input.filter(|input| !input.is_empty())?;
        self.keyed(kind)?
            .iter()
            .find(|entry| input.starts_with(entry.key.as_str()))
            .map(|entry| &entry.descriptor)
    }

    /// Returns every handler of an ordered kind, in registration order.
    pub fn resolve_ordered(&self, kind: UpdateKind) -> &[HandlerDescriptor] {
        self.ordered(kind).unwrap_or_default()
    }

    /// Returns the handler of a single-slot kind.
    pub fn resolve_single(&self, kind: UpdateKind) -> Option<&HandlerDescriptor> {
        match kind {
            UpdateKind::PreCheckout => self.pre_checkout.as_ref(),
            _ => None,
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns the registered keys of a keyed kind, in registration order.
    pub fn keys(&self, kind: UpdateKind) -> Vec<&str> {
        self.keyed(kind)
            .map(|table| table.iter().map(|entry| entry.key.as_str()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of handlers registered for `kind`.
    pub fn count(&self, kind: UpdateKind) -> usize {
        if let Some(table) = self.keyed(kind) {
            table.len()
        } else if let Some(list) = self.ordered(kind) {
            list.len()
        } else {
            usize::from(self.resolve_single(kind).is_some())
        }
    }

    /// Returns the total number of handlers.
    pub fn len(&self) -> usize {
        UpdateKind::ALL.iter().map(|kind| self.count(*kind)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the registry contents.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            commands: self.count(UpdateKind::Message),
            callbacks: self.count(UpdateKind::Callback),
            inline: self.count(UpdateKind::Inline),
            edited_message: self.count(UpdateKind::EditedMessage),
            unmatched: self.count(UpdateKind::Unmatched),
            pre_checkout: self.pre_checkout.is_some(),
        }
    }
}

/// Registry contents at a glance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub commands: usize,
    pub callbacks: usize,
    pub inline: usize,
    pub edited_message: usize,
    pub unmatched: usize,
    pub pre_checkout: bool,
}

impl RegistryStats {
    pub fn total(&self) -> usize {
        self.commands
            + self.callbacks
            + self.inline
            + self.edited_message
            + self.unmatched
            + usize::from(self.pre_checkout)
    }
}

impl fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handlers: {} total ({} commands, {} callbacks, {} inline, {} edited, {} unmatched, pre-checkout {})",
            self.total(),
            self.commands,
            self.callbacks,
            self.inline,
            self.edited_message,
            self.unmatched,
            if self.pre_checkout { "set" } else { "unset" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrogram_core::{BoxedClient, CancellationToken, Payload};

    fn noop(kind: UpdateKind, key: Option<&str>, name: &'static str) -> HandlerDescriptor {
        HandlerDescriptor::from_fn(
            kind,
            key,
            |_client: BoxedClient, _payload: Payload, _cancel: CancellationToken| async {},
        )
        .named(name)
    }

    fn resolved_name(registry: &Registry, kind: UpdateKind, input: &str) -> Option<String> {
        registry
            .resolve_keyed(kind, Some(input))
            .map(|descriptor| descriptor.name().to_string())
    }

    #[test]
    fn test_first_registered_prefix_wins() {
        let mut registry = Registry::new();
        registry
            .register_keyed(UpdateKind::Message, "/s", noop(UpdateKind::Message, Some("/s"), "short"))
            .unwrap();
        registry
            .register_keyed(
                UpdateKind::Message,
                "/start",
                noop(UpdateKind::Message, Some("/start"), "long"),
            )
            .unwrap();

        assert_eq!(
            resolved_name(&registry, UpdateKind::Message, "/start now").as_deref(),
            Some("short")
        );
        assert_eq!(registry.keys(UpdateKind::Message), vec!["/s", "/start"]);
    }

    #[test]
    fn test_resolution_is_case_sensitive_prefix() {
        let mut registry = Registry::new();
        registry
            .register(noop(UpdateKind::Callback, Some("vote:"), "vote"))
            .unwrap();

        assert_eq!(
            resolved_name(&registry, UpdateKind::Callback, "vote:up").as_deref(),
            Some("vote")
        );
        assert!(registry.resolve_keyed(UpdateKind::Callback, Some("VOTE:up")).is_none());
        assert!(registry.resolve_keyed(UpdateKind::Callback, Some("x vote:")).is_none());
        assert!(registry.resolve_keyed(UpdateKind::Callback, Some("")).is_none());
        assert!(registry.resolve_keyed(UpdateKind::Callback, None).is_none());
    }

    #[test]
    fn test_duplicate_key_leaves_registry_unchanged() {
        let mut registry = Registry::new();
        registry
            .register(noop(UpdateKind::Inline, Some("q"), "first"))
            .unwrap();

        let err = registry
            .register(noop(UpdateKind::Inline, Some("q"), "second"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateKey {
                kind: UpdateKind::Inline,
                key: "q".to_string()
            }
        );
        assert_eq!(registry.count(UpdateKind::Inline), 1);
        assert_eq!(
            resolved_name(&registry, UpdateKind::Inline, "query").as_deref(),
            Some("first")
        );
    }

    #[test]
    fn test_same_key_in_different_kinds() {
        let mut registry = Registry::new();
        registry
            .register(noop(UpdateKind::Message, Some("x"), "message"))
            .unwrap();
        registry
            .register(noop(UpdateKind::Callback, Some("x"), "callback"))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register_keyed(UpdateKind::Message, "", noop(UpdateKind::Message, None, "empty"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::EmptyKey {
                kind: UpdateKind::Message
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ordered_preserves_registration_order() {
        let mut registry = Registry::new();
        for name in ["a", "b", "c"] {
            registry
                .register(noop(UpdateKind::EditedMessage, None, name))
                .unwrap();
        }
        let names: Vec<&str> = registry
            .resolve_ordered(UpdateKind::EditedMessage)
            .iter()
            .map(HandlerDescriptor::name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(registry.resolve_ordered(UpdateKind::Unmatched).is_empty());
    }

    #[test]
    fn test_single_slot_rejects_second_handler() {
        let mut registry = Registry::new();
        registry
            .register(noop(UpdateKind::PreCheckout, None, "first"))
            .unwrap();
        let err = registry
            .register(noop(UpdateKind::PreCheckout, None, "second"))
            .unwrap_err();

        assert_eq!(
            err,
            RegistryError::AlreadyRegistered {
                kind: UpdateKind::PreCheckout
            }
        );
        assert_eq!(
            registry
                .resolve_single(UpdateKind::PreCheckout)
                .map(HandlerDescriptor::name),
            Some("first")
        );
    }

    #[test]
    fn test_kind_mismatch() {
        let mut registry = Registry::new();
        let err = registry
            .register_ordered(UpdateKind::Message, noop(UpdateKind::Message, None, "m"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::KindMismatch { storage: "ordered", .. }));

        let err = registry
            .register_single(UpdateKind::Unmatched, noop(UpdateKind::Unmatched, None, "u"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::KindMismatch { storage: "single", .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stats() {
        let mut registry = Registry::new();
        registry
            .register(noop(UpdateKind::Message, Some("/a"), "a"))
            .unwrap();
        registry
            .register(noop(UpdateKind::Message, Some("/b"), "b"))
            .unwrap();
        registry
            .register(noop(UpdateKind::Unmatched, None, "u"))
            .unwrap();
        registry
            .register(noop(UpdateKind::PreCheckout, None, "p"))
            .unwrap();

        let stats = registry.stats();
        assert_eq!(stats.commands, 2);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.total(), registry.len());
        assert!(stats.to_string().starts_with("Handlers: 4 total"));
    }
}
