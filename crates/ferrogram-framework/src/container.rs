//! A minimal construction container.
//!
//! [`Container`] maps handler-bearing types to async factories and
//! implements [`Construct`] for discovery. Dependencies a handler type needs
//! are captured by its factory closure.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::discovery::{Candidate, Construct, Instance};
use crate::error::ConstructError;
use ferrogram_core::BoxError;

type Factory = Arc<dyn Fn() -> BoxFuture<'static, Result<Instance, BoxError>> + Send + Sync>;

/// Type-keyed registry of factories.
#[derive(Clone, Default)]
pub struct Container {
    factories: HashMap<TypeId, (&'static str, Factory)>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async factory for `H`, replacing any earlier one.
    pub fn register<H, F, Fut, E>(&mut self, factory: F) -> &mut Self
    where
        H: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<H, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let factory: Factory = Arc::new(move || {
            let fut = factory();
            async move {
                fut.await
                    .map(|instance| Arc::new(instance) as Instance)
                    .map_err(Into::into)
            }
            .boxed()
        });
        self.factories
            .insert(TypeId::of::<H>(), (type_name::<H>(), factory));
        self
    }

    /// Registers `H::default` as the factory for `H`.
    pub fn register_default<H>(&mut self) -> &mut Self
    where
        H: Default + Send + Sync + 'static,
    {
        self.register(|| async { Ok::<_, BoxError>(H::default()) })
    }

    /// Registers an existing instance; every construction returns it.
    pub fn register_instance<H>(&mut self, instance: Arc<H>) -> &mut Self
    where
        H: Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move || {
            let instance: Instance = Arc::clone(&instance) as Instance;
            async move { Ok::<_, BoxError>(instance) }.boxed()
        });
        self.factories
            .insert(TypeId::of::<H>(), (type_name::<H>(), factory));
        self
    }

    pub fn contains<H: 'static>(&self) -> bool {
        self.factories.contains_key(&TypeId::of::<H>())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.factories.values().map(|(name, _)| name))
            .finish()
    }
}

#[async_trait]
impl Construct for Container {
    async fn construct(&self, candidate: &Candidate) -> Result<Instance, ConstructError> {
        let (type_name, factory) = self.factories.get(&candidate.type_id()).ok_or(
            ConstructError::NotRegistered {
                type_name: candidate.type_name(),
            },
        )?;
        factory().await.map_err(|source| ConstructError::Failed {
            type_name: *type_name,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{Declarations, HandlerSet};
    use tokio_test::{assert_err, block_on};

    #[derive(Default)]
    struct Empty;

    impl HandlerSet for Empty {
        fn declare(_decl: &mut Declarations<Self>) {}
    }

    #[tokio::test]
    async fn test_construct_registered_type() {
        let mut container = Container::new();
        container.register_default::<Empty>();
        assert!(container.contains::<Empty>());

        let instance = container
            .construct(&Candidate::of::<Empty>())
            .await
            .unwrap();
        assert!(instance.downcast::<Empty>().is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let container = Container::new();
        let err = assert_err!(block_on(container.construct(&Candidate::of::<Empty>())));
        assert!(matches!(err, ConstructError::NotRegistered { .. }));
    }

    #[tokio::test]
    async fn test_register_instance_shares_it() {
        let shared = Arc::new(Empty);
        let mut container = Container::new();
        container.register_instance(Arc::clone(&shared));

        let instance = container
            .construct(&Candidate::of::<Empty>())
            .await
            .unwrap()
            .downcast::<Empty>()
            .unwrap();
        assert!(Arc::ptr_eq(&instance, &shared));
    }
}
