//! # Ferrogram Framework
//!
//! The routing layer of ferrogram.
//!
//! This layer provides:
//! - [`HandlerDescriptor`]s and the [`FromPayload`] / [`IntoOutcome`] traits
//!   that erase typed handler methods
//! - The [`Registry`] mapping update kinds to handlers
//! - Handler discovery through [`HandlerSet`] declarations, a [`Discoverer`]
//!   and a [`Construct`] capability (with [`Container`] as the stock one)
//! - The [`Router`] that classifies, resolves and invokes
//!
//! The runtime crate wires these to a transport; everything here can be used
//! on its own.

pub mod container;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod registry;
pub mod router;

#[cfg(test)]
mod test_support;

pub use container::Container;
pub use discovery::{
    Candidate, Construct, Declarations, Discovered, Discoverer, DiscoverySummary, HandlerSet,
    Instance,
};
pub use error::{
    ConstructError, DiscoveryError, DiscoveryFailed, HandlerError, HandlerSignatureError,
    RegistryError,
};
pub use handler::{FromPayload, HandlerDescriptor, HandlerFuture, IntoOutcome, InvokeFn};
pub use registry::{Registry, RegistryStats};
pub use router::{DropReason, RouteOutcome, Router, RouterOptions};
