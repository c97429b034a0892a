use super::AnyDependent;
use core::{fmt::Debug, hash::Hash};
use std::sync::Arc;

/// Converts a node to its type-erased [`AnySource`].
pub trait ToAnySource {
    /// Converts this type to its type-erased equivalent.
    fn to_any_source(&self) -> AnySource;
}

/// The behavior of anything that can be depended upon (a cell, trigger,
/// derived cell, or the state of a resource): it keeps a set of weak
/// back-edges to its dependents.
pub trait Source: Send + Sync {
    /// Adds a dependent to this source's back-edge set.
    fn add_dependent(&self, dependent: AnyDependent);

    /// Removes a dependent from this source's back-edge set.
    fn remove_dependent(&self, dependent: &AnyDependent);

    /// Removes all dependents from this source's back-edge set.
    fn clear_dependents(&self);
}

/// A type-erased, reference-counted handle to a [`Source`].
///
/// Dependents hold these strongly: a dependency stays alive at least as long
/// as anything that needs to be notified of its changes, which keeps
/// intermediate nodes in a chain reachable even when user code has dropped
/// its own handles to them.
///
/// Identity (`==`, hashing) is the address of the node's shared allocation.
#[derive(Clone)]
pub struct AnySource(pub(crate) usize, pub(crate) Arc<dyn Source + Send + Sync>);

impl AnySource {
    /// The node identity this source handle refers to.
    pub fn key(&self) -> usize {
        self.0
    }
}

impl Source for AnySource {
    fn add_dependent(&self, dependent: AnyDependent) {
        self.1.add_dependent(dependent);
    }

    fn remove_dependent(&self, dependent: &AnyDependent) {
        self.1.remove_dependent(dependent);
    }

    fn clear_dependents(&self) {
        self.1.clear_dependents();
    }
}

impl ToAnySource for AnySource {
    fn to_any_source(&self) -> AnySource {
        self.clone()
    }
}

impl Debug for AnySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnySource").field(&self.0).finish()
    }
}

impl Hash for AnySource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnySource {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnySource {}
