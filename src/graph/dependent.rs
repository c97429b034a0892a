use super::AnySource;
use core::{fmt::Debug, hash::Hash};
use std::sync::Weak;

/// Converts a node to its type-erased [`AnyDependent`].
pub trait ToAnyDependent {
    /// Converts this type to its type-erased equivalent.
    fn to_any_dependent(&self) -> AnyDependent;
}

/// Anything that consumes values from sources: a derived cell, a resource, or
/// an effect handle.
///
/// A dependent owns (strongly) the set of sources it read during its most
/// recent computation, so that it can remove its back-edges before the next
/// one re-collects them.
pub trait Dependent: Send + Sync {
    /// Called when a source this dependent read has (possibly) changed.
    ///
    /// Implementations must not assume any delivery order across sources;
    /// they re-read live values when they actually recompute.
    fn on_dependency_changed(&self);

    /// Records a source read during this dependent's current computation.
    fn add_source(&self, source: AnySource);

    /// Removes this dependent's back-edges from all of its current sources
    /// and empties its source set.
    fn clear_sources(&self, this: &AnyDependent);
}

/// A type-erased, weakly-held handle to a [`Dependent`].
///
/// Sources hold these in their back-edge sets. The reference is weak so the
/// graph never extends a dependent's lifetime: once user code drops the last
/// strong handle, the edge goes stale and is pruned on the next notification
/// walk.
///
/// Identity (`==`, hashing) is the address of the dependent's shared
/// allocation, and matches the identity of the same node's [`AnySource`].
#[derive(Clone)]
pub struct AnyDependent(
    pub(crate) usize,
    pub(crate) Weak<dyn Dependent + Send + Sync>,
);

impl AnyDependent {
    /// The node identity this dependent handle refers to.
    pub fn key(&self) -> usize {
        self.0
    }

    /// Upgrades to a strong handle, if the dependent is still alive.
    pub fn upgrade(&self) -> Option<std::sync::Arc<dyn Dependent + Send + Sync>> {
        self.1.upgrade()
    }
}

impl Dependent for AnyDependent {
    fn on_dependency_changed(&self) {
        if let Some(inner) = self.1.upgrade() {
            inner.on_dependency_changed();
        }
    }

    fn add_source(&self, source: AnySource) {
        if let Some(inner) = self.1.upgrade() {
            inner.add_source(source);
        }
    }

    fn clear_sources(&self, this: &AnyDependent) {
        if let Some(inner) = self.1.upgrade() {
            inner.clear_sources(this);
        }
    }
}

impl ToAnyDependent for AnyDependent {
    fn to_any_dependent(&self) -> AnyDependent {
        self.clone()
    }
}

impl Debug for AnyDependent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AnyDependent").field(&self.0).finish()
    }
}

impl Hash for AnyDependent {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialEq for AnyDependent {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for AnyDependent {}
