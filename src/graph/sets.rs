//! The sets of sources and dependents affiliated with a reactive node.
//!
//! Both are insertion-ordered, identity-keyed sets. The fan-in and fan-out of
//! a node are usually small, and keeping insertion order makes notification
//! order match read order, which is easier to reason about when dependents
//! have side effects.

use super::{AnyDependent, AnySource, Source};
use indexmap::IndexSet;
use rustc_hash::FxHasher;
use std::{hash::BuildHasherDefault, mem};

type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// The sources a dependent read during its most recent computation.
///
/// Entries are strong handles; see [`AnySource`].
#[derive(Default, Clone, Debug)]
pub struct SourceSet(FxIndexSet<AnySource>);

impl SourceSet {
    /// Creates an empty source set.
    pub fn new() -> Self {
        Self(Default::default())
    }

    /// Records a source, deduplicated by node identity.
    pub fn insert(&mut self, source: AnySource) {
        self.0.insert(source);
    }

    /// Takes the current set, leaving this one empty.
    pub fn take(&mut self) -> FxIndexSet<AnySource> {
        mem::take(&mut self.0)
    }

    /// The number of distinct sources currently recorded.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no sources are recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes `dependent`'s back-edge from every recorded source, emptying
    /// the set. This is the "clear before re-track" half of dynamic
    /// dependency switching.
    pub fn clear_sources(&mut self, dependent: &AnyDependent) {
        for source in self.take() {
            source.remove_dependent(dependent);
        }
    }
}

impl IntoIterator for SourceSet {
    type Item = AnySource;
    type IntoIter = <FxIndexSet<AnySource> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a SourceSet {
    type Item = &'a AnySource;
    type IntoIter = <&'a FxIndexSet<AnySource> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The weak back-edges from a source to its dependents.
#[derive(Debug, Default, Clone)]
pub struct DependentSet(FxIndexSet<AnyDependent>);

impl DependentSet {
    /// Creates an empty dependent set.
    pub fn new() -> Self {
        Self(FxIndexSet::with_capacity_and_hasher(2, Default::default()))
    }

    /// Registers a dependent, deduplicated by node identity.
    pub fn insert(&mut self, dependent: AnyDependent) {
        self.0.insert(dependent);
    }

    /// Removes a dependent.
    ///
    /// Uses a shifting removal rather than a swap so the remaining dependents
    /// keep their registration order: nested dependents may rely on an outer
    /// one having been notified first.
    pub fn remove(&mut self, dependent: &AnyDependent) {
        self.0.shift_remove(dependent);
    }

    /// Takes the current set, leaving this one empty.
    pub fn take(&mut self) -> FxIndexSet<AnyDependent> {
        mem::take(&mut self.0)
    }

    /// The number of registered back-edges, live or stale.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no back-edges are registered.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for DependentSet {
    type Item = AnyDependent;
    type IntoIter = <FxIndexSet<AnyDependent> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DependentSet {
    type Item = &'a AnyDependent;
    type IntoIter = <&'a FxIndexSet<AnyDependent> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
