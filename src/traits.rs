//! The capability traits shared by the node types.
//!
//! Each node also exposes these operations as inherent methods; the traits
//! exist so that generic code (like [`flat_map`](crate::Cell::flat_map)'s
//! inner nodes) can read any node kind through one interface.

use crate::graph::{Dependent, Observer, Source, ToAnySource};

/// Registers a node as a dependency of the computation currently running on
/// this thread, if there is one.
///
/// Blanket-implemented for every node that can produce a type-erased source
/// handle. Tracking records the edge in both directions: a weak back-edge
/// from the source to the observing dependent, and a strong entry in the
/// dependent's source set.
pub trait Track {
    /// Tracks this node in the current computation context.
    fn track(&self);
}

impl<T: ToAnySource> Track for T {
    fn track(&self) {
        if let Some(dependent) = Observer::get() {
            let source = self.to_any_source();
            source.add_dependent(dependent.clone());
            dependent.add_source(source);
        }
    }
}

/// A readable reactive value of type `T`.
///
/// [`get`](Readable::get) participates in dependency tracking;
/// [`peek`](Readable::peek) does not.
pub trait Readable<T>: Send + Sync {
    /// Clones the current value, registering it as a dependency of the
    /// surrounding computation.
    fn get(&self) -> T;

    /// Clones the current value without tracking.
    fn peek(&self) -> T;
}
