//! An implementation of a thread-safe, fine-grained reactive runtime.
//!
//! Fine-grained reactivity models the flow of data through a long-lived
//! application by composing a few kinds of reactive nodes:
//! 1. **Cells**: atomic units of state, which can be directly mutated.
//! 2. **Derived cells**: cached values computed from other nodes, which
//!    update when the nodes they read change.
//! 3. **Triggers**: stateless event sources usable as dependencies.
//! 4. **Resources**: asynchronous requests whose lifecycle (loading,
//!    success, error, cancellation) is itself reactive state.
//! 5. **Effects**: side effects that re-run when their reads change.
//!
//! Dependencies are not declared; they are *tracked*. While a derived cell,
//! resource fetcher, or effect runs, every read of another node registers a
//! dependency edge, and the set is rebuilt from scratch on every run. A
//! computation that branches between sources therefore stops re-running for
//! the branch it no longer takes.
//!
//! ```rust
//! use reactive_cells::{cell, derived};
//!
//! let count = cell(5);
//! let doubled = derived({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! assert_eq!(doubled.get(), 10);
//! count.set(10);
//! assert_eq!(doubled.get(), 20);
//! ```
//!
//! ## Design notes
//! - **Propagation is lazy where possible.** A write marks its dependents
//!   stale and they recompute when next read. A derived cell with a live
//!   watcher (or an eager mode) recomputes in the background instead, so
//!   watchers see new values without an explicit read.
//! - **Writes are equality-gated.** Setting a cell to an equal value
//!   notifies no one, which also makes steady states of write cycles
//!   stable.
//! - **The graph never owns your nodes.** Back-edges from a dependency to
//!   its dependents are weak; dropping the last user handle to an effect or
//!   derived cell retires it.
//! - **Async work is pooled.** [`init_runtime`] creates a worker pool plus a
//!   timer thread used for background recomputation, resource requests, and
//!   debounced fetches; [`shutdown_runtime`] releases them.

#![forbid(unsafe_code)]

pub mod cache;
pub mod cell;
pub mod derived;
pub mod effect;
pub mod errors;
pub mod graph;
mod notify;
pub mod resource;
pub mod runtime;
mod subscribe;
pub mod traits;
pub mod trigger;

pub use cell::Cell;
pub use derived::{DerivedCell, DerivedMode};
pub use effect::Effect;
pub use errors::{CycleError, RuntimeError};
pub use graph::untrack;
pub use resource::{
    FetchError, FetchFuture, FetchOutcome, FetchResult, ResourceCell,
    ResourceOptions, ResourceState, ResourceStatus,
};
pub use runtime::{
    init_runtime, shutdown_runtime, with_runtime, Executor, Runtime,
};
pub use subscribe::Subscription;
pub use traits::{Readable, Track};
pub use trigger::Trigger;

/// Reexports frequently-used traits.
pub mod prelude {
    pub use crate::traits::{Readable, Track};
}

use std::future::Future;

/// Creates a writable reactive cell with an initial value.
pub fn cell<T: Send + Sync + 'static>(initial: T) -> Cell<T> {
    Cell::new(initial)
}

/// Creates a lazy derived cell over a pure computation.
///
/// The computation must read its inputs through tracked reads ([`get`],
/// [`with`], [`track`]) for changes to propagate to it.
///
/// [`get`]: Cell::get
/// [`with`]: Cell::with
/// [`track`]: Track::track
pub fn derived<T, F>(fun: F) -> DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    DerivedCell::new(fun)
}

/// Creates an eager derived cell: it materialises in the background at
/// construction and after every dependency change, instead of waiting for
/// the next read. Requires an active runtime to actually run eagerly;
/// without one it degrades to lazy recomputation.
pub fn derived_eager<T, F>(fun: F) -> DerivedCell<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    DerivedCell::with_mode(fun, DerivedMode::Eager)
}

/// Creates a stateless trigger.
pub fn trigger() -> Trigger {
    Trigger::new()
}

/// Creates a resource over an asynchronous fetcher, with default options
/// (auto-fetch on construction, no debounce, shared executor).
///
/// Fails with [`RuntimeError::NotInitialized`] outside a runtime scope.
pub fn resource<T, Fut>(
    fetcher: impl Fn() -> Fut + Send + Sync + 'static,
) -> Result<ResourceCell<T>, RuntimeError>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
{
    ResourceCell::new(fetcher)
}

/// Creates a resource with explicit [`ResourceOptions`].
pub fn resource_with<T, Fut>(
    fetcher: impl Fn() -> Fut + Send + Sync + 'static,
    options: ResourceOptions,
) -> Result<ResourceCell<T>, RuntimeError>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    Fut: Future<Output = FetchResult<T>> + Send + 'static,
{
    ResourceCell::with_options(fetcher, options)
}

/// Registers a side effect that re-runs when its reactive reads change, and
/// runs it once immediately.
pub fn effect(body: impl Fn() + Send + Sync + 'static) -> Effect {
    Effect::new(body)
}
