//! The dependency graph: who reads whom, and who gets told about it.
//!
//! The graph is not stored centrally. Each source owns the set of weak
//! back-edges to its dependents ([`DependentSet`]), and each dependent owns
//! the set of sources it read during its most recent computation
//! ([`SourceSet`]). A per-thread stack of computation contexts connects the
//! two: while a dependent's computation runs, every tracked read registers
//! an edge in both directions.
//!
//! Edges are weak from source to dependent and strong from dependent to
//! source, so the graph never keeps a dependent alive, while a dependency
//! chain stays reachable as long as its tail is.

mod dependent;
mod observer;
mod sets;
mod source;

pub use dependent::{AnyDependent, Dependent, ToAnyDependent};
pub(crate) use observer::Observer;
pub use sets::{DependentSet, SourceSet};
pub use source::{AnySource, Source, ToAnySource};

use or_poisoned::OrPoisoned;
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::RwLock,
};

/// Suspends reactive tracking while running the given function.
///
/// Reads inside `fun` do not register dependencies on the surrounding
/// computation. This can be used to read a cell inside a derived computation
/// or effect without re-running when that cell changes.
///
/// ```rust
/// use reactive_cells::{cell, derived, untrack};
///
/// let a = cell(0);
/// let b = cell(0);
/// let c = derived({
///     let (a, b) = (a.clone(), b.clone());
///     // this derived cell only re-runs when `a` changes
///     move || a.get() + untrack(|| b.get())
/// });
///
/// assert_eq!(c.get(), 0);
/// a.set(1);
/// assert_eq!(c.get(), 1);
/// b.set(10);
/// // stale: `b` was read untracked
/// assert_eq!(c.get(), 1);
/// a.set(2);
/// assert_eq!(c.get(), 12);
/// ```
pub fn untrack<T>(fun: impl FnOnce() -> T) -> T {
    let _frame = Observer::suspend();
    fun()
}

/// Walks a source's back-edges and tells each live dependent that the source
/// has changed.
///
/// The walk snapshots the set first, so dependents may subscribe or
/// unsubscribe while it runs. Stale edges (whose dependent has been dropped)
/// are pruned afterwards. A panicking dependent is logged and does not stop
/// delivery to the others.
pub(crate) fn notify_dependents(set: &RwLock<DependentSet>) {
    let snapshot = set.read().or_poisoned().clone();
    if snapshot.is_empty() {
        return;
    }

    let mut stale = Vec::new();
    for dependent in &snapshot {
        match dependent.upgrade() {
            Some(live) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    live.on_dependency_changed()
                }));
                if outcome.is_err() {
                    tracing::error!(
                        dependent = dependent.key(),
                        "dependent panicked while handling a change \
                         notification"
                    );
                }
            }
            None => stale.push(dependent.clone()),
        }
    }

    if !stale.is_empty() {
        let mut set = set.write().or_poisoned();
        for dependent in &stale {
            set.remove(dependent);
        }
    }
}
