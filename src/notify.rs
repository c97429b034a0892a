//! Per-node coordination of the two notification phases: direct watchers
//! first, then graph dependents.

use crate::graph::{self, DependentSet};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    RwLock,
};

/// Re-entrancy guard for a node's notification pass.
///
/// A watcher that writes back into the node it is watching would otherwise
/// start a second pass from inside the first, and loop forever. While a pass
/// is in progress, further passes for the same node return immediately; the
/// write itself still lands, and dependents observe the latest value when
/// they recompute.
#[derive(Debug, Default)]
pub(crate) struct Notifier {
    notifying: AtomicBool,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one notification pass: `direct` (the node's own watcher list),
    /// then the dependent walk. Suppressed if a pass is already running.
    ///
    /// The flag is cleared on all exit paths, including unwinding out of a
    /// watcher list that failed to isolate a panic.
    pub fn notify(&self, direct: impl FnOnce(), dependents: &RwLock<DependentSet>) {
        if self.notifying.swap(true, Ordering::AcqRel) {
            return;
        }
        let _reset = ResetOnDrop(&self.notifying);

        direct();
        graph::notify_dependents(dependents);
    }
}

struct ResetOnDrop<'a>(&'a AtomicBool);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
