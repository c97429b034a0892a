//! Direct watcher lists and their disposable handles.

use or_poisoned::OrPoisoned;
use std::{
    fmt::Debug,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

/// A thread-safe list of listeners of some closure type `L` (e.g.
/// `dyn Fn(&T, &T) + Send + Sync`).
///
/// Notification iterates over a snapshot, so listeners may be added or
/// disposed concurrently with a pass. Disposed entries are filtered out at
/// the start of the next pass; the disposed flag is re-checked immediately
/// before each invocation, so a listener disposed mid-pass from another
/// thread is invoked at most once more.
pub(crate) struct SubscriptionList<L: ?Sized> {
    entries: RwLock<Vec<Arc<Entry<L>>>>,
}

struct Entry<L: ?Sized> {
    disposed: AtomicBool,
    listener: Box<L>,
}

impl<L: ?Sized> Default for SubscriptionList<L> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized + Send + Sync + 'static> SubscriptionList<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener and returns the handle that unsubscribes it.
    pub fn add(&self, listener: Box<L>) -> Subscription {
        let entry = Arc::new(Entry {
            disposed: AtomicBool::new(false),
            listener,
        });
        self.entries.write().or_poisoned().push(Arc::clone(&entry));
        Subscription {
            entry: entry as Arc<dyn Disposable + Send + Sync>,
        }
    }

    /// Invokes every live listener through `invoke`.
    ///
    /// A panicking listener is logged and skipped; it never affects delivery
    /// to the others and never propagates to the writer that triggered the
    /// pass.
    pub fn notify(&self, invoke: impl Fn(&L)) {
        let snapshot: Vec<Arc<Entry<L>>> = {
            let mut entries = self.entries.write().or_poisoned();
            entries.retain(|entry| !entry.disposed.load(Ordering::Acquire));
            entries.clone()
        };

        for entry in snapshot {
            if entry.disposed.load(Ordering::Acquire) {
                continue;
            }
            let outcome =
                catch_unwind(AssertUnwindSafe(|| invoke(&entry.listener)));
            if outcome.is_err() {
                tracing::error!("watcher panicked during notification");
            }
        }
    }

    /// Whether any listener is currently subscribed and not disposed.
    pub fn has_live(&self) -> bool {
        self.entries
            .read()
            .or_poisoned()
            .iter()
            .any(|entry| !entry.disposed.load(Ordering::Acquire))
    }
}

impl<L: ?Sized> Debug for SubscriptionList<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionList")
            .field("len", &self.entries.read().or_poisoned().len())
            .finish()
    }
}

trait Disposable {
    fn mark_disposed(&self);
}

impl<L: ?Sized + Send + Sync> Disposable for Entry<L> {
    fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

/// A handle to one registered watcher.
///
/// Dropping the handle does *not* unsubscribe; call [`dispose`] explicitly.
/// Disposal is idempotent, and after it returns the watcher is invoked at
/// most once more (only if a notification pass on another thread had already
/// passed the disposal check).
///
/// [`dispose`]: Subscription::dispose
#[derive(Clone)]
pub struct Subscription {
    entry: Arc<dyn Disposable + Send + Sync>,
}

impl Subscription {
    /// Unsubscribes the watcher. Idempotent; never panics.
    pub fn dispose(&self) {
        self.entry.mark_disposed();
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}
