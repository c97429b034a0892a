//! Stateless reactive event sources.

use crate::{
    graph::{AnyDependent, AnySource, DependentSet, Source, ToAnySource},
    notify::Notifier,
    subscribe::{Subscription, SubscriptionList},
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock};

type FireListener = dyn Fn() + Send + Sync;

/// A data-less reactive node whose only job is to announce that something
/// happened.
///
/// A trigger carries no value, so there is no cache and no equality gate:
/// every [`fire`](Trigger::fire) reaches watchers and dependents. Use it to
/// fold external events (a timer tick, an invalidation message) into the
/// graph.
///
/// ```rust
/// use reactive_cells::{derived, trigger, Track};
/// use std::sync::{
///     atomic::{AtomicUsize, Ordering},
///     Arc,
/// };
///
/// let refresh = trigger();
/// let runs = Arc::new(AtomicUsize::new(0));
/// let version = derived({
///     let (refresh, runs) = (refresh.clone(), Arc::clone(&runs));
///     move || {
///         refresh.track();
///         runs.fetch_add(1, Ordering::Relaxed) + 1
///     }
/// });
///
/// assert_eq!(version.get(), 1);
/// assert_eq!(version.get(), 1);
/// refresh.fire();
/// assert_eq!(version.get(), 2);
/// ```
pub struct Trigger {
    inner: Arc<TriggerInner>,
}

struct TriggerInner {
    dependents: RwLock<DependentSet>,
    watchers: SubscriptionList<FireListener>,
    notifier: Notifier,
}

impl Clone for Trigger {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Trigger {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl Default for Trigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger {
    /// Creates a new trigger.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TriggerInner {
                dependents: RwLock::new(DependentSet::new()),
                watchers: SubscriptionList::new(),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Fires the trigger, notifying watchers and then dependents.
    ///
    /// Re-entrant fires from inside a watcher are suppressed.
    pub fn fire(&self) {
        self.inner.notifier.notify(
            || self.inner.watchers.notify(|listener| listener()),
            &self.inner.dependents,
        );
    }

    /// Subscribes a listener called on every fire.
    pub fn watch(
        &self,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.watchers.add(Box::new(listener))
    }
}

impl Source for TriggerInner {
    fn add_dependent(&self, dependent: AnyDependent) {
        self.dependents.write().or_poisoned().insert(dependent);
    }

    fn remove_dependent(&self, dependent: &AnyDependent) {
        self.dependents.write().or_poisoned().remove(dependent);
    }

    fn clear_dependents(&self) {
        self.dependents.write().or_poisoned().take();
    }
}

impl ToAnySource for Trigger {
    fn to_any_source(&self) -> AnySource {
        AnySource(
            Arc::as_ptr(&self.inner) as usize,
            Arc::clone(&self.inner) as Arc<dyn Source + Send + Sync>,
        )
    }
}
