//! Writable reactive value holders.

use crate::{
    cache::BoundedCache,
    derived::DerivedCell,
    graph::{AnySource, DependentSet, Source, ToAnySource},
    notify::Notifier,
    subscribe::{Subscription, SubscriptionList},
    traits::{Readable, Track},
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::{
    hash::Hash,
    mem,
    sync::{Arc, Mutex, RwLock},
};

/// Listener signature for value changes: `(old, new)`.
pub(crate) type ChangeListener<T> = dyn Fn(&T, &T) + Send + Sync;

/// A writable reactive value.
///
/// Reads through [`get`](Cell::get) register the cell as a dependency of the
/// surrounding computation; writes through [`set`](Cell::set) and
/// [`update`](Cell::update) notify watchers and dependents, but only when the
/// value actually changed by `PartialEq`.
///
/// This is a reference-counted handle: clones share the same slot.
///
/// ```rust
/// use reactive_cells::{cell, derived};
///
/// let count = cell(1);
/// let double = derived({
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(double.get(), 2);
/// count.set(2);
/// assert_eq!(double.get(), 4);
/// ```
pub struct Cell<T> {
    inner: Arc<CellInner<T>>,
}

pub(crate) struct CellInner<T> {
    value: RwLock<T>,
    dependents: RwLock<DependentSet>,
    watchers: SubscriptionList<ChangeListener<T>>,
    notifier: Notifier,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Cell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cell")
            .field("type", &std::any::type_name::<T>())
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl<T> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for Cell<T> {}

impl<T> Hash for Cell<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl<T: Default + Send + Sync + 'static> Default for Cell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Send + Sync + 'static> Cell<T> {
    /// Creates a new cell with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: RwLock::new(value),
                dependents: RwLock::new(DependentSet::new()),
                watchers: SubscriptionList::new(),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Applies `fun` to the current value, registering the cell as a
    /// dependency. Clone-free counterpart of [`get`](Cell::get).
    pub fn with<U>(&self, fun: impl FnOnce(&T) -> U) -> U {
        self.track();
        self.with_value(fun)
    }

    /// Applies `fun` to the current value without tracking.
    pub fn with_value<U>(&self, fun: impl FnOnce(&T) -> U) -> U {
        fun(&self.inner.value.read().or_poisoned())
    }
}

impl<T: Clone + Send + Sync + 'static> Cell<T> {
    /// Clones the current value, registering the cell as a dependency of the
    /// surrounding computation.
    pub fn get(&self) -> T {
        self.track();
        self.peek()
    }

    /// Clones the current value without tracking.
    pub fn peek(&self) -> T {
        self.inner.value.read().or_poisoned().clone()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Cell<T> {
    /// Replaces the value. Watchers and dependents are notified only when
    /// the new value differs from the old one.
    pub fn set(&self, value: T) {
        let old = {
            let mut slot = self.inner.value.write().or_poisoned();
            if *slot == value {
                return;
            }
            mem::replace(&mut *slot, value.clone())
        };
        self.inner.notify_changed(&old, &value);
    }

    /// Replaces the value with `fun(current)`. The same equality gate as
    /// [`set`](Cell::set) applies.
    ///
    /// The slot's write lock is held across `fun`, so the read-modify-write
    /// is atomic with respect to concurrent writers.
    pub fn update(&self, fun: impl FnOnce(&T) -> T) {
        let (old, new) = {
            let mut slot = self.inner.value.write().or_poisoned();
            let new = fun(&slot);
            if *slot == new {
                return;
            }
            (mem::replace(&mut *slot, new.clone()), new)
        };
        self.inner.notify_changed(&old, &new);
    }

    /// Subscribes to value changes. The listener receives the new value.
    pub fn watch(
        &self,
        listener: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription {
        self.watch_with_prev(move |_old, new| listener(new))
    }

    /// Subscribes to value changes with access to the old and new values.
    pub fn watch_with_prev(
        &self,
        listener: impl Fn(&T, &T) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.watchers.add(Box::new(listener))
    }

    /// Derives a read-only cell by applying `fun` to this cell's value.
    pub fn map<U>(
        &self,
        fun: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> DerivedCell<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        let this = self.clone();
        DerivedCell::new(move || this.with(&fun))
    }

    /// Derives a cell whose value follows the *inner* node selected by this
    /// cell's value.
    ///
    /// `fun` maps an outer value to a readable node; the mapping is memoised
    /// in a bounded LRU cache, so it is invoked at most once per cached
    /// outer value. Reading the inner node inside the derived computation
    /// makes it a dynamic dependency: when the outer value changes, the
    /// derived cell switches which inner node it re-runs for.
    pub fn flat_map<U, R>(
        &self,
        fun: impl Fn(&T) -> R + Send + Sync + 'static,
    ) -> DerivedCell<U>
    where
        T: Eq + Hash,
        U: Clone + PartialEq + Send + Sync + 'static,
        R: Readable<U> + 'static,
    {
        let this = self.clone();
        let cache: Mutex<BoundedCache<T, Arc<R>>> =
            Mutex::new(BoundedCache::with_default_capacity());
        DerivedCell::new(move || {
            let outer = this.get();
            let inner = cache
                .lock()
                .or_poisoned()
                .get_or_insert_with(outer.clone(), || Arc::new(fun(&outer)));
            inner.get()
        })
    }

    /// Creates an independent cell holding a copy of the current value.
    pub fn copied(&self) -> Cell<T> {
        Cell::new(self.peek())
    }
}

impl<T: 'static> CellInner<T> {
    fn notify_changed(&self, old: &T, new: &T) {
        self.notifier.notify(
            || self.watchers.notify(|listener| listener(old, new)),
            &self.dependents,
        );
    }
}

impl<T: Send + Sync> Source for CellInner<T> {
    fn add_dependent(&self, dependent: crate::graph::AnyDependent) {
        self.dependents.write().or_poisoned().insert(dependent);
    }

    fn remove_dependent(&self, dependent: &crate::graph::AnyDependent) {
        self.dependents.write().or_poisoned().remove(dependent);
    }

    fn clear_dependents(&self) {
        self.dependents.write().or_poisoned().take();
    }
}

impl<T: Send + Sync + 'static> ToAnySource for Cell<T> {
    fn to_any_source(&self) -> AnySource {
        AnySource(
            Arc::as_ptr(&self.inner) as usize,
            Arc::clone(&self.inner) as Arc<dyn Source + Send + Sync>,
        )
    }
}

impl<T: Clone + Send + Sync + 'static> Readable<T> for Cell<T> {
    fn get(&self) -> T {
        Cell::get(self)
    }

    fn peek(&self) -> T {
        Cell::peek(self)
    }
}
