//! Read-only reactive values computed from other nodes.

use crate::{
    cache::BoundedCache,
    cell::ChangeListener,
    errors::CycleError,
    graph::{
        self, AnyDependent, AnySource, Dependent, DependentSet, Observer,
        Source, SourceSet, ToAnyDependent, ToAnySource,
    },
    notify::Notifier,
    runtime::Runtime,
    subscribe::{Subscription, SubscriptionList},
    traits::{Readable, Track},
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::{
    hash::Hash,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, RwLock, Weak},
};

/// Recomputation policy for a [`DerivedCell`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivedMode {
    /// Recompute on the next read after a dependency change.
    Lazy,
    /// Recompute in the background as soon as a dependency changes, so
    /// readers and watchers see a materialised value without asking.
    Eager,
}

/// A read-only reactive value, computed lazily from other nodes and cached.
///
/// The dependencies of the computation are whatever it *actually read* last
/// time it ran: a computation that branches between sources re-tracks on
/// every run, so changes to the untaken branch stop causing recomputation.
///
/// A derived cell with at least one live watcher (or constructed with
/// [`DerivedMode::Eager`]) recomputes in the background when a dependency
/// changes; otherwise it recomputes on the next read.
///
/// This is a reference-counted handle: clones share the same cache.
pub struct DerivedCell<T> {
    inner: Arc<DerivedInner<T>>,
}

struct DerivedInner<T> {
    fun: Box<dyn Fn() -> T + Send + Sync>,
    state: RwLock<DerivedState<T>>,
    sources: RwLock<SourceSet>,
    dependents: RwLock<DependentSet>,
    watchers: SubscriptionList<ChangeListener<T>>,
    notifier: Notifier,
    mode: DerivedMode,
    weak_self: Weak<DerivedInner<T>>,
}

struct DerivedState<T> {
    value: Option<T>,
    dirty: bool,
    computing: bool,
}

impl<T> Clone for DerivedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for DerivedCell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedCell")
            .field("type", &std::any::type_name::<T>())
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl<T> PartialEq for DerivedCell<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Eq for DerivedCell<T> {}

impl<T> Hash for DerivedCell<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DerivedCell<T> {
    /// Creates a lazy derived cell over a pure computation.
    pub fn new(fun: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::with_mode(fun, DerivedMode::Lazy)
    }

    /// Creates a derived cell with the given recomputation policy.
    ///
    /// An eager cell additionally schedules its first materialisation right
    /// away when a runtime is active.
    pub fn with_mode(
        fun: impl Fn() -> T + Send + Sync + 'static,
        mode: DerivedMode,
    ) -> Self {
        let inner = Arc::new_cyclic(|weak| DerivedInner {
            fun: Box::new(fun),
            state: RwLock::new(DerivedState {
                value: None,
                dirty: true,
                computing: false,
            }),
            sources: RwLock::new(SourceSet::new()),
            dependents: RwLock::new(DependentSet::new()),
            watchers: SubscriptionList::new(),
            notifier: Notifier::new(),
            mode,
            weak_self: Weak::clone(weak),
        });
        let this = Self { inner };
        if mode == DerivedMode::Eager {
            this.inner.schedule_materialise();
        }
        this
    }

    /// Clones the current value, recomputing first if a dependency changed
    /// since the last run. Registers this cell as a dependency of the
    /// surrounding computation.
    ///
    /// # Panics
    /// Panics with [`CycleError`] if the computation reads itself, directly
    /// or transitively. Use [`try_get`](Self::try_get) for a fallible read.
    pub fn get(&self) -> T {
        self.try_get()
            .unwrap_or_else(|err| std::panic::panic_any(err))
    }

    /// Fallible counterpart of [`get`](Self::get).
    pub fn try_get(&self) -> Result<T, CycleError> {
        // the cycle check must come first: tracking a node that is already
        // recomputing on this call chain would register a self-edge
        if Observer::is_on_stack(self.inner.id()) {
            return Err(CycleError);
        }
        self.track();
        self.inner.read_or_recompute()
    }

    /// Clones the current value without registering a dependency, still
    /// recomputing first if dirty.
    pub fn peek(&self) -> T {
        self.try_peek()
            .unwrap_or_else(|err| std::panic::panic_any(err))
    }

    /// Fallible counterpart of [`peek`](Self::peek).
    pub fn try_peek(&self) -> Result<T, CycleError> {
        if Observer::is_on_stack(self.inner.id()) {
            return Err(CycleError);
        }
        self.inner.read_or_recompute()
    }

    /// Applies `fun` to the current value, registering this cell as a
    /// dependency.
    pub fn with<U>(&self, fun: impl FnOnce(&T) -> U) -> U {
        fun(&self.get())
    }

    /// Applies `fun` to the current value without tracking.
    pub fn with_value<U>(&self, fun: impl FnOnce(&T) -> U) -> U {
        fun(&self.peek())
    }

    /// Forces the cache stale and notifies dependents, as if a dependency
    /// had changed. Useful when the computation reads something outside the
    /// graph.
    pub fn invalidate(&self) {
        self.inner.state.write().or_poisoned().dirty = true;
        graph::notify_dependents(&self.inner.dependents);
        if self.inner.is_eager() {
            self.inner.schedule_materialise();
        }
    }

    /// Subscribes to value changes. The listener receives the new value.
    ///
    /// A derived cell with a live watcher recomputes eagerly: the listener
    /// is called with the new value (when it differs) without anyone
    /// explicitly reading the cell.
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

    /// Derives a further cell by applying `fun` to this cell's value.
    pub fn map<U>(
        &self,
        fun: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> DerivedCell<U>
    where
        U: Clone + PartialEq + Send + Sync + 'static,
    {
        let this = self.clone();
        DerivedCell::new(move || fun(&this.get()))
    }

    /// Derives a cell that follows the inner node selected by this cell's
    /// value; see [`Cell::flat_map`](crate::Cell::flat_map).
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
}

impl<T: Clone + PartialEq + Send + Sync + 'static> DerivedInner<T> {
    fn id(&self) -> usize {
        self as *const Self as *const () as usize
    }

    fn is_eager(&self) -> bool {
        self.mode == DerivedMode::Eager || self.watchers.has_live()
    }

    /// Fast path under the read lock; falls through to a recomputation when
    /// the cache is stale.
    fn read_or_recompute(&self) -> Result<T, CycleError> {
        {
            let state = self.state.read().or_poisoned();
            if !state.dirty {
                if let Some(value) = &state.value {
                    return Ok(value.clone());
                }
            }
        }
        self.recompute()
    }

    /// Runs the computation under the per-node write lock.
    ///
    /// The lock serialises recomputation but is not held by clean readers.
    /// Tracked reads inside the computation touch only the separate source
    /// and dependent locks, never this one.
    fn recompute(&self) -> Result<T, CycleError> {
        let mut state = self.state.write().or_poisoned();
        // another thread may have recomputed while we waited for the lock
        if !state.dirty {
            if let Some(value) = &state.value {
                return Ok(value.clone());
            }
        }

        debug_assert!(
            !state.computing,
            "recomputation is serialised by the state write lock"
        );
        state.computing = true;
        let this = self.to_any_dependent();
        this.clear_sources(&this);
        let result = {
            let _frame = Observer::enter(this);
            catch_unwind(AssertUnwindSafe(|| (self.fun)()))
        };

        match result {
            Ok(new_value) => {
                let old = state.value.replace(new_value.clone());
                state.dirty = false;
                state.computing = false;
                drop(state);

                if let Some(old) = old {
                    if old != new_value {
                        self.notifier.notify(
                            || {
                                self.watchers.notify(|listener| {
                                    listener(&old, &new_value)
                                })
                            },
                            &self.dependents,
                        );
                    }
                }
                Ok(new_value)
            }
            Err(payload) => {
                // leave the cache dirty so the next read retries; a cycle
                // detected further down surfaces here as a typed payload
                state.computing = false;
                drop(state);
                match payload.downcast::<CycleError>() {
                    Ok(cycle) => Err(*cycle),
                    Err(other) => resume_unwind(other),
                }
            }
        }
    }

    /// Submits a background read so the new value is materialised before
    /// watchers or readers ask for it. Without an active runtime the cell
    /// simply stays lazy.
    fn schedule_materialise(&self) {
        let Ok(runtime) = Runtime::current() else {
            tracing::trace!(
                "no active runtime; eager derived cell will recompute on \
                 next read"
            );
            return;
        };
        let Some(inner) = self.weak_self.upgrade() else {
            return;
        };
        runtime.executor().submit(move || {
            let cell = DerivedCell { inner };
            if let Err(err) = cell.try_peek() {
                tracing::error!(%err, "background recomputation failed");
            }
        });
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Dependent
    for DerivedInner<T>
{
    fn on_dependency_changed(&self) {
        let became_dirty = {
            let mut state = self.state.write().or_poisoned();
            !std::mem::replace(&mut state.dirty, true)
        };
        // only the transition propagates: if we were already dirty, our
        // dependents have already been told the value may have changed
        if became_dirty {
            graph::notify_dependents(&self.dependents);
            if self.is_eager() {
                self.schedule_materialise();
            }
        }
    }

    fn add_source(&self, source: AnySource) {
        self.sources.write().or_poisoned().insert(source);
    }

    fn clear_sources(&self, this: &AnyDependent) {
        self.sources.write().or_poisoned().clear_sources(this);
    }
}

impl<T: Send + Sync> Source for DerivedInner<T> {
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

impl<T: Clone + PartialEq + Send + Sync + 'static> ToAnySource
    for DerivedCell<T>
{
    fn to_any_source(&self) -> AnySource {
        AnySource(
            Arc::as_ptr(&self.inner) as usize,
            Arc::clone(&self.inner) as Arc<dyn Source + Send + Sync>,
        )
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ToAnyDependent
    for DerivedInner<T>
{
    fn to_any_dependent(&self) -> AnyDependent {
        AnyDependent(
            self.id(),
            self.weak_self.clone() as Weak<dyn Dependent + Send + Sync>,
        )
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Readable<T>
    for DerivedCell<T>
{
    fn get(&self) -> T {
        DerivedCell::get(self)
    }

    fn peek(&self) -> T {
        DerivedCell::peek(self)
    }
}
