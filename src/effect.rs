//! Side effects that re-run when their reactive reads change.

use crate::graph::{
    AnyDependent, AnySource, Dependent, Observer, SourceSet, ToAnyDependent,
};
use core::fmt::{Debug, Formatter};
use or_poisoned::OrPoisoned;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, RwLock, Weak,
};

/// A running reactive effect.
///
/// Created by [`effect`](crate::effect). The body runs once immediately;
/// afterwards it re-runs (synchronously, on the notifying thread) whenever a
/// node it read during its previous run changes. Each run re-tracks from
/// scratch, so conditional reads switch dependencies just like a derived
/// cell's.
///
/// Keep the handle alive for as long as the effect should respond: the graph
/// holds only weak references to it, so dropping the last handle retires the
/// effect. Call [`dispose`](Effect::dispose) to retire it deterministically.
///
/// ```rust
/// use reactive_cells::{cell, effect};
/// use std::sync::{Arc, Mutex};
///
/// let value = cell(0);
/// let log = Arc::new(Mutex::new(Vec::new()));
/// let handle = effect({
///     let (value, log) = (value.clone(), Arc::clone(&log));
///     move || log.lock().unwrap().push(value.get())
/// });
///
/// value.set(1);
/// value.set(2);
/// assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
///
/// handle.dispose();
/// value.set(3);
/// assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    body: Box<dyn Fn() + Send + Sync>,
    disposed: AtomicBool,
    sources: RwLock<SourceSet>,
    weak_self: Weak<EffectInner>,
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("disposed", &self.inner.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Effect {
    /// Registers `body` as a reactive effect and runs it once.
    ///
    /// The first run happens on the calling thread before this returns, so
    /// its panics propagate to the caller. Re-runs triggered by dependency
    /// changes are isolated by the notification walk instead.
    pub fn new(body: impl Fn() + Send + Sync + 'static) -> Self {
        let inner = Arc::new_cyclic(|weak| EffectInner {
            body: Box::new(body),
            disposed: AtomicBool::new(false),
            sources: RwLock::new(SourceSet::new()),
            weak_self: Weak::clone(weak),
        });
        inner.run();
        Self { inner }
    }

    /// Stops the effect and removes its back-edges from the graph.
    ///
    /// Idempotent. After this returns, dependency changes no longer re-run
    /// the body.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            let this = self.inner.to_any_dependent();
            this.clear_sources(&this);
        }
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }
}

impl EffectInner {
    fn run(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let this = self.to_any_dependent();
        this.clear_sources(&this);
        let _frame = Observer::enter(this);
        (self.body)();
    }
}

impl Dependent for EffectInner {
    fn on_dependency_changed(&self) {
        if let Some(this) = self.weak_self.upgrade() {
            this.run();
        }
    }

    fn add_source(&self, source: AnySource) {
        self.sources.write().or_poisoned().insert(source);
    }

    fn clear_sources(&self, this: &AnyDependent) {
        self.sources.write().or_poisoned().clear_sources(this);
    }
}

impl ToAnyDependent for EffectInner {
    fn to_any_dependent(&self) -> AnyDependent {
        AnyDependent(
            self as *const Self as usize,
            self.weak_self.clone() as Weak<dyn Dependent + Send + Sync>,
        )
    }
}
