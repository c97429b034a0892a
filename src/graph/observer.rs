use super::AnyDependent;
use std::cell::RefCell;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Option<AnyDependent>>> =
        const { RefCell::new(Vec::new()) };
}

/// The current reactive observer.
///
/// The observer is whatever dependent is currently running a tracked
/// computation on this thread. While a derived cell recomputes, an effect
/// runs, or a resource executes the synchronous portion of its fetcher, that
/// dependent sits on top of the context stack, and every tracked read
/// registers a dependency edge against it.
///
/// Nested computations push nested frames, so an inner recomputation only
/// collects its own reads. A `None` frame suspends tracking without
/// forgetting the frames below it (see [`untrack`](super::untrack)).
pub struct Observer;

impl Observer {
    /// Returns the dependent currently collecting dependencies, if any.
    pub fn get() -> Option<AnyDependent> {
        CONTEXT_STACK
            .with_borrow(|stack| stack.last().cloned().flatten())
    }

    /// Whether the given node identity is anywhere on this thread's context
    /// stack, i.e. currently being recomputed by the present call chain.
    pub fn is_on_stack(id: usize) -> bool {
        CONTEXT_STACK.with_borrow(|stack| {
            stack
                .iter()
                .any(|frame| frame.as_ref().is_some_and(|dep| dep.key() == id))
        })
    }

    /// Pushes a tracking context for `dependent`. Dependencies read until the
    /// returned guard is dropped are attributed to it.
    ///
    /// Callers clear the dependent's previous source set *before* pushing, so
    /// that the set installed when the guard drops is exactly the set read
    /// during this computation.
    #[must_use]
    pub fn enter(dependent: AnyDependent) -> ObserverGuard {
        CONTEXT_STACK.with_borrow_mut(|stack| stack.push(Some(dependent)));
        ObserverGuard { _private: () }
    }

    /// Pushes a frame that suspends tracking until the guard is dropped.
    #[must_use]
    pub fn suspend() -> ObserverGuard {
        CONTEXT_STACK.with_borrow_mut(|stack| stack.push(None));
        ObserverGuard { _private: () }
    }
}

/// Pops the context frame pushed by [`Observer::enter`] or
/// [`Observer::suspend`] when dropped, including during unwinding.
pub struct ObserverGuard {
    _private: (),
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with_borrow_mut(|stack| {
            stack.pop();
        });
    }
}
