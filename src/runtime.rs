//! Lifecycle of the shared executor and timer.
//!
//! The runtime is a scoped service, not an ambient fact of the process: it is
//! created by [`init_runtime`], looked up by the nodes that need to spawn or
//! schedule work, and torn down by [`shutdown_runtime`]. [`with_runtime`]
//! wraps the pair for scoped use and releases on every exit path, panics
//! included.

mod executor;

pub use executor::{Executor, TimerHandle};

use crate::errors::RuntimeError;
use or_poisoned::OrPoisoned;
use std::sync::RwLock;

static CURRENT: RwLock<Option<Runtime>> = RwLock::new(None);

/// A handle to the active runtime services.
///
/// Cloning is cheap; clones share the same worker pool and timer. A clone
/// held across [`shutdown_runtime`] keeps those services alive until it is
/// dropped, but new lookups through [`Runtime::current`] fail as soon as the
/// shutdown happens.
#[derive(Clone, Debug)]
pub struct Runtime {
    executor: Executor,
}

impl Runtime {
    fn new() -> Self {
        Self {
            executor: Executor::new(),
        }
    }

    /// Returns the active runtime, or [`RuntimeError::NotInitialized`] when
    /// called outside an `init_runtime`/`shutdown_runtime` scope.
    pub fn current() -> Result<Runtime, RuntimeError> {
        CURRENT
            .read()
            .or_poisoned()
            .clone()
            .ok_or(RuntimeError::NotInitialized)
    }

    /// The executor this runtime submits work to.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

/// Creates the shared worker pool and timer.
///
/// Fails with [`RuntimeError::AlreadyInitialized`] if a runtime is already
/// active; the existing runtime is left untouched.
pub fn init_runtime() -> Result<(), RuntimeError> {
    let mut current = CURRENT.write().or_poisoned();
    if current.is_some() {
        return Err(RuntimeError::AlreadyInitialized);
    }
    *current = Some(Runtime::new());
    Ok(())
}

/// Releases the shared worker pool and timer.
///
/// Idempotent. In-flight pooled tasks are allowed to finish; pending timer
/// entries that have not fired are dropped.
pub fn shutdown_runtime() {
    let runtime = CURRENT.write().or_poisoned().take();
    if let Some(runtime) = runtime {
        runtime.executor.shutdown();
    }
}

/// Runs `fun` inside a runtime scope.
///
/// The runtime is initialized before `fun` runs and shut down when it
/// returns or unwinds. Long-running processes that want to manage the
/// lifecycle themselves use [`init_runtime`]/[`shutdown_runtime`] directly.
pub fn with_runtime<R>(fun: impl FnOnce() -> R) -> Result<R, RuntimeError> {
    init_runtime()?;

    struct ShutdownOnDrop;
    impl Drop for ShutdownOnDrop {
        fn drop(&mut self) {
            shutdown_runtime();
        }
    }

    let _guard = ShutdownOnDrop;
    Ok(fun())
}
