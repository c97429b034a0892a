//! Error types for the reactive engine.

use thiserror::Error;

/// A derived cell's computation read itself, directly or transitively.
///
/// Returned by [`DerivedCell::try_get`](crate::DerivedCell::try_get) (and
/// panicked by [`get`](crate::DerivedCell::get)) on the first read that
/// closes the cycle. The cell is left dirty and not computing, so the graph
/// stays usable after the offending read path is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cycle detected: a derived cell's computation read its own value")]
pub struct CycleError;

/// Errors from the runtime lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// An operation that needs the shared executor or timer was called
    /// outside an `init_runtime`/`shutdown_runtime` scope.
    #[error("the reactive runtime has not been initialized")]
    NotInitialized,

    /// `init_runtime` was called while a runtime was already active.
    #[error("the reactive runtime is already initialized")]
    AlreadyInitialized,
}
