//! Reactive wrappers over asynchronous requests.

use crate::{
    cell::Cell,
    errors::RuntimeError,
    graph::{
        AnyDependent, AnySource, Dependent, Observer, SourceSet,
        ToAnyDependent, ToAnySource,
    },
    runtime::{Executor, Runtime, TimerHandle},
    subscribe::Subscription,
    traits::Readable,
};
use core::fmt::{Debug, Display, Formatter};
use futures::{
    channel::oneshot,
    future::{abortable, AbortHandle, BoxFuture, Shared},
    FutureExt,
};
use or_poisoned::OrPoisoned;
use pin_project_lite::pin_project;
use std::{
    future::Future,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, RwLock, Weak,
    },
    task::{Context, Poll},
    time::Duration,
};

/// The result type produced by a resource's fetcher.
pub type FetchResult<T> = Result<T, FetchError>;

/// An error produced by a fetch, carried in the resource's
/// [`Error`](ResourceStatus::Error) state.
///
/// Cheap to clone; never returned from [`ResourceCell::fetch`] itself.
#[derive(Clone)]
pub struct FetchError {
    message: Arc<str>,
}

impl FetchError {
    /// Wraps any displayable error.
    pub fn new(cause: impl Display) -> Self {
        Self {
            message: cause.to_string().into(),
        }
    }

    /// Creates an error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into().into(),
        }
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "fetch failed: {}", self.message)
    }
}

impl Debug for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FetchError").field(&self.message).finish()
    }
}

impl std::error::Error for FetchError {}

impl PartialEq for FetchError {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
    }
}

impl Eq for FetchError {}

/// The phase of a resource's request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    /// No request has run, or the resource was cancelled back to rest.
    Idle,
    /// A request is in flight.
    Loading,
    /// The latest request completed with data.
    Success,
    /// The latest request failed.
    Error,
    /// The latest request was cancelled before completing.
    Cancelled,
}

/// A snapshot of a resource: its status, the last-known-good data, and the
/// latest error, if any.
///
/// Every status keeps the last successfully fetched data, so a UI can keep
/// showing the previous result while a refresh is loading or after it
/// failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    status: ResourceStatus,
    data: Option<T>,
    error: Option<FetchError>,
}

impl<T> ResourceState<T> {
    /// The idle state with no data.
    pub fn idle() -> Self {
        Self {
            status: ResourceStatus::Idle,
            data: None,
            error: None,
        }
    }

    /// A successful state holding `data`.
    pub fn success(data: T) -> Self {
        Self {
            status: ResourceStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    /// The current status.
    pub fn status(&self) -> ResourceStatus {
        self.status
    }

    /// The last-known-good data, regardless of status.
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// The latest error, present in the `Error` state (and sometimes in
    /// `Cancelled`).
    pub fn error(&self) -> Option<&FetchError> {
        self.error.as_ref()
    }

    /// Whether the status is [`ResourceStatus::Idle`].
    pub fn is_idle(&self) -> bool {
        self.status == ResourceStatus::Idle
    }

    /// Whether the status is [`ResourceStatus::Loading`].
    pub fn is_loading(&self) -> bool {
        self.status == ResourceStatus::Loading
    }

    /// Whether the status is [`ResourceStatus::Success`].
    pub fn is_success(&self) -> bool {
        self.status == ResourceStatus::Success
    }

    /// Whether the status is [`ResourceStatus::Error`].
    pub fn is_error(&self) -> bool {
        self.status == ResourceStatus::Error
    }

    /// Whether the status is [`ResourceStatus::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        self.status == ResourceStatus::Cancelled
    }
}

impl<T: Clone> ResourceState<T> {
    fn to_loading(&self) -> Self {
        Self {
            status: ResourceStatus::Loading,
            data: self.data.clone(),
            error: None,
        }
    }

    fn to_error(&self, error: FetchError) -> Self {
        Self {
            status: ResourceStatus::Error,
            data: self.data.clone(),
            error: Some(error),
        }
    }

    fn to_cancelled(&self, error: Option<FetchError>) -> Self {
        Self {
            status: ResourceStatus::Cancelled,
            data: self.data.clone(),
            error,
        }
    }

    fn to_idle(&self) -> Self {
        Self {
            status: ResourceStatus::Idle,
            data: self.data.clone(),
            error: None,
        }
    }
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self::idle()
    }
}

/// How one request (or one debounced window of requests) ended.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    /// The request resolved with data.
    Success(T),
    /// The request failed.
    Error(FetchError),
    /// The request was cancelled or superseded before completing.
    Cancelled,
}

pin_project! {
    /// The completion future returned by [`ResourceCell::fetch`].
    ///
    /// Resolves once the underlying request succeeds, fails, or is
    /// cancelled/superseded. Within one debounce window every caller gets a
    /// clone of the same future, all resolving with the outcome of the
    /// single collapsed run. The request is driven by the executor, not by
    /// this future: dropping it never cancels anything.
    pub struct FetchFuture<T> {
        #[pin]
        inner: Shared<oneshot::Receiver<FetchOutcome<T>>>,
    }
}

impl<T> Clone for FetchFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Debug for FetchFuture<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchFuture").finish_non_exhaustive()
    }
}

impl<T: Clone> Future for FetchFuture<T> {
    type Output = FetchOutcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.project().inner.poll(cx).map(|result| match result {
            Ok(outcome) => outcome,
            // the sender side was dropped without reporting; treat it as a
            // cancellation (e.g. executor shut down mid-request)
            Err(oneshot::Canceled) => FetchOutcome::Cancelled,
        })
    }
}

/// Configuration accepted by [`resource_with`](crate::resource_with).
#[derive(Debug, Clone)]
pub struct ResourceOptions {
    /// Start a request immediately at construction (default `true`). The
    /// initial run also establishes the fetcher's dependency set.
    pub auto_fetch: bool,
    /// Collapse fetch requests arriving within this window into a single
    /// run, scheduled this long after the last request. Zero (the default)
    /// disables debouncing.
    pub debounce_delay: Duration,
    /// Where the request future and its continuation run. Defaults to the
    /// shared runtime pool.
    pub executor: Option<Executor>,
}

impl Default for ResourceOptions {
    fn default() -> Self {
        Self {
            auto_fetch: true,
            debounce_delay: Duration::ZERO,
            executor: None,
        }
    }
}

/// A reactive wrapper over an asynchronous request.
///
/// The fetcher runs with dependency tracking during its synchronous portion,
/// so reading other cells inside it makes the resource re-fetch when they
/// change. At most one request is in flight at a time: starting a new one
/// cancels the previous, and a late completion of a superseded request is
/// discarded rather than published.
///
/// State transitions are published through an inner [`Cell`], which gives
/// watchers and dependents of the resource the ordinary equality-gated
/// notification behavior.
///
/// This is a reference-counted handle: clones share the same state.
pub struct ResourceCell<T> {
    inner: Arc<ResourceInner<T>>,
}

struct ResourceInner<T> {
    fetcher: Box<dyn Fn() -> BoxFuture<'static, FetchResult<T>> + Send + Sync>,
    state: Cell<ResourceState<T>>,
    sources: RwLock<SourceSet>,
    generation: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
    window: Mutex<Option<DebounceWindow<T>>>,
    debounce: Duration,
    executor: Executor,
    weak_self: Weak<ResourceInner<T>>,
}

struct InFlight {
    generation: u64,
    abort: AbortHandle,
}

struct DebounceWindow<T> {
    timer: TimerHandle,
    tx: oneshot::Sender<FetchOutcome<T>>,
    future: FetchFuture<T>,
}

impl<T> Clone for ResourceCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for ResourceCell<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCell")
            .field("type", &std::any::type_name::<T>())
            .field("ptr", &Arc::as_ptr(&self.inner))
            .finish()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ResourceCell<T> {
    /// Creates a resource with default options (auto-fetch, no debounce,
    /// shared executor).
    ///
    /// Fails with [`RuntimeError::NotInitialized`] outside a runtime scope.
    pub fn new<Fut>(
        fetcher: impl Fn() -> Fut + Send + Sync + 'static,
    ) -> Result<Self, RuntimeError>
    where
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        Self::with_options(fetcher, ResourceOptions::default())
    }

    /// Creates a resource with explicit [`ResourceOptions`].
    pub fn with_options<Fut>(
        fetcher: impl Fn() -> Fut + Send + Sync + 'static,
        options: ResourceOptions,
    ) -> Result<Self, RuntimeError>
    where
        Fut: Future<Output = FetchResult<T>> + Send + 'static,
    {
        let executor = match options.executor {
            Some(executor) => executor,
            None => Runtime::current()?.executor().clone(),
        };
        let inner = Arc::new_cyclic(|weak| ResourceInner {
            fetcher: Box::new(move || fetcher().boxed()),
            state: Cell::new(ResourceState::idle()),
            sources: RwLock::new(SourceSet::new()),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            window: Mutex::new(None),
            debounce: options.debounce_delay,
            executor,
            weak_self: Weak::clone(weak),
        });
        let this = Self { inner };
        if options.auto_fetch {
            // run right away, not through the debounce window: the first run
            // is also what establishes the fetcher's dependency set
            drop(this.inner.start_request(None));
        }
        Ok(this)
    }

    /// The current snapshot, registering the resource as a dependency of the
    /// surrounding computation. Non-blocking.
    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.get()
    }

    /// The current snapshot without tracking.
    pub fn peek_state(&self) -> ResourceState<T> {
        self.inner.state.peek()
    }

    /// Requests a (re)fetch and returns the shared completion future.
    ///
    /// With a debounce delay configured, the request is scheduled
    /// `debounce_delay` after the most recent call, and every caller in the
    /// window shares one completion future. Without one, the request starts
    /// immediately, cancelling any request already in flight.
    pub fn fetch(&self) -> FetchFuture<T> {
        self.inner.fetch()
    }

    /// Starts a fetch immediately, bypassing the debounce window.
    ///
    /// A pending debounced run is absorbed: its callers' completion future
    /// resolves with this run's outcome.
    pub fn refetch(&self) -> FetchFuture<T> {
        self.inner.refetch()
    }

    /// Cancels the in-flight request (and any pending debounced run) and
    /// returns to [`Idle`](ResourceStatus::Idle), keeping last-known-good
    /// data. Completion futures resolve with
    /// [`Cancelled`](FetchOutcome::Cancelled).
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Subscribes to state changes. The listener receives each new snapshot.
    pub fn watch(
        &self,
        listener: impl Fn(&ResourceState<T>) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.state.watch(listener)
    }

    /// Whether a request is currently in flight (untracked).
    pub fn is_loading(&self) -> bool {
        self.inner.state.with_value(ResourceState::is_loading)
    }

    /// The last-known-good data (untracked).
    pub fn data(&self) -> Option<T> {
        self.inner
            .state
            .with_value(|state| state.data().cloned())
    }

    /// The latest error (untracked).
    pub fn error(&self) -> Option<FetchError> {
        self.inner
            .state
            .with_value(|state| state.error().cloned())
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ResourceInner<T> {
    fn fetch(self: &Arc<Self>) -> FetchFuture<T> {
        if self.debounce.is_zero() {
            return self.start_request(None);
        }

        let mut window = self.window.lock().or_poisoned();
        if let Some(pending) = window.as_mut() {
            if pending.timer.cancel() {
                // restart the window: same shared completion, new deadline
                pending.timer = self.schedule_window_run();
            }
            // if cancellation lost the race, the entry already fired and the
            // run it starts is the one all window callers share
            return pending.future.clone();
        }

        let (tx, rx) = oneshot::channel();
        let future = FetchFuture { inner: rx.shared() };
        let timer = self.schedule_window_run();
        *window = Some(DebounceWindow {
            timer,
            tx,
            future: future.clone(),
        });
        future
    }

    fn refetch(self: &Arc<Self>) -> FetchFuture<T> {
        let window = self.window.lock().or_poisoned().take();
        if let Some(window) = window {
            window.timer.cancel();
            return self.start_request(Some((window.tx, window.future)));
        }
        self.start_request(None)
    }

    fn schedule_window_run(self: &Arc<Self>) -> TimerHandle {
        let weak = Weak::clone(&self.weak_self);
        self.executor.schedule(self.debounce, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let window = inner.window.lock().or_poisoned().take();
            if let Some(window) = window {
                drop(inner.start_request(Some((window.tx, window.future))));
            }
        })
    }

    /// Starts one request: publishes `Loading`, runs the fetcher's
    /// synchronous portion under dependency tracking, supersedes any
    /// in-flight request, and hands the future to the executor.
    ///
    /// `reused` carries the completion channel of a debounced window, so its
    /// callers observe this run's outcome.
    fn start_request(
        self: &Arc<Self>,
        reused: Option<(oneshot::Sender<FetchOutcome<T>>, FetchFuture<T>)>,
    ) -> FetchFuture<T> {
        let (tx, completion) = reused.unwrap_or_else(|| {
            let (tx, rx) = oneshot::channel();
            (tx, FetchFuture { inner: rx.shared() })
        });

        self.state.update(ResourceState::to_loading);

        // only the synchronous portion of the fetcher is tracked; the
        // continuation below runs on the executor, outside any context
        let this = self.to_any_dependent();
        this.clear_sources(&this);
        let fut = {
            let _frame = Observer::enter(this);
            catch_unwind(AssertUnwindSafe(|| (self.fetcher)()))
        };
        let fut = match fut {
            Ok(fut) => fut,
            Err(payload) => {
                let error =
                    FetchError::msg("fetcher panicked before returning a future");
                self.state
                    .update(|state| state.to_error(error.clone()));
                let _ = tx.send(FetchOutcome::Error(error));
                resume_unwind(payload);
            }
        };

        let (fut, abort) = abortable(fut);
        // assign the generation and install the record under one lock, so
        // the newest request always owns the slot
        let generation;
        let superseded = {
            let mut in_flight = self.in_flight.lock().or_poisoned();
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            in_flight.replace(InFlight {
                generation,
                abort,
            })
        };
        if let Some(prev) = superseded {
            prev.abort.abort();
        }

        let weak = Weak::clone(&self.weak_self);
        self.executor.spawn(async move {
            let outcome = match fut.await {
                Ok(Ok(data)) => FetchOutcome::Success(data),
                Ok(Err(error)) => FetchOutcome::Error(error),
                Err(futures::future::Aborted) => FetchOutcome::Cancelled,
            };
            let outcome = match weak.upgrade() {
                Some(inner) => {
                    if inner.generation.load(Ordering::SeqCst) == generation {
                        inner.publish(generation, &outcome);
                        outcome
                    } else {
                        // a result that raced past its own cancellation:
                        // report the supersession, don't publish the value
                        tracing::trace!(
                            "discarding completion of a superseded request"
                        );
                        FetchOutcome::Cancelled
                    }
                }
                None => outcome,
            };
            let _ = tx.send(outcome);
        });

        completion
    }

    /// Publishes a completed request's outcome, unless a newer request has
    /// claimed the state in the meantime.
    fn publish(&self, generation: u64, outcome: &FetchOutcome<T>) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        {
            let mut in_flight = self.in_flight.lock().or_poisoned();
            if in_flight
                .as_ref()
                .is_some_and(|record| record.generation == generation)
            {
                *in_flight = None;
            }
        }
        match outcome {
            FetchOutcome::Success(data) => {
                self.state.set(ResourceState::success(data.clone()));
            }
            FetchOutcome::Error(error) => {
                self.state
                    .update(|state| state.to_error(error.clone()));
            }
            FetchOutcome::Cancelled => {
                self.state.update(|state| state.to_cancelled(None));
            }
        }
    }

    fn cancel(&self) {
        let window = self.window.lock().or_poisoned().take();
        if let Some(window) = window {
            if window.timer.cancel() {
                let _ = window.tx.send(FetchOutcome::Cancelled);
            }
        }

        let in_flight = {
            let mut in_flight = self.in_flight.lock().or_poisoned();
            // invalidate any late completion before aborting
            self.generation.fetch_add(1, Ordering::SeqCst);
            in_flight.take()
        };
        if let Some(in_flight) = in_flight {
            in_flight.abort.abort();
        }

        self.state.update(ResourceState::to_idle);
    }
}

impl<T> Drop for ResourceInner<T> {
    fn drop(&mut self) {
        if let Ok(window) = self.window.get_mut() {
            if let Some(window) = window.take() {
                window.timer.cancel();
            }
        }
        if let Ok(in_flight) = self.in_flight.get_mut() {
            if let Some(in_flight) = in_flight.take() {
                in_flight.abort.abort();
            }
        }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Dependent
    for ResourceInner<T>
{
    fn on_dependency_changed(&self) {
        if let Some(this) = self.weak_self.upgrade() {
            drop(this.fetch());
        }
    }

    fn add_source(&self, source: AnySource) {
        self.sources.write().or_poisoned().insert(source);
    }

    fn clear_sources(&self, this: &AnyDependent) {
        self.sources.write().or_poisoned().clear_sources(this);
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ToAnyDependent
    for ResourceInner<T>
{
    fn to_any_dependent(&self) -> AnyDependent {
        AnyDependent(
            self as *const Self as usize,
            self.weak_self.clone() as Weak<dyn Dependent + Send + Sync>,
        )
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ToAnySource
    for ResourceCell<T>
{
    fn to_any_source(&self) -> AnySource {
        // dependents of a resource attach to the cell its states are
        // published through
        self.inner.state.to_any_source()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Readable<ResourceState<T>>
    for ResourceCell<T>
{
    fn get(&self) -> ResourceState<T> {
        self.state()
    }

    fn peek(&self) -> ResourceState<T> {
        self.peek_state()
    }
}
