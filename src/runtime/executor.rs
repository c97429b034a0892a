//! The worker pool and the timer thread behind it.
//!
//! Pooled tasks are ordinary futures on a `futures` [`ThreadPool`]. Delayed
//! work goes through a single dedicated timer thread that sleeps until the
//! earliest deadline and hands fired entries back to the pool, so a slow task
//! can never block the timing of the next one.

use futures::executor::ThreadPool;
use or_poisoned::OrPoisoned;
use std::{
    cmp::Ordering as CmpOrdering,
    collections::BinaryHeap,
    fmt::Debug,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Condvar, Mutex, PoisonError,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Where recomputation and async continuations run.
///
/// Cloning is cheap and shares the same pool and timer. The runtime owns the
/// shared instance; resources may be configured with their own.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

struct ExecutorInner {
    pool: ThreadPool,
    timer: Timer,
}

impl Drop for ExecutorInner {
    fn drop(&mut self) {
        self.timer.shutdown();
    }
}

impl Executor {
    /// Creates a pool of workers plus a timer thread.
    pub fn new() -> Self {
        let pool = ThreadPool::builder()
            .name_prefix("reactive-worker-")
            .create()
            .expect("failed to create the reactive worker pool");
        Self {
            inner: Arc::new(ExecutorInner {
                timer: Timer::new(pool.clone()),
                pool,
            }),
        }
    }

    /// Spawns a future onto the worker pool.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.inner.pool.spawn_ok(fut);
    }

    /// Runs a closure on the worker pool.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) {
        self.spawn(async move { task() });
    }

    /// Schedules a closure to run on the worker pool after `delay`.
    ///
    /// The returned handle cancels the entry if it has not fired yet.
    pub fn schedule(
        &self,
        delay: Duration,
        task: impl FnOnce() + Send + 'static,
    ) -> TimerHandle {
        self.inner.timer.schedule(delay, Box::new(task))
    }

    pub(crate) fn shutdown(&self) {
        self.inner.timer.shutdown();
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor").finish_non_exhaustive()
    }
}

/// Cancels a scheduled timer entry.
///
/// Cancellation is best-effort: it never interrupts an entry that has
/// already fired and begun executing.
#[derive(Clone, Debug)]
pub struct TimerHandle {
    consumed: Arc<AtomicBool>,
}

impl TimerHandle {
    /// Attempts to cancel the entry. Returns `true` if the entry had not
    /// fired yet and will now never run.
    pub fn cancel(&self) -> bool {
        !self.consumed.swap(true, Ordering::AcqRel)
    }
}

type TimerTask = Box<dyn FnOnce() + Send + 'static>;

struct TimerEntry {
    deadline: Instant,
    seq: u64,
    consumed: Arc<AtomicBool>,
    task: TimerTask,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // `BinaryHeap` is a max-heap; reverse so the earliest deadline wins
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Timer {
    shared: Arc<TimerShared>,
    seq: AtomicU64,
    thread: Mutex<Option<JoinHandle<()>>>,
}

struct TimerShared {
    queue: Mutex<BinaryHeap<TimerEntry>>,
    wakeup: Condvar,
    stopped: AtomicBool,
}

impl Timer {
    fn new(pool: ThreadPool) -> Self {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
            stopped: AtomicBool::new(false),
        });
        let thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("reactive-timer".into())
                .spawn(move || Self::run(&shared, &pool))
                .expect("failed to spawn the reactive timer thread")
        };
        Self {
            shared,
            seq: AtomicU64::new(0),
            thread: Mutex::new(Some(thread)),
        }
    }

    fn schedule(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let consumed = Arc::new(AtomicBool::new(false));
        let entry = TimerEntry {
            deadline: Instant::now() + delay,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            consumed: Arc::clone(&consumed),
            task,
        };
        self.shared.queue.lock().or_poisoned().push(entry);
        self.shared.wakeup.notify_one();
        TimerHandle { consumed }
    }

    fn run(shared: &TimerShared, pool: &ThreadPool) {
        let mut queue = shared.queue.lock().or_poisoned();
        loop {
            if shared.stopped.load(Ordering::Acquire) {
                return;
            }

            let now = Instant::now();
            match queue.peek().map(|entry| entry.deadline) {
                Some(deadline) if deadline <= now => {
                    if let Some(entry) = queue.pop() {
                        // a cancelled entry was consumed by its handle
                        if !entry.consumed.swap(true, Ordering::AcqRel) {
                            let task = entry.task;
                            pool.spawn_ok(async move { task() });
                        }
                    }
                }
                Some(deadline) => {
                    let (guard, _timeout) = shared
                        .wakeup
                        .wait_timeout(queue, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    queue = guard;
                }
                None => {
                    queue = shared.wakeup.wait(queue).or_poisoned();
                }
            }
        }
    }

    fn shutdown(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();
        let thread = self.thread.lock().or_poisoned().take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}
