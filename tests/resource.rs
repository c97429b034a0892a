use futures::FutureExt;
use reactive_cells::{
    cell, resource, resource_with, with_runtime, Executor, FetchError,
    FetchOutcome, ResourceOptions, ResourceStatus, RuntimeError,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc, Mutex, OnceLock,
};
use std::time::{Duration, Instant};

fn runtime_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// The runtime is process-global, so tests that need one take a shared lock.
fn with_test_runtime<R>(fun: impl FnOnce() -> R) -> R {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let _guard = runtime_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    with_runtime(fun).expect("runtime scope")
}

fn wait_for(mut done: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn requires_an_initialised_runtime() {
    let _guard = runtime_lock()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let result = resource(|| async { Ok::<_, FetchError>(1) });
    assert_eq!(result.unwrap_err(), RuntimeError::NotInitialized);
}

#[test]
fn a_custom_executor_stands_in_for_the_runtime() {
    // no runtime scope here: the resource runs entirely on its own executor
    let executor = Executor::new();
    let r = resource_with(
        || async { Ok::<_, FetchError>(7) },
        ResourceOptions {
            executor: Some(executor),
            ..Default::default()
        },
    )
    .unwrap();

    wait_for(|| r.peek_state().is_success(), "fetch on custom executor");
    assert_eq!(r.data(), Some(7));
}

#[test]
fn auto_fetch_resolves_to_success() {
    with_test_runtime(|| {
        let r = resource(|| async { Ok::<_, FetchError>("payload") }).unwrap();

        wait_for(|| r.peek_state().is_success(), "auto-fetch");
        let state = r.peek_state();
        assert_eq!(state.status(), ResourceStatus::Success);
        assert_eq!(state.data(), Some(&"payload"));
        assert!(state.error().is_none());
    });
}

#[test]
fn fetch_returns_the_outcome_through_the_completion_future() {
    with_test_runtime(|| {
        let r = resource_with(
            || async { Ok::<_, FetchError>(41) },
            ResourceOptions {
                auto_fetch: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(r.peek_state().is_idle());

        let outcome = futures::executor::block_on(r.fetch());
        assert_eq!(outcome, FetchOutcome::Success(41));
        assert_eq!(r.data(), Some(41));
    });
}

#[test]
fn errors_keep_last_known_good_data() {
    with_test_runtime(|| {
        let fail = cell(false);
        let r = resource({
            let fail = fail.clone();
            move || {
                let fail = fail.get();
                async move {
                    if fail {
                        Err(FetchError::msg("backend down"))
                    } else {
                        Ok(123)
                    }
                }
            }
        })
        .unwrap();

        wait_for(|| r.peek_state().is_success(), "first fetch");
        assert_eq!(r.data(), Some(123));

        // flipping the cell re-fetches through the dependency edge
        fail.set(true);
        wait_for(|| r.peek_state().is_error(), "failing fetch");

        let state = r.peek_state();
        assert_eq!(state.status(), ResourceStatus::Error);
        assert_eq!(state.data(), Some(&123));
        assert_eq!(state.error().unwrap().message(), "backend down");
    });
}

#[test]
fn dependency_changes_refetch() {
    with_test_runtime(|| {
        let query = cell(String::from("first"));
        let calls = Arc::new(AtomicUsize::new(0));

        let r = resource({
            let query = query.clone();
            let calls = Arc::clone(&calls);
            move || {
                let q = query.get();
                calls.fetch_add(1, Ordering::Relaxed);
                async move { Ok::<_, FetchError>(q.to_uppercase()) }
            }
        })
        .unwrap();

        assert_eq!(calls.load(Ordering::Relaxed), 1);
        wait_for(|| r.data() == Some("FIRST".into()), "first fetch");

        query.set("second".into());
        // the fetcher's synchronous portion runs on the writing thread
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        wait_for(|| r.data() == Some("SECOND".into()), "refetch");
    });
}

#[test]
fn cancel_returns_to_idle_and_resolves_cancelled() {
    with_test_runtime(|| {
        let r = resource_with(
            || futures::future::pending::<Result<u32, FetchError>>(),
            ResourceOptions {
                auto_fetch: false,
                ..Default::default()
            },
        )
        .unwrap();

        let completion = r.fetch();
        assert!(r.peek_state().is_loading());

        r.cancel();
        assert_eq!(r.peek_state().status(), ResourceStatus::Idle);
        assert_eq!(
            futures::executor::block_on(completion),
            FetchOutcome::Cancelled
        );
    });
}

#[test]
fn a_newer_fetch_supersedes_the_in_flight_one() {
    with_test_runtime(|| {
        let r = resource_with(
            || futures::future::pending::<Result<u32, FetchError>>(),
            ResourceOptions {
                auto_fetch: false,
                ..Default::default()
            },
        )
        .unwrap();

        let first = r.fetch();
        let second = r.fetch();

        // the superseded request reports cancellation...
        assert_eq!(
            futures::executor::block_on(first),
            FetchOutcome::Cancelled
        );
        // ...the new one is still pending, and the published state is its
        // loading state
        assert!(second.now_or_never().is_none());
        assert!(r.peek_state().is_loading());
    });
}

#[test]
fn late_completions_of_superseded_requests_are_discarded() {
    with_test_runtime(|| {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));
        let run = Arc::new(AtomicUsize::new(0));

        let r = resource_with(
            {
                let release_rx = Arc::clone(&release_rx);
                let run = Arc::clone(&run);
                move || {
                    let sequence = run.fetch_add(1, Ordering::SeqCst);
                    let release_rx = Arc::clone(&release_rx);
                    async move {
                        if sequence == 0 {
                            // the first request finishes only when released,
                            // i.e. after it has been superseded
                            let _ = release_rx.lock().unwrap().recv();
                            Ok::<_, FetchError>("stale")
                        } else {
                            Ok("fresh")
                        }
                    }
                }
            },
            ResourceOptions {
                auto_fetch: false,
                ..Default::default()
            },
        )
        .unwrap();

        let first = r.fetch();
        let second = r.fetch();
        release_tx.send(()).unwrap();

        assert_eq!(
            futures::executor::block_on(second),
            FetchOutcome::Success("fresh")
        );
        assert_eq!(
            futures::executor::block_on(first),
            FetchOutcome::Cancelled
        );
        wait_for(|| r.peek_state().is_success(), "fresh fetch");
        assert_eq!(r.data(), Some("fresh"));
    });
}

#[test]
fn debounced_fetches_collapse_into_one_run() {
    with_test_runtime(|| {
        let (seen_tx, seen_rx) = mpsc::channel::<String>();
        let query = cell(String::from("initial"));

        let _r = resource_with(
            {
                let query = query.clone();
                move || {
                    let q = query.get();
                    seen_tx.send(q.clone()).unwrap();
                    async move { Ok::<_, FetchError>(q) }
                }
            },
            ResourceOptions {
                debounce_delay: Duration::from_millis(300),
                ..Default::default()
            },
        )
        .unwrap();

        // the construction-time fetch is immediate: it establishes the
        // dependency on `query`
        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "initial"
        );

        // four rapid writes inside the window collapse into a single run
        for q in ["j", "ja", "jav", "java"] {
            query.set(q.into());
            std::thread::sleep(Duration::from_millis(40));
        }

        assert_eq!(
            seen_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            "java"
        );
        // and nothing else arrives
        assert!(seen_rx
            .recv_timeout(Duration::from_millis(500))
            .is_err());
    });
}

#[test]
fn callers_in_one_window_share_a_completion() {
    with_test_runtime(|| {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = resource_with(
            {
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, FetchError>("done") }
                }
            },
            ResourceOptions {
                auto_fetch: false,
                debounce_delay: Duration::from_millis(300),
                ..Default::default()
            },
        )
        .unwrap();

        let first = r.fetch();
        let second = r.fetch();
        let third = r.fetch();

        assert_eq!(
            futures::executor::block_on(first),
            FetchOutcome::Success("done")
        );
        assert_eq!(
            futures::executor::block_on(second),
            FetchOutcome::Success("done")
        );
        assert_eq!(
            futures::executor::block_on(third),
            FetchOutcome::Success("done")
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn refetch_bypasses_the_debounce_window() {
    with_test_runtime(|| {
        let runs = Arc::new(AtomicUsize::new(0));
        let r = resource_with(
            {
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, FetchError>(1) }
                }
            },
            ResourceOptions {
                auto_fetch: false,
                debounce_delay: Duration::from_secs(60),
                ..Default::default()
            },
        )
        .unwrap();

        // the window would fire a minute from now; refetch absorbs it
        let debounced = r.fetch();
        let immediate = r.refetch();

        assert_eq!(
            futures::executor::block_on(immediate),
            FetchOutcome::Success(1)
        );
        assert_eq!(
            futures::executor::block_on(debounced),
            FetchOutcome::Success(1)
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn watchers_observe_state_transitions() {
    with_test_runtime(|| {
        let r = resource_with(
            || async { Ok::<_, FetchError>(5) },
            ResourceOptions {
                auto_fetch: false,
                ..Default::default()
            },
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        let _sub = r.watch(move |state| {
            tx.send(state.status()).unwrap();
        });

        drop(futures::executor::block_on(r.fetch()));

        let mut statuses = Vec::new();
        while let Ok(status) = rx.recv_timeout(Duration::from_millis(500)) {
            statuses.push(status);
            if statuses.contains(&ResourceStatus::Success) {
                break;
            }
        }
        assert_eq!(
            statuses,
            vec![ResourceStatus::Loading, ResourceStatus::Success]
        );
    });
}
