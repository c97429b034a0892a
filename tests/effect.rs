use reactive_cells::{cell, effect};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, RwLock,
};

#[test]
fn runs_immediately_and_on_every_change() {
    let c = cell(0);
    let log = Arc::new(RwLock::new(Vec::new()));

    let handle = effect({
        let (c, log) = (c.clone(), Arc::clone(&log));
        move || log.write().unwrap().push(c.get())
    });

    assert_eq!(*log.read().unwrap(), vec![0]);

    c.set(1);
    c.set(2);
    assert_eq!(*log.read().unwrap(), vec![0, 1, 2]);

    handle.dispose();
    c.set(3);
    assert_eq!(*log.read().unwrap(), vec![0, 1, 2]);
}

#[test]
fn equal_writes_do_not_rerun_the_effect() {
    let c = cell(5);
    let runs = Arc::new(AtomicUsize::new(0));

    let _handle = effect({
        let (c, runs) = (c.clone(), Arc::clone(&runs));
        move || {
            c.get();
            runs.fetch_add(1, Ordering::Relaxed);
        }
    });

    c.set(5);
    assert_eq!(runs.load(Ordering::Relaxed), 1);
    c.set(6);
    assert_eq!(runs.load(Ordering::Relaxed), 2);
}

#[test]
fn each_run_retracks_from_scratch() {
    let gate = cell(true);
    let a = cell(0);
    let b = cell(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let _handle = effect({
        let (gate, a, b) = (gate.clone(), a.clone(), b.clone());
        let runs = Arc::clone(&runs);
        move || {
            runs.fetch_add(1, Ordering::Relaxed);
            if gate.get() {
                a.get();
            } else {
                b.get();
            }
        }
    });
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    // `b` is in the untaken branch
    b.set(1);
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    gate.set(false);
    assert_eq!(runs.load(Ordering::Relaxed), 2);

    // the roles have swapped
    a.set(1);
    assert_eq!(runs.load(Ordering::Relaxed), 2);
    b.set(2);
    assert_eq!(runs.load(Ordering::Relaxed), 3);
}

#[test]
fn dispose_is_idempotent() {
    let c = cell(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let handle = effect({
        let (c, runs) = (c.clone(), Arc::clone(&runs));
        move || {
            c.get();
            runs.fetch_add(1, Ordering::Relaxed);
        }
    });

    handle.dispose();
    handle.dispose();
    assert!(handle.is_disposed());

    c.set(1);
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn dropping_the_handle_retires_the_effect() {
    let c = cell(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let handle = effect({
        let (c, runs) = (c.clone(), Arc::clone(&runs));
        move || {
            c.get();
            runs.fetch_add(1, Ordering::Relaxed);
        }
    });
    assert_eq!(runs.load(Ordering::Relaxed), 1);

    // only weak back-edges point at the effect now
    drop(handle);
    c.set(1);
    c.set(2);
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn write_back_into_own_dependency_terminates() {
    let c = cell(0);
    let runs = Arc::new(AtomicUsize::new(0));

    let _handle = effect({
        let (c, runs) = (c.clone(), Arc::clone(&runs));
        move || {
            let seen = c.get();
            runs.fetch_add(1, Ordering::Relaxed);
            // writing back into the cell we just read: the re-entrant
            // notification is suppressed, so this settles instead of looping
            if seen < 10 {
                c.set(seen + 1);
            }
        }
    });

    // initial run wrote 1, the re-run it triggered wrote 2 with its own
    // notification suppressed
    assert_eq!(runs.load(Ordering::Relaxed), 2);
    assert_eq!(c.get(), 2);
}
