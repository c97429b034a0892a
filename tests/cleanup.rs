use reactive_cells::{cell, derived, trigger, Track};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[test]
fn dropped_dependents_stop_recomputing() {
    let computations = Arc::new(AtomicUsize::new(0));
    let c = cell(0);

    let d = derived({
        let c = c.clone();
        let computations = Arc::clone(&computations);
        move || {
            computations.fetch_add(1, Ordering::Relaxed);
            c.get()
        }
    });
    assert_eq!(d.get(), 0);
    assert_eq!(computations.load(Ordering::Relaxed), 1);

    // only `c`'s weak back-edge refers to the derived cell now; the write
    // prunes it rather than reviving it
    drop(d);
    c.set(1);
    c.set(2);
    assert_eq!(computations.load(Ordering::Relaxed), 1);
}

#[test]
fn chains_survive_dropping_intermediate_handles() {
    let c = cell(1);
    let doubled = c.map(|n| n * 2);
    let described = doubled.map(|n| format!("value: {n}"));

    assert_eq!(described.get(), "value: 2");

    // the tail holds its sources strongly, so the intermediate node outlives
    // the user handle and keeps relaying invalidations
    drop(doubled);
    c.set(3);
    assert_eq!(described.get(), "value: 6");
}

#[test]
fn trigger_reaches_watchers_and_dependents() {
    let t = trigger();
    let fired = Arc::new(AtomicUsize::new(0));
    let computations = Arc::new(AtomicUsize::new(0));

    let sub = t.watch({
        let fired = Arc::clone(&fired);
        move || {
            fired.fetch_add(1, Ordering::Relaxed);
        }
    });

    let d = derived({
        let t = t.clone();
        let computations = Arc::clone(&computations);
        move || {
            t.track();
            computations.fetch_add(1, Ordering::Relaxed)
        }
    });

    assert_eq!(d.get(), 0);
    t.fire();
    assert_eq!(fired.load(Ordering::Relaxed), 1);
    // every fire dirties the dependent: no equality gate on triggers
    assert_eq!(d.get(), 1);

    sub.dispose();
    t.fire();
    assert_eq!(fired.load(Ordering::Relaxed), 1);
    assert_eq!(d.get(), 2);
}

#[test]
fn disposed_trigger_watcher_is_not_retained() {
    let t = trigger();
    let fired = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let sub = t.watch({
            let fired = Arc::clone(&fired);
            move || {
                fired.fetch_add(1, Ordering::Relaxed);
            }
        });
        sub.dispose();
    }

    t.fire();
    assert_eq!(fired.load(Ordering::Relaxed), 0);
}
