//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that handles, effects, computeds, scopes and the
//! scheduler work together through the public API.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use lattice_reactivity::observe::{is_reactive, reactive, readonly, to_raw, Raw, Value};
use lattice_reactivity::reactive::{
    computed, effect, effect_scope, effect_with, flush_jobs, get_current_scope, has_pending_jobs, on_scope_dispose,
    queue_job, signal, watch, EffectOptions, Job, OnCleanup, WatchOptions,
};
use lattice_reactivity::ReactiveError;

fn counter() -> Rc<Cell<usize>> {
    Rc::new(Cell::new(0))
}

fn bump(counter: &Rc<Cell<usize>>) {
    counter.set(counter.get() + 1);
}

/// An effect re-runs on a changed write and not on an identical one.
#[test]
fn effect_runs_once_per_distinct_write() {
    let state = reactive(Raw::record_from([("n", 1)]));
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let _runner = effect(move || {
        bump(&calls_clone);
        reader.get("n").unwrap();
    });
    assert_eq!(calls.get(), 1);

    state.set("n", 2).unwrap();
    assert_eq!(calls.get(), 2);

    // Same value: no redundant run.
    state.set("n", 2).unwrap();
    assert_eq!(calls.get(), 2);
}

/// A computation reading only `c[k]` ignores writes to other keys.
#[test]
fn tracking_is_precise_per_key() {
    let state = reactive(Raw::record_from([("a", 1), ("b", 1)]));
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let _runner = effect(move || {
        bump(&calls_clone);
        reader.get("a").unwrap();
    });

    state.set("b", 2).unwrap();
    assert_eq!(calls.get(), 1);

    state.set("a", 2).unwrap();
    assert_eq!(calls.get(), 2);
}

/// After a branch flips, the abandoned branch no longer causes runs.
#[test]
fn abandoned_branch_is_pruned() {
    let state = reactive(Raw::record_from([("a", Value::from(true)), ("b", Value::from(1)), ("c", Value::from(2))]));
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let _runner = effect(move || {
        bump(&calls_clone);
        if reader.get("a").unwrap() == Value::from(true) {
            reader.get("b").unwrap()
        } else {
            reader.get("c").unwrap()
        }
    });

    state.set("a", false).unwrap();
    assert_eq!(calls.get(), 2);

    // "b" is no longer read.
    state.set("b", 10).unwrap();
    assert_eq!(calls.get(), 2);

    state.set("c", 10).unwrap();
    assert_eq!(calls.get(), 3);
}

/// The getter of a computed runs only when read after a change.
#[test]
fn computed_recomputes_lazily() {
    let state = reactive(Raw::record_from([("n", 1)]));
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let doubled = computed(move || {
        bump(&calls_clone);
        reader.get("n").unwrap().as_f64().unwrap_or_default() * 2.0
    });
    assert_eq!(calls.get(), 0);

    assert_eq!(doubled.get(), 2.0);
    assert_eq!(doubled.get(), 2.0);
    assert_eq!(calls.get(), 1);

    state.set("n", 5).unwrap();
    assert_eq!(calls.get(), 1);

    assert_eq!(doubled.get(), 10.0);
    assert_eq!(calls.get(), 2);
}

/// Stopping a scope stops effects created in it and in nested scopes.
#[test]
fn scope_stop_cascades() {
    let state = reactive(Raw::record_from([("n", 0)]));
    let calls = counter();
    let disposed = counter();

    let scope = effect_scope(false);
    let (reader, calls_clone, disposed_clone) = (state.clone(), calls.clone(), disposed.clone());
    scope.run(move || {
        let outer_reader = reader.clone();
        let outer_calls = calls_clone.clone();
        effect(move || {
            bump(&outer_calls);
            outer_reader.get("n").unwrap();
        });

        effect_scope(false).run(move || {
            effect(move || {
                bump(&calls_clone);
                reader.get("n").unwrap();
            });
            on_scope_dispose(move || bump(&disposed_clone));
            assert!(get_current_scope().is_some());
        });
    });
    assert_eq!(calls.get(), 2);

    state.set("n", 1).unwrap();
    assert_eq!(calls.get(), 4);

    scope.stop();
    assert_eq!(disposed.get(), 1);

    state.set("n", 2).unwrap();
    assert_eq!(calls.get(), 4);
}

/// Removing one child from a parent does not disturb the others.
#[test]
fn detaching_a_child_scope_keeps_siblings() {
    let parent = effect_scope(false);
    let stopped = Rc::new(RefCell::new(Vec::new()));

    let log = stopped.clone();
    let children = parent.run(move || {
        (0..3)
            .map(|index| {
                let child = effect_scope(false);
                let log = log.clone();
                child.run(move || on_scope_dispose(move || log.borrow_mut().push(index)));
                child
            })
            .collect::<Vec<_>>()
    });

    children[0].stop();
    assert_eq!(parent.child_count(), 2);

    parent.stop();
    let mut order = stopped.borrow().clone();
    order.sort_unstable();
    assert_eq!(order, vec![0, 1, 2]);
    assert!(children.iter().all(|child| !child.is_active()));
}

/// N writes in one turn that enqueue the same job run it once.
#[test]
fn scheduler_coalesces_a_turn() {
    let state = reactive(Raw::record_from([("n", 0)]));
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let _runner = effect_with(
        move || {
            bump(&calls_clone);
            reader.get("n").unwrap();
        },
        EffectOptions::default().queued(),
    );

    for n in 1..=10 {
        state.set("n", n).unwrap();
    }
    assert_eq!(calls.get(), 1);
    assert!(has_pending_jobs());

    assert_eq!(flush_jobs(), 1);
    assert_eq!(calls.get(), 2);
}

/// A job stopped before the flush is a harmless no-op.
#[test]
fn stopped_queued_effect_is_skipped_at_flush() {
    let state = reactive(Raw::record_from([("n", 0)]));
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let runner = effect_with(
        move || {
            bump(&calls_clone);
            reader.get("n").unwrap();
        },
        EffectOptions::default().queued(),
    );

    state.set("n", 1).unwrap();
    runner.stop();

    assert_eq!(flush_jobs(), 1);
    assert_eq!(calls.get(), 1);
}

/// Plain jobs dedup by identity.
#[test]
fn queue_job_dedups() {
    let calls = counter();
    let calls_clone = calls.clone();
    let job = Job::new(move || bump(&calls_clone));

    for _ in 0..3 {
        queue_job(&job);
    }
    flush_jobs();
    assert_eq!(calls.get(), 1);
}

/// Wrapping round-trips to the same raw container and handle.
#[test]
fn wrapping_round_trips() {
    let raw = Raw::record();
    assert_eq!(to_raw(reactive(raw)), raw);
    assert_eq!(reactive(reactive(raw)), reactive(raw));

    let view = readonly(reactive(raw));
    assert!(!is_reactive(&view));
    assert_eq!(to_raw(&view), raw);
}

/// A read-only handle neither writes nor notifies.
#[test]
fn readonly_writes_are_swallowed() {
    let raw = Raw::record_from([("n", 1)]);
    let state = reactive(raw);
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let _runner = effect(move || {
        bump(&calls_clone);
        reader.get("n").unwrap();
    });

    assert!(readonly(raw).set("n", 100).unwrap());
    assert_eq!(calls.get(), 1);
    assert_eq!(state.get("n").unwrap(), Value::from(1));
}

/// A nested container written later is tracked through its parent.
#[test]
fn deep_reads_track_nested_containers() {
    let state = reactive(Raw::from_json(&serde_json::json!({"user": {"name": "ada"}})).unwrap());
    let seen = Rc::new(RefCell::new(String::new()));

    let (reader, seen_clone) = (state.clone(), seen.clone());
    let _runner = effect(move || {
        let user = reader.get("user").unwrap();
        let name = user.as_handle().unwrap().get("name").unwrap();
        *seen_clone.borrow_mut() = name.as_str().unwrap_or_default().to_string();
    });
    assert_eq!(*seen.borrow(), "ada");

    let user = state.get("user").unwrap();
    user.as_handle().unwrap().set("name", "grace").unwrap();
    assert_eq!(*seen.borrow(), "grace");
}

/// A watcher sees new and old values and cleans up between calls.
#[test]
fn watch_reports_changes_with_cleanup() {
    let count = signal(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let log_clone = log.clone();
    let handle = watch(
        count.clone(),
        move |new: &i32, old: Option<&i32>, on_cleanup: &OnCleanup| {
            log_clone.borrow_mut().push(format!("{old:?} -> {new}"));
            let log = log_clone.clone();
            let value = *new;
            on_cleanup.register(move || log.borrow_mut().push(format!("cleanup {value}")));
        },
        WatchOptions::default(),
    );

    count.set(1);
    count.set(2);
    handle.stop();

    assert_eq!(
        *log.borrow(),
        vec!["Some(0) -> 1", "cleanup 1", "Some(1) -> 2", "cleanup 2"]
    );
}

/// Operations on a released container fail instead of reading stale data.
#[test]
fn released_containers_report_errors() {
    let raw = Raw::record_from([("n", 1)]);
    let state = reactive(raw);
    let calls = counter();

    let (reader, calls_clone) = (state.clone(), calls.clone());
    let runner = effect(move || {
        bump(&calls_clone);
        let _ = reader.get("n");
    });
    assert_eq!(runner.effect().dep_count(), 1);

    raw.release().unwrap();
    assert_eq!(runner.effect().dep_count(), 0);
    assert!(matches!(state.get("n"), Err(ReactiveError::Released(_))));
}
