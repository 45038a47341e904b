//! Integration Tests for Reactive System
//!
//! These tests verify that signals, memos, effects, batches and reconciliation
//! work together correctly through the public API.
//!
//! Every test runs on its own thread and therefore gets a fresh runtime.

use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use filament_core::reactive::{
    batch, create_root, flush, get_current_owner, on_cleanup, pending_effects, run_in_scope,
    snapshot, Cleanup, Effect, Memo, Signal, Snapshot,
};
use filament_core::reconcile::{reconcile, reconcile_array, OpKind, ReconcileOptions, Value};
use filament_core::{configure, RuntimeConfig, SchedulerMode};
use serde_json::json;

fn counter() -> (Rc<Cell<u32>>, Rc<Cell<u32>>) {
    let count = Rc::new(Cell::new(0));
    (count.clone(), count)
}

fn bump(count: &Cell<u32>) {
    count.set(count.get() + 1);
}

/// Drain deferred work. A no-op under the immediate scheduler.
fn settle() {
    flush();
}

fn use_scheduler(mode: SchedulerMode) {
    configure(RuntimeConfig {
        scheduler: mode,
        ..RuntimeConfig::default()
    });
}

// ----------------------------------------------------------------------------
// Shared contract, run under both schedulers
// ----------------------------------------------------------------------------

/// A write of a different value re-runs a reading effect exactly once.
fn dependency_tracking() {
    let count = Signal::new(0);
    let (runs, runs_clone) = counter();

    let count_clone = count.clone();
    let effect = Effect::new(move || {
        count_clone.get();
        bump(&runs_clone);
    });
    assert_eq!(runs.get(), 1);

    count.set(1);
    settle();
    assert_eq!(runs.get(), 2);
    effect.dispose();
}

/// Writing the current value never notifies.
fn equality_short_circuit() {
    let count = Signal::new(7);
    let (runs, runs_clone) = counter();

    let count_clone = count.clone();
    let effect = Effect::new(move || {
        count_clone.get();
        bump(&runs_clone);
    });

    count.set(7);
    settle();
    assert_eq!(runs.get(), 1);
    assert_eq!(pending_effects(), 0);
    effect.dispose();
}

/// Four writes to two signals in one batch re-run the reader once.
fn batch_dedup() {
    let a = Signal::new(0);
    let b = Signal::new(0);
    let (runs, runs_clone) = counter();
    let seen = Rc::new(Cell::new((0, 0)));

    let (a_clone, b_clone, seen_clone) = (a.clone(), b.clone(), seen.clone());
    let effect = Effect::new(move || {
        seen_clone.set((a_clone.get(), b_clone.get()));
        bump(&runs_clone);
    });

    batch(|| {
        a.set(1);
        b.set(1);
        a.set(2);
        b.set(2);
    });
    settle();

    assert_eq!(runs.get(), 2);
    assert_eq!(seen.get(), (2, 2));
    effect.dispose();
}

/// Three nested batches writing the same signal flush once, after the
/// outermost one closes.
fn nested_batch_flushes_once() {
    let count = Signal::new(0);
    let (runs, runs_clone) = counter();

    let count_clone = count.clone();
    let effect = Effect::new(move || {
        count_clone.get();
        bump(&runs_clone);
    });

    batch(|| {
        count.set(1);
        batch(|| {
            count.set(2);
            batch(|| count.set(3));
            assert_eq!(runs.get(), 1);
        });
        assert_eq!(runs.get(), 1);
    });
    settle();

    assert_eq!(runs.get(), 2);
    effect.dispose();
}

/// A batch body that panics still flushes its writes, then re-raises.
fn batch_error_isolation() {
    let count = Signal::new(0);
    let seen = Rc::new(Cell::new(0));

    let (count_clone, seen_clone) = (count.clone(), seen.clone());
    let effect = Effect::new(move || seen_clone.set(count_clone.get()));

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        batch(|| {
            count.set(1);
            panic!("x");
        })
    }));
    settle();

    assert!(result.is_err());
    assert_eq!(seen.get(), 1);
    effect.dispose();
}

/// Memos compute on first read and then serve the cache.
fn memo_laziness_and_caching() {
    let count = Signal::new(2);
    let (computes, computes_clone) = counter();

    let count_clone = count.clone();
    let doubled = Memo::new(move || {
        bump(&computes_clone);
        count_clone.get() * 2
    });
    assert_eq!(computes.get(), 0);

    assert_eq!(doubled.get(), 4);
    assert_eq!(computes.get(), 1);
    assert_eq!(doubled.get(), 4);
    assert_eq!(computes.get(), 1);

    count.set(3);
    settle();
    assert_eq!(computes.get(), 1);
    assert_eq!(doubled.get(), 6);
    assert_eq!(computes.get(), 2);
}

/// The cleanup returned by an effect runs on dispose, not before.
fn cleanup_ordering() {
    let cleaned = Rc::new(Cell::new(false));
    let cleaned_clone = cleaned.clone();

    let effect = Effect::new(move || {
        let cleaned = cleaned_clone.clone();
        Cleanup::new(move || cleaned.set(true))
    });
    assert!(!cleaned.get());

    effect.dispose();
    assert!(cleaned.get());
}

/// An effect reading two memos of one signal never sees a mixed state and
/// runs once per write.
fn glitch_free_diamond() {
    let celsius = Signal::new(0);

    let c = celsius.clone();
    let fahrenheit = Memo::new(move || c.get() * 9 / 5 + 32);
    let c = celsius.clone();
    let kelvin = Memo::new(move || c.get() + 273);

    let log = Rc::new(RefCell::new(Vec::new()));
    let (f, k, log_clone) = (fahrenheit.clone(), kelvin.clone(), log.clone());
    let effect = Effect::new(move || log_clone.borrow_mut().push((f.get(), k.get())));

    celsius.set(100);
    settle();

    assert_eq!(*log.borrow(), vec![(32, 273), (212, 373)]);
    effect.dispose();
}

/// An effect writing its own dependency is re-run after its current run,
/// not recursively, until it stops writing.
fn self_trigger_settles() {
    let count = Signal::new(0);
    let (runs, runs_clone) = counter();

    let count_clone = count.clone();
    let effect = Effect::new(move || {
        bump(&runs_clone);
        let value = count_clone.get();
        if value < 3 {
            count_clone.set(value + 1);
        }
    });
    settle();

    assert_eq!(count.get(), 3);
    assert_eq!(runs.get(), 4);
    effect.dispose();
}

/// Writes made by an effect during a flush are handled by that same flush.
fn writes_during_flush_join_it() {
    let input = Signal::new(1);
    let scaled = Signal::new(0);
    let seen = Rc::new(Cell::new(0));

    let (input_clone, scaled_clone) = (input.clone(), scaled.clone());
    let writer = Effect::new(move || scaled_clone.set(input_clone.get() * 10));

    let (scaled_clone, seen_clone) = (scaled.clone(), seen.clone());
    let reader = Effect::new(move || seen_clone.set(scaled_clone.get()));
    assert_eq!(seen.get(), 10);

    input.set(2);
    settle();

    assert_eq!(seen.get(), 20);
    assert_eq!(pending_effects(), 0);
    writer.dispose();
    reader.dispose();
}

/// An effect disposed while queued does not run.
fn disposed_while_queued_is_skipped() {
    let count = Signal::new(0);
    let (runs, runs_clone) = counter();

    let count_clone = count.clone();
    let effect = Effect::new(move || {
        count_clone.get();
        bump(&runs_clone);
    });

    batch(|| {
        count.set(1);
        effect.dispose();
    });
    settle();

    assert_eq!(runs.get(), 1);
}

macro_rules! under_both_schedulers {
    ($($name:ident),* $(,)?) => {
        mod immediate {
            $(
                #[test]
                fn $name() {
                    super::use_scheduler(filament_core::SchedulerMode::Immediate);
                    super::$name();
                }
            )*
        }

        mod frame {
            $(
                #[test]
                fn $name() {
                    super::use_scheduler(filament_core::SchedulerMode::Frame);
                    super::$name();
                }
            )*
        }
    };
}

under_both_schedulers!(
    dependency_tracking,
    equality_short_circuit,
    batch_dedup,
    nested_batch_flushes_once,
    batch_error_isolation,
    memo_laziness_and_caching,
    cleanup_ordering,
    glitch_free_diamond,
    self_trigger_settles,
    writes_during_flush_join_it,
    disposed_while_queued_is_skipped,
);

// ----------------------------------------------------------------------------
// Scheduler-specific behavior
// ----------------------------------------------------------------------------

/// Outside a batch, a panicking effect unwinds to the writer.
#[test]
fn unbatched_effect_panic_reaches_writer() {
    let count = Signal::new(0);

    let count_clone = count.clone();
    let effect = Effect::new(move || {
        if count_clone.get() == 1 {
            panic!("effect failed");
        }
    });

    let result = panic::catch_unwind(AssertUnwindSafe(|| count.set(1)));
    assert!(result.is_err());

    // The effect survives and keeps working.
    count.set(2);
    assert!(!effect.is_disposed());
    effect.dispose();
}

/// Inside a batch flush, one failing effect does not stop its siblings.
#[test]
fn batched_flush_isolates_panics() {
    let count = Signal::new(0);
    let seen = Rc::new(Cell::new(0));

    let count_clone = count.clone();
    let failing = Effect::new(move || {
        if count_clone.get() > 0 {
            panic!("first effect failed");
        }
    });
    let (count_clone, seen_clone) = (count.clone(), seen.clone());
    let healthy = Effect::new(move || seen_clone.set(count_clone.get()));

    batch(|| count.set(5));

    assert_eq!(seen.get(), 5);
    failing.dispose();
    healthy.dispose();
}

/// A memo that panicked still notifies its readers once it recovers.
fn memo_panic_then_recover(write_failing: impl FnOnce(&Signal<i32>)) {
    let count = Signal::new(0);
    let seen = Rc::new(Cell::new(-1));

    let count_clone = count.clone();
    let doubled = Memo::new(move || {
        let value = count_clone.get();
        if value == 1 {
            panic!("memo failed");
        }
        value * 2
    });
    let (doubled_clone, seen_clone) = (doubled.clone(), seen.clone());
    let effect = Effect::new(move || seen_clone.set(doubled_clone.get()));
    assert_eq!(seen.get(), 0);

    write_failing(&count);
    assert!(doubled.is_dirty());

    count.set(2);
    assert_eq!(seen.get(), 4);
    assert_eq!(doubled.get_untracked(), 4);
    effect.dispose();
}

#[test]
fn memo_recovers_after_batched_panic() {
    memo_panic_then_recover(|count| batch(|| count.set(1)));
}

#[test]
fn memo_recovers_after_unbatched_panic() {
    memo_panic_then_recover(|count| {
        let result = panic::catch_unwind(AssertUnwindSafe(|| count.set(1)));
        assert!(result.is_err());
    });
}

/// The frame scheduler queues un-batched writes until the host flushes.
#[test]
fn frame_scheduler_waits_for_flush() {
    configure(RuntimeConfig::frame());
    let count = Signal::new(0);
    let seen = Rc::new(Cell::new(0));

    let (count_clone, seen_clone) = (count.clone(), seen.clone());
    let effect = Effect::new(move || seen_clone.set(count_clone.get()));

    count.set(1);
    count.set(2);
    assert_eq!(seen.get(), 0);
    assert_eq!(pending_effects(), 1);

    assert_eq!(flush(), 1);
    assert_eq!(seen.get(), 2);
    assert_eq!(flush(), 0);
    effect.dispose();
}

/// A self-retriggering effect is cut off by the runaway guard.
#[test]
fn runaway_loop_is_bounded() {
    configure(RuntimeConfig::default().with_max_updates_per_flush(10));
    let count = Signal::new(0);

    let count_clone = count.clone();
    let effect = Effect::new(move || {
        let value = count_clone.get();
        count_clone.set(value + 1);
    });

    // The creation run, then ten flushed re-runs.
    assert_eq!(count.get(), 11);
    assert_eq!(pending_effects(), 0);
    effect.dispose();
}

// ----------------------------------------------------------------------------
// Ownership
// ----------------------------------------------------------------------------

/// Children are torn down before their parent, and on every parent re-run.
#[test]
fn ownership_tree_teardown_order() {
    let trigger = Signal::new(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let (trigger_clone, log_clone) = (trigger.clone(), log.clone());
    let parent = Effect::new(move || {
        let generation = trigger_clone.get();
        let log = log_clone.clone();

        let child_log = log.clone();
        Effect::new(move || {
            let grandchild_log = child_log.clone();
            Effect::new(move || {
                let log = grandchild_log.clone();
                on_cleanup(move || log.borrow_mut().push(format!("grandchild {generation}")));
            });
            let log = child_log.clone();
            on_cleanup(move || log.borrow_mut().push(format!("child {generation}")));
        });

        Cleanup::new(move || log.borrow_mut().push(format!("parent {generation}")))
    });

    trigger.set(1);
    parent.dispose();

    assert_eq!(
        *log.borrow(),
        vec![
            "grandchild 0",
            "child 0",
            "parent 0",
            "grandchild 1",
            "child 1",
            "parent 1"
        ]
    );
}

/// Effects created from an outside callback can be placed into a subtree.
#[test]
fn run_in_scope_reattaches_late_effects() {
    let count = Signal::new(0);
    let (runs, runs_clone) = counter();

    let root = create_root(|owner| owner);
    assert!(get_current_owner().is_none());

    // E.g. a resolved request handler
    let count_clone = count.clone();
    run_in_scope(root, move || {
        Effect::new(move || {
            count_clone.get();
            bump(&runs_clone);
        });
    });

    count.set(1);
    assert_eq!(runs.get(), 2);

    root.dispose();
    count.set(2);
    assert_eq!(runs.get(), 2);
    assert_eq!(count.subscriber_count(), 0);
}

/// Disposal removes every subscription of the subtree.
#[test]
fn disposal_leaves_no_subscriptions() {
    let a = Signal::new(0);
    let b = Signal::new(0);

    let (a_clone, b_clone) = (a.clone(), b.clone());
    let root = create_root(move |owner| {
        for _ in 0..3 {
            let (a, b) = (a_clone.clone(), b_clone.clone());
            Effect::new(move || {
                a.get();
                let b = b.clone();
                Effect::new(move || {
                    b.get();
                });
            });
        }
        owner
    });
    assert_eq!(a.subscriber_count(), 3);
    assert_eq!(b.subscriber_count(), 3);

    root.dispose();
    assert_eq!(a.subscriber_count(), 0);
    assert_eq!(b.subscriber_count(), 0);
}

/// Cleanups run outside any owner: what they read subscribes nobody.
#[test]
fn cleanup_reads_are_not_tracked() {
    let source = Signal::new(0);
    let other = Signal::new(0);

    let (source_clone, other_clone) = (source.clone(), other.clone());
    let reader = Effect::new(move || {
        source_clone.get();
        let other = other_clone.clone();
        Cleanup::new(move || {
            other.get();
        })
    });

    // Re-runs `reader` from inside its own body.
    let (runs, runs_clone) = counter();
    let source_clone = source.clone();
    let writer = Effect::new(move || {
        bump(&runs_clone);
        source_clone.set(1);
    });
    assert_eq!(runs.get(), 1);
    assert!(!writer.depends_on(&other));

    other.set(1);
    assert_eq!(runs.get(), 1);

    // Same for cleanups run by a disposal.
    let other_clone = other.clone();
    let held = Effect::new(move || {
        let other = other_clone.clone();
        Cleanup::new(move || {
            other.get();
        })
    });
    let (runs, runs_clone) = counter();
    let disposer = Effect::new(move || {
        bump(&runs_clone);
        held.dispose();
    });
    assert!(!disposer.depends_on(&other));

    other.set(2);
    assert_eq!(runs.get(), 1);

    reader.dispose();
    writer.dispose();
    disposer.dispose();
}

/// An effect disposed by an earlier sibling during an un-batched write
/// does not run.
#[test]
fn sibling_disposed_mid_notification_is_skipped() {
    let count = Signal::new(0);
    let later: Rc<Cell<Option<Effect>>> = Rc::new(Cell::new(None));

    let (count_clone, later_clone) = (count.clone(), later.clone());
    let earlier = Effect::new(move || {
        if count_clone.get() == 1 {
            if let Some(effect) = later_clone.take() {
                effect.dispose();
            }
        }
    });

    let (runs, runs_clone) = counter();
    let count_clone = count.clone();
    let effect = Effect::new(move || {
        count_clone.get();
        bump(&runs_clone);
    });
    later.set(Some(effect));

    count.set(1);

    assert_eq!(runs.get(), 1);
    assert!(effect.is_disposed());
    assert_eq!(count.subscriber_count(), 1);
    earlier.dispose();
}

/// A subscriber created while a write is being delivered only runs its
/// initial run, not a second time for that same write.
#[test]
fn subscriber_added_mid_notification_waits_for_next_write() {
    let count = Signal::new(0);
    let (runs, runs_clone) = counter();

    let count_clone = count.clone();
    let creator = Effect::new(move || {
        if count_clone.get() == 1 {
            let (count, runs) = (count_clone.clone(), runs_clone.clone());
            Effect::new(move || {
                count.get();
                bump(&runs);
            });
        }
    });
    assert_eq!(count.subscriber_count(), 1);

    count.set(1);

    assert_eq!(runs.get(), 1);
    assert_eq!(count.subscriber_count(), 2);
    assert_eq!(pending_effects(), 0);
    creator.dispose();
}

// ----------------------------------------------------------------------------
// Reconciliation
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
struct Item {
    id: u32,
    name: &'static str,
}

#[test]
fn reconcile_array_properties() {
    let one = Item { id: 1, name: "one" };
    let two = Item { id: 2, name: "two" };

    let before = [one.clone(), two.clone()];
    let after = [two.clone(), one.clone()];
    let swapped = reconcile_array(&before, &after, |x| x.id);
    assert_eq!(swapped.count(OpKind::Move), 2);
    assert_eq!(swapped.count(OpKind::Add), 0);
    assert_eq!(swapped.count(OpKind::Remove), 0);

    let before = [one.clone()];
    let after = [one.clone(), two.clone()];
    let grown = reconcile_array(&before, &after, |x| x.id);
    assert_eq!(grown.count(OpKind::Keep), 1);
    assert_eq!(grown.count(OpKind::Add), 1);

    let before = [one.clone(), two];
    let after = [one, Item { id: 2, name: "deux" }];
    let updated = reconcile_array(&before, &after, |x| x.id);
    assert_eq!(updated.count(OpKind::Update), 1);
    assert_eq!(updated.count(OpKind::Remove), 0);
    assert_eq!(updated.count(OpKind::Add), 0);
}

/// A signal updated with `reconcile` keeps unchanged sub-trees and does not
/// notify when nothing changed.
#[test]
fn reconciled_state_keeps_references() {
    let state = Signal::new(Value::from(json!({
        "count": 1,
        "nested": { "items": [{ "id": 1, "label": "a" }] }
    })));
    let prev_nested = state.with(|v| v.get("nested").cloned()).unwrap();
    let (runs, runs_clone) = counter();

    let state_clone = state.clone();
    let effect = Effect::new(move || {
        state_clone.with(|_| ());
        bump(&runs_clone);
    });

    state.update(reconcile(
        Value::from(json!({
            "count": 1,
            "nested": { "items": [{ "id": 1, "label": "a" }] }
        })),
        ReconcileOptions::default(),
    ));
    assert_eq!(runs.get(), 1);

    state.update(reconcile(
        Value::from(json!({
            "count": 2,
            "nested": { "items": [{ "id": 1, "label": "a" }] }
        })),
        ReconcileOptions::default(),
    ));
    assert_eq!(runs.get(), 2);
    assert!(state.with(|v| v.get("nested").unwrap().ptr_eq(&prev_nested)));
    effect.dispose();
}

// ----------------------------------------------------------------------------
// Snapshots
// ----------------------------------------------------------------------------

/// State dumped on one thread boots the same graph on another.
#[test]
fn snapshot_boots_another_runtime() {
    let title = Signal::serializable(String::from("draft"));
    let tags = Signal::serializable(vec![String::from("a")]);
    title.set("published".into());
    tags.update(|t| {
        let mut t = t.clone();
        t.push("b".into());
        t
    });

    let bytes = snapshot::dump().unwrap().to_msgpack().unwrap();

    let restored = std::thread::spawn(move || {
        let snapshot = Snapshot::from_msgpack(&bytes).unwrap();
        // Nothing exists yet: everything stays pending.
        assert_eq!(snapshot::restore(&snapshot).unwrap(), 0);

        let title = Signal::serializable(String::from("draft"));
        let tags = Signal::serializable(Vec::<String>::new());
        (title.get(), tags.get())
    })
    .join()
    .unwrap();

    assert_eq!(
        restored,
        (String::from("published"), vec![String::from("a"), String::from("b")])
    );
}

/// Restoring into live signals re-runs their dependents once.
#[test]
fn snapshot_restore_into_live_graph() {
    let first = Signal::serializable(1_i32);
    let second = Signal::serializable(2_i32);
    let (runs, runs_clone) = counter();

    let (a, b) = (first.clone(), second.clone());
    let effect = Effect::new(move || {
        a.get();
        b.get();
        bump(&runs_clone);
    });

    let mut snapshot = snapshot::dump().unwrap();
    snapshot.insert(first.id(), json!(10));
    snapshot.insert(second.id(), json!(20));
    let text = snapshot.to_json().unwrap();

    let applied = snapshot::restore(&Snapshot::from_json(&text).unwrap()).unwrap();
    assert_eq!(applied, 2);
    assert_eq!(runs.get(), 2);
    assert_eq!((first.get(), second.get()), (10, 20));
    effect.dispose();
}
