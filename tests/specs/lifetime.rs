// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifetime-framework ordering scenarios.

use crate::prelude::*;
use cascade_lifetime::{FakeClock, LifetimeManager};
use cascade_sched::{ExclusionPolicy, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn scheduler() -> Scheduler {
    Scheduler::new(ExclusionPolicy::new(), 4)
}

fn manager(scheduler: &Scheduler) -> Arc<LifetimeManager> {
    LifetimeManager::new(scheduler, Arc::new(FakeClock::new()))
}

/// Deleting a mid-chain object destroys its subtree bottom-up and leaves
/// the parent untouched; the parent then tears down independently.
#[test]
fn parent_child_cascade() {
    let scheduler = scheduler();
    let manager = manager(&scheduler);
    let log = event_log();

    let a = Node::create(&manager, &log, "a", None);
    let b = Node::create(&manager, &log, "b", Some(&a.actor));
    let _c = Node::create(&manager, &log, "c", Some(&b.actor));

    b.actor.delete();
    scheduler.wait_idle();
    assert!(destroyed(&log, "c"));
    assert!(destroyed(&log, "b"));
    assert!(!destroyed(&log, "a"));
    assert!(
        event_pos(&log, "destroy:c") < event_pos(&log, "destroy:b"),
        "dependent destroyed before provider: {:?}",
        log.lock()
    );

    a.actor.delete();
    scheduler.wait_idle();
    assert!(destroyed(&log, "a"));
}

/// Re-pointing a lifetime ref before the old parent dies moves the
/// dependency; the old parent's deletion no longer reaches the dependent.
#[test]
fn reattach_survives_old_parent_delete() {
    let scheduler = scheduler();
    let manager = manager(&scheduler);
    let log = event_log();

    let a1 = Node::create(&manager, &log, "a1", None);
    let a2 = Node::create(&manager, &log, "a2", None);
    let b = Node::create(&manager, &log, "b", Some(&a1.actor));

    if let Some(parent_ref) = b.parent_ref.lock().as_mut() {
        parent_ref.reset(Some(&a2.actor));
    }
    a1.actor.delete();
    scheduler.wait_idle();

    assert!(destroyed(&log, "a1"));
    assert!(!destroyed(&log, "b"));

    a2.actor.delete();
    scheduler.wait_idle();
    assert!(destroyed(&log, "b"));
    assert!(destroyed(&log, "a2"));
}

/// A manager gate that refuses three passes defers destruction three times
/// (visible in the defer counter) and lets the fourth pass through.
#[test]
fn global_gate_defers_until_open() {
    let scheduler = scheduler();
    let passes = Arc::new(AtomicUsize::new(0));
    let passes2 = Arc::clone(&passes);
    let manager = LifetimeManager::with_gate(
        &scheduler,
        Arc::new(FakeClock::new()),
        Box::new(move || passes2.fetch_add(1, Ordering::SeqCst) >= 3),
    );
    let log = event_log();
    let node = Node::create(&manager, &log, "gated", None);

    node.actor.delete();
    scheduler.wait_idle();

    assert!(destroyed(&log, "gated"));
    assert_eq!(manager.defer_count(), 3);
}

/// Delete is idempotent; the terminal callbacks run exactly once.
#[test]
fn delete_terminals_run_exactly_once() {
    let scheduler = scheduler();
    let manager = manager(&scheduler);
    let log = event_log();
    let node = Node::create(&manager, &log, "x", None);

    node.actor.delete();
    node.actor.delete();
    node.actor.delete();
    scheduler.wait_idle();

    let events = log.lock().clone();
    assert_eq!(events.iter().filter(|e| *e == "complete:x").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "destroy:x").count(), 1);
}
