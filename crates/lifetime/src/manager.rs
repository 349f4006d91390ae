// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serializes actor teardown onto the lifetime worker context.

use crate::actor::LifetimeActor;
use crate::clock::Clock;
use cascade_sched::{Scheduler, TaskContext, WorkQueue};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Global readiness gate consulted before any destruction.
pub type DestroyGate = dyn Fn() -> bool + Send + Sync;

static NEXT_MANAGER_ID: AtomicUsize = AtomicUsize::new(0);

/// Owns the delete queue for a set of actors. All cascade, shutdown,
/// readiness checks and destroy calls for those actors run on this
/// manager's `lifetime` context instance.
///
/// Every outstanding queue entry owns exactly one unit of the actor's
/// refcount; processing the entry consumes it. Deferrals by the gate
/// re-enqueue without touching the count, keeping the accounting balanced.
pub struct LifetimeManager {
    queue: WorkQueue<Arc<LifetimeActor>>,
    clock: Arc<dyn Clock>,
    gate: Option<Box<DestroyGate>>,
    defer_count: AtomicUsize,
}

impl LifetimeManager {
    pub const CONTEXT_TAG: &'static str = "lifetime";

    pub fn new(scheduler: &Scheduler, clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::build(scheduler, clock, None)
    }

    /// Manager whose destructions wait for `gate` to return true (e.g. a
    /// server-wide shutdown barrier).
    pub fn with_gate(
        scheduler: &Scheduler,
        clock: Arc<dyn Clock>,
        gate: Box<DestroyGate>,
    ) -> Arc<Self> {
        Self::build(scheduler, clock, Some(gate))
    }

    fn build(
        scheduler: &Scheduler,
        clock: Arc<dyn Clock>,
        gate: Option<Box<DestroyGate>>,
    ) -> Arc<Self> {
        let instance = NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed);
        let ctx = TaskContext::instanced(Self::CONTEXT_TAG, instance);
        Arc::new_cyclic(|weak: &Weak<LifetimeManager>| {
            let manager = weak.clone();
            let queue = WorkQueue::new(
                scheduler,
                ctx,
                Box::new(move |actor: Arc<LifetimeActor>| {
                    if let Some(manager) = manager.upgrade() {
                        manager.delete_executor(actor);
                    }
                }),
            );
            Self { queue, clock, gate, defer_count: AtomicUsize::new(0) }
        })
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Queue a delete event; takes one unit of the actor's refcount.
    /// Callable from any thread.
    pub fn enqueue(&self, actor: &Arc<LifetimeActor>) {
        actor.reference_increment();
        self.queue.enqueue(Arc::clone(actor));
    }

    /// Queue a delete event for a caller that already accounted for the
    /// reference.
    pub fn enqueue_no_increment(&self, actor: &Arc<LifetimeActor>) {
        self.queue.enqueue(Arc::clone(actor));
    }

    /// Number of times destruction was deferred by the gate.
    pub fn defer_count(&self) -> usize {
        self.defer_count.load(Ordering::Relaxed)
    }

    /// Whether global conditions permit destruction. True by default.
    pub fn may_destroy(&self) -> bool {
        self.gate.as_ref().map_or(true, |gate| gate())
    }

    /// Block or unblock the delete queue. Testing only.
    pub fn set_queue_disable(&self, disabled: bool) {
        self.queue.set_disable(disabled);
    }

    /// One dequeued delete event. First pass runs the cascade and shutdown;
    /// every pass then either defers on the global gate or consumes the
    /// queue's reference and destroys the object if it is ready.
    fn delete_executor(&self, actor: Arc<LifetimeActor>) {
        assert!(actor.is_deleted());
        if !actor.shutdown_invoked() {
            actor.propagate_delete();
            actor.run_shutdown();
            actor.set_shutdown_invoked();
        }
        if !self.may_destroy() {
            self.enqueue_no_increment(&actor);
            self.defer_count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if actor.reference_decrement_and_test() {
            tracing::debug!(
                create_usecs = actor.create_time_usecs(),
                delete_usecs = actor.delete_time_usecs(),
                "destroying actor"
            );
            actor.run_delete_complete();
            actor.run_destroy();
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
