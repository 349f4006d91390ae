// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-object lifetime controller and the delete cascade.

use crate::dependency::{DependencyList, DependencyProvider, EdgeId};
use crate::manager::LifetimeManager;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Behavior a managed object supplies to its lifetime actor.
///
/// Conventionally the object itself implements this and embeds its actor as
/// a field named `deleter`.
pub trait Lifetime: Send + Sync {
    /// Pure readiness predicate; called under the actor mutex, so it must
    /// only take leaf locks of its own.
    fn may_delete(&self) -> bool;

    /// Idempotent cleanup, run on the manager context. Runs at least once
    /// before destruction and again on every fresh enqueue.
    fn shutdown(&self) {}

    /// Runs exactly once, immediately before `destroy`.
    fn delete_complete(&self) {}

    /// Releases the surrounding object. Must be the last observable effect.
    fn destroy(&self);
}

/// Cascade entry point for dependents. Implementations route the upcall to
/// the dependent's own actor `delete`.
pub trait ManagedDelete: Send + Sync {
    fn managed_delete(&self);
}

/// Node stored in an actor's dependent list.
pub type CascadeNode = Weak<dyn ManagedDelete>;

struct ActorState {
    refcount: i64,
    delete_paused: bool,
    dependents: DependencyList<CascadeNode>,
}

/// Lifetime controller embedded in a managed object.
///
/// Holds the deletion state machine: Live until `delete`, then Deleted; the
/// manager's executor runs the cascade and `shutdown`, and destroys the
/// object once the refcount is zero, the dependent list is empty, deletion
/// is not paused and `may_delete` holds.
pub struct LifetimeActor {
    manager: Arc<LifetimeManager>,
    target: Weak<dyn Lifetime>,
    self_weak: Weak<LifetimeActor>,
    deleted: AtomicBool,
    shutdown_invoked: AtomicBool,
    create_time_usecs: u64,
    delete_time_usecs: AtomicU64,
    state: Mutex<ActorState>,
}

impl LifetimeActor {
    /// Build an actor for `target`. Call from `Arc::new_cyclic` of the
    /// object embedding the actor so the weak points at that object.
    pub fn new(manager: Arc<LifetimeManager>, target: Weak<dyn Lifetime>) -> Arc<Self> {
        let create_time_usecs = manager.clock().now_usecs();
        Arc::new_cyclic(|self_weak| Self {
            manager,
            target,
            self_weak: self_weak.clone(),
            deleted: AtomicBool::new(false),
            shutdown_invoked: AtomicBool::new(false),
            create_time_usecs,
            delete_time_usecs: AtomicU64::new(0),
            state: Mutex::new(ActorState {
                refcount: 0,
                delete_paused: false,
                dependents: DependencyList::new(),
            }),
        })
    }

    /// Trigger deletion of the managed object and, transitively, all of its
    /// dependents. Idempotent; callable from any thread. The cascade itself
    /// runs later on the manager context.
    pub fn delete(&self) {
        if self.deleted.swap(true, Ordering::SeqCst) {
            return;
        }
        self.delete_time_usecs
            .store(self.manager.clock().now_usecs(), Ordering::Relaxed);
        if let Some(me) = self.self_weak.upgrade() {
            self.manager.enqueue(&me);
        }
    }

    /// Re-enqueue a deleted actor after a readiness change.
    pub fn retry_delete(&self) {
        assert!(self.is_deleted());
        if let Some(me) = self.self_weak.upgrade() {
            self.manager.enqueue(&me);
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    /// Prevent destruction. Testing only; the scheduler must be stopped and
    /// the actor must not yet be deleted.
    pub fn pause_delete(&self) {
        let mut state = self.state.lock();
        assert!(!self.is_deleted());
        state.delete_paused = true;
    }

    /// Allow destruction again. Testing only; the scheduler must be stopped.
    pub fn resume_delete(&self) {
        let mut state = self.state.lock();
        assert!(self.is_deleted());
        state.delete_paused = false;
        state.refcount += 1;
        drop(state);
        if let Some(me) = self.self_weak.upgrade() {
            self.manager.enqueue_no_increment(&me);
        }
    }

    /// Take a lightweight (non-graph) reference.
    ///
    /// The caller must already hold the object alive through a dependency
    /// or a check its `may_delete` performs.
    pub fn reference_increment(&self) {
        self.state.lock().refcount += 1;
    }

    /// Drop a lightweight reference and test readiness: zero refcount, no
    /// dependents, deletion not paused, and the object's `may_delete` holds.
    pub fn reference_decrement_and_test(&self) -> bool {
        let mut state = self.state.lock();
        state.refcount -= 1;
        state.refcount == 0
            && state.dependents.is_empty()
            && !state.delete_paused
            && self.target.upgrade().is_some_and(|t| t.may_delete())
    }

    pub fn shutdown_invoked(&self) -> bool {
        self.shutdown_invoked.load(Ordering::SeqCst)
    }

    pub(crate) fn set_shutdown_invoked(&self) {
        self.shutdown_invoked.store(true, Ordering::SeqCst);
    }

    pub fn create_time_usecs(&self) -> u64 {
        self.create_time_usecs
    }

    pub fn delete_time_usecs(&self) -> u64 {
        self.delete_time_usecs.load(Ordering::Relaxed)
    }

    /// Deliver the cascade: every dependent present when the lock is taken
    /// receives its upcall exactly once. Manager context only.
    ///
    /// The list is snapshotted first; dependents commonly sever their own
    /// edge (or die) while the cascade runs.
    pub(crate) fn propagate_delete(&self) {
        assert!(self.is_deleted());
        let snapshot: Vec<CascadeNode> = {
            let state = self.state.lock();
            state.dependents.iter().cloned().collect()
        };
        for node in snapshot {
            if let Some(dependent) = node.upgrade() {
                dependent.managed_delete();
            }
        }
    }

    pub(crate) fn run_shutdown(&self) {
        if let Some(target) = self.target.upgrade() {
            target.shutdown();
        }
    }

    pub(crate) fn run_delete_complete(&self) {
        if let Some(target) = self.target.upgrade() {
            target.delete_complete();
        }
    }

    pub(crate) fn run_destroy(&self) {
        if let Some(target) = self.target.upgrade() {
            target.destroy();
        }
    }
}

impl DependencyProvider<CascadeNode> for LifetimeActor {
    fn dependency_add(&self, node: CascadeNode) -> EdgeId {
        let mut state = self.state.lock();
        assert!(!self.is_deleted(), "dependency added to a deleted actor");
        state.dependents.add(node)
    }

    /// Dependents may detach while this actor is still live (their own
    /// deletion, or a re-parenting). When a deleted actor's list empties,
    /// that is the event that re-evaluates its long-deferred destruction.
    fn dependency_remove(&self, id: EdgeId) {
        let mut state = self.state.lock();
        state.dependents.remove(id);
        if self.is_deleted() && state.dependents.is_empty() {
            state.refcount += 1;
            drop(state);
            if let Some(me) = self.self_weak.upgrade() {
                self.manager.enqueue_no_increment(&me);
            }
        }
    }
}

#[cfg(test)]
#[path = "actor_tests.rs"]
mod tests;
