// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for lifetime tests: a managed node with an actor, an
//! optional parent edge, and an event log.

use crate::actor::{Lifetime, LifetimeActor, ManagedDelete};
use crate::clock::FakeClock;
use crate::lifetime_ref::LifetimeRef;
use crate::manager::LifetimeManager;
use cascade_sched::{ExclusionPolicy, Scheduler};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn test_scheduler() -> Scheduler {
    Scheduler::new(ExclusionPolicy::new(), 4)
}

pub fn test_manager(scheduler: &Scheduler) -> (Arc<LifetimeManager>, Arc<FakeClock>) {
    let clock = Arc::new(FakeClock::new());
    let manager = LifetimeManager::new(scheduler, Arc::clone(&clock) as Arc<dyn crate::Clock>);
    (manager, clock)
}

/// A managed object: embeds its actor, optionally a ref to a parent actor,
/// and holds itself alive until `destroy` releases the slot.
pub struct TestNode {
    pub name: &'static str,
    log: EventLog,
    holder: Arc<Mutex<Option<Arc<TestNode>>>>,
    pub actor: Arc<LifetimeActor>,
    pub parent_ref: Mutex<Option<LifetimeRef>>,
}

impl TestNode {
    pub fn create(
        manager: &Arc<LifetimeManager>,
        log: &EventLog,
        name: &'static str,
        parent: Option<&Arc<LifetimeActor>>,
    ) -> Arc<TestNode> {
        let holder = Arc::new(Mutex::new(None));
        let node = Arc::new_cyclic(|weak: &Weak<TestNode>| TestNode {
            name,
            log: Arc::clone(log),
            holder: Arc::clone(&holder),
            actor: LifetimeActor::new(
                Arc::clone(manager),
                weak.clone() as Weak<dyn Lifetime>,
            ),
            parent_ref: Mutex::new(
                parent.map(|p| LifetimeRef::new(weak.clone() as Weak<dyn ManagedDelete>, p)),
            ),
        });
        *holder.lock() = Some(Arc::clone(&node));
        node
    }

    pub fn destroyed(log: &EventLog, name: &str) -> bool {
        log.lock().iter().any(|e| e == &format!("destroy:{name}"))
    }
}

impl Lifetime for TestNode {
    fn may_delete(&self) -> bool {
        true
    }

    fn shutdown(&self) {
        self.log.lock().push(format!("shutdown:{}", self.name));
    }

    fn delete_complete(&self) {
        self.log.lock().push(format!("complete:{}", self.name));
    }

    fn destroy(&self) {
        self.parent_ref.lock().take();
        self.holder.lock().take();
        self.log.lock().push(format!("destroy:{}", self.name));
    }
}

impl ManagedDelete for TestNode {
    fn managed_delete(&self) {
        self.actor.delete();
    }
}
