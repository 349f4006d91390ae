// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tables: partitions, listeners, delete actor, resolver slot.

use crate::attr::AttrDb;
use crate::condition::ConditionListener;
use crate::partition::TablePartition;
use crate::prefix::Family;
use crate::route::Route;
use cascade_lifetime::{Lifetime, LifetimeActor, LifetimeManager};
use cascade_sched::Scheduler;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Identifier handed out by [`Table::register_listener`]; keys per-route
/// state slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

impl ListenerId {
    #[cfg(test)]
    pub(crate) fn for_tests(id: usize) -> Self {
        Self(id)
    }
}

/// Route-change callback: partition id plus the route.
pub type RouteListenerFn = dyn Fn(usize, &Arc<Route>) + Send + Sync;

struct ListenerMap {
    next: usize,
    listeners: HashMap<usize, Arc<RouteListenerFn>>,
}

type ResolverSlot = Option<Arc<dyn Any + Send + Sync>>;

/// A partitioned routing table with managed lifetime.
///
/// The table embeds its delete actor; deleting the table cascades to every
/// object holding a `LifetimeRef` to it (the path resolver, resolver
/// nexthops tracking it). Destruction waits until the resolver slot is
/// empty, the condition listener has no subscriptions and no routes remain.
pub struct Table {
    name: String,
    family: Family,
    scheduler: Scheduler,
    lifetime: Arc<LifetimeManager>,
    attr_db: Arc<AttrDb>,
    partitions: Vec<Arc<TablePartition>>,
    listeners: Mutex<ListenerMap>,
    condition_listener: ConditionListener,
    resolver: Mutex<ResolverSlot>,
    on_destroy: Mutex<Option<Box<dyn FnOnce(&Table) + Send>>>,
    deleter: Arc<LifetimeActor>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("family", &self.family)
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

impl Table {
    pub fn new(
        name: impl Into<String>,
        family: Family,
        partition_count: usize,
        scheduler: &Scheduler,
        lifetime: &Arc<LifetimeManager>,
        attr_db: &Arc<AttrDb>,
    ) -> Arc<Table> {
        let name = name.into();
        Arc::new_cyclic(|weak: &Weak<Table>| Table {
            name,
            family,
            scheduler: scheduler.clone(),
            lifetime: Arc::clone(lifetime),
            attr_db: Arc::clone(attr_db),
            partitions: (0..partition_count.max(1))
                .map(|part_id| TablePartition::new(part_id, weak.clone()))
                .collect(),
            listeners: Mutex::new(ListenerMap { next: 0, listeners: HashMap::new() }),
            condition_listener: ConditionListener::new(weak.clone()),
            resolver: Mutex::new(None),
            on_destroy: Mutex::new(None),
            deleter: LifetimeActor::new(Arc::clone(lifetime), weak.clone() as Weak<dyn Lifetime>),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition(&self, part_id: usize) -> &Arc<TablePartition> {
        &self.partitions[part_id]
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn lifetime_manager(&self) -> &Arc<LifetimeManager> {
        &self.lifetime
    }

    pub fn attr_db(&self) -> &Arc<AttrDb> {
        &self.attr_db
    }

    pub fn route_count(&self) -> usize {
        self.partitions.iter().map(|p| p.route_count()).sum()
    }

    /// Register a route-change listener; the returned id also keys
    /// per-route state slots.
    pub fn register_listener(&self, cb: Box<RouteListenerFn>) -> ListenerId {
        let mut map = self.listeners.lock();
        let id = map.next;
        map.next += 1;
        map.listeners.insert(id, Arc::from(cb));
        ListenerId(id)
    }

    pub fn unregister_listener(&self, id: ListenerId) {
        self.listeners.lock().listeners.remove(&id.0);
    }

    pub(crate) fn run_listeners(&self, part_id: usize, route: &Arc<Route>) {
        let listeners: Vec<Arc<RouteListenerFn>> = {
            let map = self.listeners.lock();
            map.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(part_id, route);
        }
    }

    pub fn condition_listener(&self) -> &ConditionListener {
        &self.condition_listener
    }

    pub fn deleter(&self) -> &Arc<LifetimeActor> {
        &self.deleter
    }

    pub fn is_deleted(&self) -> bool {
        self.deleter.is_deleted()
    }

    /// Trigger table teardown through the delete actor.
    pub fn delete(&self) {
        self.deleter.delete();
    }

    /// Re-enqueue the delete event after a readiness change.
    pub fn retry_delete(&self) {
        if self.deleter.is_deleted() {
            self.deleter.retry_delete();
        }
    }

    /// Install the table's path resolver. Held as `Any` so the table layer
    /// stays below the resolver crate.
    pub fn set_resolver(&self, resolver: Arc<dyn Any + Send + Sync>) {
        *self.resolver.lock() = Some(resolver);
    }

    pub fn resolver(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.resolver.lock().clone()
    }

    /// Release the resolver slot; the only legal way to free the resolver.
    /// Emptying the slot is a teardown event for a deleted table.
    pub fn take_resolver(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        let taken = self.resolver.lock().take();
        if taken.is_some() {
            self.retry_delete();
        }
        taken
    }

    pub(crate) fn set_on_destroy(&self, hook: Box<dyn FnOnce(&Table) + Send>) {
        *self.on_destroy.lock() = Some(hook);
    }
}

impl Lifetime for Table {
    fn may_delete(&self) -> bool {
        self.resolver.lock().is_none()
            && self.condition_listener.is_empty()
            && self.route_count() == 0
    }

    fn destroy(&self) {
        let hook = self.on_destroy.lock().take();
        if let Some(hook) = hook {
            hook(self);
        }
        tracing::debug!(table = %self.name, "table destroyed");
    }
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
