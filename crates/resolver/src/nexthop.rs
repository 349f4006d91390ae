// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Nexthop tracking via the backing table's condition listener.

use crate::path::ResolverPath;
use crate::resolver::PathResolver;
use crate::{RESOLVER_NEXTHOP_TASK, RESOLVER_PATH_TASK};
use cascade_lifetime::{LifetimeRef, ManagedDelete};
use cascade_sched::assert_context;
use cascade_table::{
    ConditionBase, ConditionMatch, Route, Table, CONFIG_TASK, TABLE_TASK,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A nexthop address being resolved against a backing table.
///
/// Created when the first resolver path asks for the `(address, table)`
/// pair and keyed by it in the resolver's nexthop map. Registration with
/// the backing table's condition listener is deferred to the resolver's
/// configuration pass; once registered, the match callback keeps a pointer
/// to the exactly-matching host route and schedules update passes for the
/// dependent resolver paths.
///
/// Per-partition dependent sets are only touched from that partition's own
/// contexts. The lifetime ref to the backing table's deleter keeps the
/// table from being destroyed while any nexthop still tracks it.
pub struct ResolverNexthop {
    resolver: Weak<PathResolver>,
    self_weak: Weak<ResolverNexthop>,
    address: IpAddr,
    table: Arc<Table>,
    cond: ConditionBase,
    registered: AtomicBool,
    route: Mutex<Option<Arc<Route>>>,
    rpath_lists: Vec<Mutex<HashMap<usize, Weak<ResolverPath>>>>,
    _table_delete_ref: LifetimeRef,
}

impl ResolverNexthop {
    pub(crate) fn new(
        resolver: &Arc<PathResolver>,
        address: IpAddr,
        table: &Arc<Table>,
    ) -> Arc<Self> {
        let partitions = resolver.table().partition_count();
        Arc::new_cyclic(|weak: &Weak<ResolverNexthop>| Self {
            resolver: Arc::downgrade(resolver),
            self_weak: weak.clone(),
            address,
            table: Arc::clone(table),
            cond: ConditionBase::new(),
            registered: AtomicBool::new(false),
            route: Mutex::new(None),
            rpath_lists: (0..partitions).map(|_| Mutex::new(HashMap::new())).collect(),
            _table_delete_ref: LifetimeRef::new(
                weak.clone() as Weak<dyn ManagedDelete>,
                table.deleter(),
            ),
        })
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// The backing table the address resolves against.
    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// The currently matching host route, if any.
    pub fn route(&self) -> Option<Arc<Route>> {
        self.route.lock().clone()
    }

    pub fn registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub(crate) fn set_registered(&self) {
        self.registered.store(true, Ordering::SeqCst);
    }

    /// Register a dependent path. The first dependent in a partition queues
    /// a registration pass. Partition contexts only.
    pub(crate) fn add_resolver_path(&self, part_id: usize, rpath: &Arc<ResolverPath>) {
        assert_context(&[TABLE_TASK, CONFIG_TASK]);
        let mut list = self.rpath_lists[part_id].lock();
        if list.is_empty() {
            if let (Some(resolver), Some(me)) = (self.resolver.upgrade(), self.self_weak.upgrade())
            {
                resolver.register_unregister_resolver_nexthop(&me);
            }
        }
        list.insert(Arc::as_ptr(rpath) as usize, Arc::downgrade(rpath));
    }

    /// Drop a dependent path. The last dependent in a partition queues an
    /// unregistration pass.
    pub(crate) fn remove_resolver_path(&self, part_id: usize, rpath_ptr: usize) {
        assert_context(&[RESOLVER_PATH_TASK]);
        let mut list = self.rpath_lists[part_id].lock();
        list.remove(&rpath_ptr);
        if list.is_empty() {
            if let (Some(resolver), Some(me)) = (self.resolver.upgrade(), self.self_weak.upgrade())
            {
                resolver.register_unregister_resolver_nexthop(&me);
            }
        }
    }

    /// Queue recomputation for every dependent path in every partition.
    /// Nexthop update context.
    pub(crate) fn trigger_all_resolver_paths(&self) {
        assert_context(&[RESOLVER_NEXTHOP_TASK]);
        let Some(resolver) = self.resolver.upgrade() else {
            return;
        };
        for (part_id, list) in self.rpath_lists.iter().enumerate() {
            let rpaths: Vec<Arc<ResolverPath>> =
                list.lock().values().filter_map(Weak::upgrade).collect();
            for rpath in rpaths {
                resolver.partition(part_id).trigger_path_resolution(&rpath);
            }
        }
    }

    /// True when no partition has dependent paths. Config context.
    pub(crate) fn empty(&self) -> bool {
        assert_context(&[CONFIG_TASK]);
        self.rpath_lists.iter().all(|list| list.lock().is_empty())
    }

    pub fn dependent_count(&self) -> usize {
        self.rpath_lists.iter().map(|list| list.lock().len()).sum()
    }
}

/// The nexthop has no children of its own to cascade to; the backing-table
/// edge exists purely to hold the table up until the nexthop is gone.
impl ManagedDelete for ResolverNexthop {
    fn managed_delete(&self) {}
}

impl ConditionMatch for ResolverNexthop {
    fn base(&self) -> &ConditionBase {
        &self.cond
    }

    /// Exact host-route match for the tracked address, run on the backing
    /// table's partition context. Keeps the route pointer and the listener
    /// match state in step, then schedules an update pass.
    fn matches(
        &self,
        table: &Arc<Table>,
        part_id: usize,
        route: &Arc<Route>,
        deleted: bool,
    ) -> bool {
        assert_context(&[TABLE_TASK]);
        if !route.prefix().is_host_for(&self.address) {
            return false;
        }
        let Some(me) = self.self_weak.upgrade() else {
            return false;
        };
        let cond: Arc<dyn ConditionMatch> = Arc::clone(&me) as Arc<dyn ConditionMatch>;
        let listener = table.condition_listener();
        let has_state = listener.check_match_state(part_id, route, &cond);
        if deleted {
            if has_state {
                *self.route.lock() = None;
                listener.remove_match_state(part_id, route, &cond);
            } else {
                return false;
            }
        } else if !has_state {
            *self.route.lock() = Some(Arc::clone(route));
            listener.set_match_state(part_id, route, &cond);
        }
        // Removal in progress: the resolver no longer wants updates.
        if self.cond.is_deleted() {
            return false;
        }
        if let Some(resolver) = self.resolver.upgrade() {
            resolver.update_resolver_nexthop(&me);
        }
        true
    }

    fn describe(&self) -> String {
        format!("ResolverNexthop {}", self.address)
    }
}
