// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-table path resolver.
//!
//! Concurrency notes:
//! - Resolution APIs and the nexthop match callback run on `table`.
//! - The nexthop register/unregister list is processed on `config`.
//! - The nexthop update list is processed on `resolver-nexthop`.
//! - Resolver-path updates run on `resolver-path`, sharded by partition.
//!
//! The mutex guards the nexthop map and all three nexthop lists; entries
//! are inserted from table contexts while removal happens on `config`,
//! which the scheduler excludes from everything else that touches them.

use crate::nexthop::ResolverNexthop;
use crate::partition::PathResolverPartition;
use crate::show::{ShowPathResolver, ShowResolverNexthop, ShowResolverPath};
use crate::RESOLVER_NEXTHOP_TASK;
use cascade_lifetime::{Lifetime, LifetimeActor, LifetimeRef, ManagedDelete};
use cascade_sched::{assert_context, TaskContext, TaskTrigger};
use cascade_table::{
    ConditionMatch, Family, ListenerId, Path, Route, Table, CONFIG_TASK, TABLE_TASK,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::net::IpAddr;
use std::sync::{Arc, Weak};

type NexthopKey = (IpAddr, String);

#[derive(Default)]
struct ResolverMaps {
    nexthop_map: IndexMap<NexthopKey, Arc<ResolverNexthop>>,
    reg_unreg_list: IndexMap<usize, Arc<ResolverNexthop>>,
    update_list: IndexMap<usize, Arc<ResolverNexthop>>,
    delete_list: IndexMap<usize, Arc<ResolverNexthop>>,
}

fn nexthop_ptr(rnexthop: &Arc<ResolverNexthop>) -> usize {
    Arc::as_ptr(rnexthop) as usize
}

/// One resolver per table that hosts paths needing resolution.
///
/// Owns the nexthop map and the per-partition workers, and ties into the
/// lifetime framework: its delete actor cascades from the host table's
/// actor, and `may_delete` holds only once the nexthop map, the delete
/// list and the register/unregister list have all drained.
pub struct PathResolver {
    table: Arc<Table>,
    listener_id: ListenerId,
    self_weak: Weak<PathResolver>,
    maps: Mutex<ResolverMaps>,
    nexthop_reg_unreg_trigger: TaskTrigger,
    nexthop_update_trigger: TaskTrigger,
    partitions: Vec<Arc<PathResolverPartition>>,
    deleter: Arc<LifetimeActor>,
    _table_delete_ref: LifetimeRef,
}

impl PathResolver {
    /// Create the resolver for `table` and install it in the table's
    /// resolver slot.
    pub fn create(table: &Arc<Table>) -> Arc<PathResolver> {
        let scheduler = table.scheduler().clone();
        // The listener is never told anything; registering only reserves
        // the id resolver paths use for per-route state slots.
        let listener_id = table.register_listener(Box::new(|_part_id, _route| {}));
        let resolver = Arc::new_cyclic(|weak: &Weak<PathResolver>| {
            let reg_unreg_target = weak.clone();
            let update_target = weak.clone();
            PathResolver {
                table: Arc::clone(table),
                listener_id,
                self_weak: weak.clone(),
                maps: Mutex::new(ResolverMaps::default()),
                nexthop_reg_unreg_trigger: TaskTrigger::new(
                    &scheduler,
                    TaskContext::singleton(CONFIG_TASK),
                    Box::new(move || match reg_unreg_target.upgrade() {
                        Some(resolver) => resolver.process_nexthop_reg_unreg_list(),
                        None => true,
                    }),
                ),
                nexthop_update_trigger: TaskTrigger::new(
                    &scheduler,
                    TaskContext::singleton(RESOLVER_NEXTHOP_TASK),
                    Box::new(move || match update_target.upgrade() {
                        Some(resolver) => resolver.process_nexthop_update_list(),
                        None => true,
                    }),
                ),
                partitions: (0..table.partition_count())
                    .map(|part_id| {
                        PathResolverPartition::new(
                            part_id,
                            table,
                            listener_id,
                            weak.clone(),
                            &scheduler,
                        )
                    })
                    .collect(),
                deleter: LifetimeActor::new(
                    Arc::clone(table.lifetime_manager()),
                    weak.clone() as Weak<dyn Lifetime>,
                ),
                _table_delete_ref: LifetimeRef::new(
                    weak.clone() as Weak<dyn ManagedDelete>,
                    table.deleter(),
                ),
            }
        });
        table.set_resolver(Arc::clone(&resolver) as Arc<dyn Any + Send + Sync>);
        resolver
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn family(&self) -> Family {
        self.table.family()
    }

    pub fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    pub(crate) fn partition(&self, part_id: usize) -> &Arc<PathResolverPartition> {
        &self.partitions[part_id]
    }

    /// Request resolution for `path`, whose resolved paths land on
    /// `route`. Defaults the backing table to the host table. Must be
    /// called from the partition's `table` context.
    pub fn start_path_resolution(
        &self,
        part_id: usize,
        path: &Arc<Path>,
        route: &Arc<Route>,
        nh_table: Option<&Arc<Table>>,
    ) {
        assert_context(&[TABLE_TASK, CONFIG_TASK]);
        let nh_table = nh_table.unwrap_or(&self.table);
        self.partitions[part_id].start_path_resolution(path, route, nh_table);
    }

    /// Refresh resolution after the path's attributes changed. Must be
    /// called from the partition's `table` context.
    pub fn update_path_resolution(
        &self,
        part_id: usize,
        path: &Arc<Path>,
        route: &Arc<Route>,
        nh_table: Option<&Arc<Table>>,
    ) {
        assert_context(&[TABLE_TASK]);
        let nh_table = nh_table.unwrap_or(&self.table);
        self.partitions[part_id].update_path_resolution(path, route, nh_table);
    }

    /// Stop resolution for `path`. Must be called from the partition's
    /// `table` context.
    pub fn stop_path_resolution(&self, part_id: usize, path: &Arc<Path>) {
        assert_context(&[TABLE_TASK, CONFIG_TASK]);
        self.partitions[part_id].stop_path_resolution(path);
    }

    /// Find or create the nexthop for `(address, table)`. A nexthop that
    /// has left the map is never resurrected; a fresh one takes its key.
    pub(crate) fn locate_resolver_nexthop(
        self: &Arc<Self>,
        address: IpAddr,
        table: &Arc<Table>,
    ) -> Arc<ResolverNexthop> {
        let key = (address, table.name().to_string());
        if let Some(existing) = self.maps.lock().nexthop_map.get(&key) {
            return Arc::clone(existing);
        }
        // Construct outside the lock: the nexthop links a lifetime ref to
        // the backing table's actor.
        let fresh = ResolverNexthop::new(self, address, table);
        let mut maps = self.maps.lock();
        Arc::clone(maps.nexthop_map.entry(key).or_insert(fresh))
    }

    /// Drop the nexthop from the map and the update list. Deletion fully
    /// drains pending updates; the two lists never hold a nexthop at the
    /// same time.
    pub(crate) fn remove_resolver_nexthop(&self, rnexthop: &Arc<ResolverNexthop>) {
        assert_context(&[CONFIG_TASK]);
        let key = (rnexthop.address(), rnexthop.table().name().to_string());
        let mut maps = self.maps.lock();
        if let Some(existing) = maps.nexthop_map.get(&key) {
            if Arc::ptr_eq(existing, rnexthop) {
                maps.nexthop_map.shift_remove(&key);
            }
        }
        maps.update_list.shift_remove(&nexthop_ptr(rnexthop));
    }

    /// Queue an update pass for the nexthop's dependents. Only nexthops
    /// still in the map accept updates; removal purges the update list
    /// under the same lock, so the update and delete lists never share an
    /// entry.
    pub(crate) fn update_resolver_nexthop(&self, rnexthop: &Arc<ResolverNexthop>) {
        let key = (rnexthop.address(), rnexthop.table().name().to_string());
        let mut maps = self.maps.lock();
        let in_map = maps
            .nexthop_map
            .get(&key)
            .is_some_and(|existing| Arc::ptr_eq(existing, rnexthop));
        if !in_map {
            return;
        }
        maps.update_list.insert(nexthop_ptr(rnexthop), Arc::clone(rnexthop));
        drop(maps);
        self.nexthop_update_trigger.set();
    }

    /// Queue a register/unregister pass for the nexthop. The operation is
    /// not recorded; it is inferred from the nexthop's state when the list
    /// is processed.
    pub(crate) fn register_unregister_resolver_nexthop(&self, rnexthop: &Arc<ResolverNexthop>) {
        self.maps
            .lock()
            .reg_unreg_list
            .insert(nexthop_ptr(rnexthop), Arc::clone(rnexthop));
        self.nexthop_reg_unreg_trigger.set();
    }

    /// The condition listener confirmed removal; queue the final
    /// unregister. Runs on a `table` context.
    fn unregister_resolver_nexthop_done(&self, rnexthop: Arc<ResolverNexthop>) {
        assert_context(&[TABLE_TASK]);
        assert!(rnexthop.registered());
        assert!(rnexthop.base().is_deleted());
        assert!(self
            .maps
            .lock()
            .delete_list
            .contains_key(&nexthop_ptr(&rnexthop)));
        self.register_unregister_resolver_nexthop(&rnexthop);
    }

    /// One nexthop from the register/unregister list. Returns true when
    /// the nexthop is done for and the caller should drop it.
    fn process_nexthop_reg_unreg(&self, rnexthop: &Arc<ResolverNexthop>) -> bool {
        assert_context(&[CONFIG_TASK]);
        let table = Arc::clone(rnexthop.table());
        let listener = table.condition_listener();
        let cond: Arc<dyn ConditionMatch> = Arc::clone(rnexthop) as Arc<dyn ConditionMatch>;

        if rnexthop.registered() {
            if rnexthop.base().is_deleted() {
                // Remove has completed; unregistering is the final step of
                // the nexthop's lifetime.
                self.maps.lock().delete_list.shift_remove(&nexthop_ptr(rnexthop));
                listener.unregister_match_condition(&cond);
                tracing::debug!(nexthop = %rnexthop.address(), "nexthop unregistered");
            } else if rnexthop.empty() {
                // No more users: take it out of the map, park it on the
                // delete list and ask the listener for asynchronous
                // removal. The delete list keeps the resolver itself from
                // being destroyed while removal is in flight.
                self.remove_resolver_nexthop(rnexthop);
                self.maps
                    .lock()
                    .delete_list
                    .insert(nexthop_ptr(rnexthop), Arc::clone(rnexthop));
                let target = self.self_weak.clone();
                let pending = Arc::clone(rnexthop);
                listener.remove_match_condition(
                    cond,
                    Box::new(move || {
                        if let Some(resolver) = target.upgrade() {
                            resolver.unregister_resolver_nexthop_done(pending);
                        }
                    }),
                );
            }
        } else if !rnexthop.empty() {
            // Register unless the backing table is on its way out; the
            // listener does not accept conditions on a deleting table.
            if !table.is_deleted() {
                listener.add_match_condition(cond);
                rnexthop.set_registered();
                tracing::debug!(nexthop = %rnexthop.address(), "nexthop registered");
            }
        } else {
            // Never registered and already unused: either the paths came
            // and went before this pass, or the backing table was deleting
            // when registration was attempted.
            self.remove_resolver_nexthop(rnexthop);
            return true;
        }
        false
    }

    /// Process the register/unregister list on the configuration worker.
    fn process_nexthop_reg_unreg_list(&self) -> bool {
        assert_context(&[CONFIG_TASK]);
        let batch: Vec<Arc<ResolverNexthop>> = {
            let mut maps = self.maps.lock();
            maps.reg_unreg_list.drain(..).map(|(_, rnexthop)| rnexthop).collect()
        };
        for rnexthop in batch {
            let _destroy = self.process_nexthop_reg_unreg(&rnexthop);
        }
        self.retry_delete();
        true
    }

    /// Process the update list on the nexthop worker: fan the change out
    /// to every dependent resolver path in every partition.
    fn process_nexthop_update_list(&self) -> bool {
        assert_context(&[RESOLVER_NEXTHOP_TASK]);
        let batch: Vec<Arc<ResolverNexthop>> = {
            let mut maps = self.maps.lock();
            maps.update_list.drain(..).map(|(_, rnexthop)| rnexthop).collect()
        };
        for rnexthop in batch {
            assert!(!rnexthop.base().is_deleted());
            rnexthop.trigger_all_resolver_paths();
        }
        true
    }

    pub fn is_deleted(&self) -> bool {
        self.deleter.is_deleted()
    }

    /// Re-enqueue the delete event after teardown progress.
    pub fn retry_delete(&self) {
        if self.deleter.is_deleted() {
            self.deleter.retry_delete();
        }
    }

    /// Snapshot counters and listings for introspection.
    pub fn fill_show_info(&self, summary: bool) -> ShowPathResolver {
        let mut path_count = 0;
        let mut modified_path_count = 0;
        let mut paths = Vec::new();
        for partition in &self.partitions {
            path_count += partition.path_count();
            modified_path_count += partition.update_list_len();
            if !summary {
                partition.for_each_path(|rpath| {
                    paths.push(ShowResolverPath {
                        prefix: rpath.route().prefix().to_string(),
                        nexthop: rpath.rnexthop().address().to_string(),
                        resolved_path_count: rpath.resolved_path_count(),
                    });
                });
            }
        }
        let maps = self.maps.lock();
        let nexthops = if summary {
            Vec::new()
        } else {
            maps.nexthop_map
                .values()
                .map(|rnexthop| ShowResolverNexthop {
                    address: rnexthop.address().to_string(),
                    table: rnexthop.table().name().to_string(),
                    registered: rnexthop.registered(),
                    has_route: rnexthop.route().is_some(),
                })
                .collect()
        };
        ShowPathResolver {
            name: self.table.name().to_string(),
            path_count,
            modified_path_count,
            nexthop_count: maps.nexthop_map.len(),
            modified_nexthop_count: maps.reg_unreg_list.len()
                + maps.delete_list.len()
                + maps.update_list.len(),
            paths,
            nexthops,
        }
    }

    // Testing hooks.

    /// Disable register/unregister processing. Testing only.
    pub fn disable_reg_unreg_processing(&self) {
        self.nexthop_reg_unreg_trigger.set_disable();
    }

    /// Enable register/unregister processing. Testing only.
    pub fn enable_reg_unreg_processing(&self) {
        self.nexthop_reg_unreg_trigger.set_enable();
    }

    /// Disable nexthop update processing. Testing only.
    pub fn disable_nexthop_update_processing(&self) {
        self.nexthop_update_trigger.set_disable();
    }

    /// Enable nexthop update processing. Testing only.
    pub fn enable_nexthop_update_processing(&self) {
        self.nexthop_update_trigger.set_enable();
    }

    /// Disable resolver-path update processing in all partitions. Testing
    /// only.
    pub fn disable_path_update_processing(&self) {
        for partition in &self.partitions {
            partition.disable_update_processing();
        }
    }

    /// Enable resolver-path update processing in all partitions. Testing
    /// only.
    pub fn enable_path_update_processing(&self) {
        for partition in &self.partitions {
            partition.enable_update_processing();
        }
    }

    /// Pause resolver-path update processing in all partitions. Testing
    /// only.
    pub fn pause_path_update_processing(&self) {
        for partition in &self.partitions {
            partition.pause_update_processing();
        }
    }

    /// Resume resolver-path update processing in all partitions. Testing
    /// only.
    pub fn resume_path_update_processing(&self) {
        for partition in &self.partitions {
            partition.resume_update_processing();
        }
    }

    pub fn nexthop_map_len(&self) -> usize {
        self.maps.lock().nexthop_map.len()
    }

    pub fn reg_unreg_list_len(&self) -> usize {
        self.maps.lock().reg_unreg_list.len()
    }

    pub fn update_list_len(&self) -> usize {
        self.maps.lock().update_list.len()
    }

    pub fn delete_list_len(&self) -> usize {
        self.maps.lock().delete_list.len()
    }

    pub fn path_update_list_len(&self) -> usize {
        self.partitions.iter().map(|p| p.update_list_len()).sum()
    }
}

/// Cascade entry from the host table's delete actor.
impl ManagedDelete for PathResolver {
    fn managed_delete(&self) {
        self.deleter.delete();
    }
}

impl Lifetime for PathResolver {
    fn may_delete(&self) -> bool {
        let maps = self.maps.lock();
        if !maps.nexthop_map.is_empty()
            || !maps.delete_list.is_empty()
            || !maps.reg_unreg_list.is_empty()
        {
            return false;
        }
        // Updates cannot outlive their nexthops.
        assert!(maps.update_list.is_empty());
        true
    }

    fn destroy(&self) {
        self.table.take_resolver();
        tracing::debug!(table = %self.table.name(), "path resolver destroyed");
    }
}

impl Drop for PathResolver {
    fn drop(&mut self) {
        self.table.unregister_listener(self.listener_id);
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
