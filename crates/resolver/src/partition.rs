// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-partition resolver state: the path map and the update list.
//!
//! Each partition's update list is processed on the `resolver-path` context
//! with the partition index as the instance id, so all partitions work
//! concurrently. Exclusion of `table` and `resolver-path` on the same
//! partition makes it safe to install and remove resolved paths, and to
//! read the nexthop route's path list, from the update pass.

use crate::path::ResolverPath;
use crate::resolver::PathResolver;
use crate::{RESOLVER_NEXTHOP_TASK, RESOLVER_PATH_TASK};
use cascade_sched::{assert_context, Scheduler, TaskContext, TaskTrigger};
use cascade_table::{ListenerId, Path, Route, Table, CONFIG_TASK, TABLE_TASK};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// One partition of a [`PathResolver`].
pub struct PathResolverPartition {
    part_id: usize,
    table: Arc<Table>,
    listener_id: ListenerId,
    resolver: Weak<PathResolver>,
    self_weak: Weak<PathResolverPartition>,
    rpath_map: Mutex<HashMap<usize, Arc<ResolverPath>>>,
    rpath_update_list: Mutex<HashMap<usize, Arc<ResolverPath>>>,
    rpath_update_trigger: TaskTrigger,
}

impl PathResolverPartition {
    pub(crate) fn new(
        part_id: usize,
        table: &Arc<Table>,
        listener_id: ListenerId,
        resolver: Weak<PathResolver>,
        scheduler: &Scheduler,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<PathResolverPartition>| {
            let trigger_target = weak.clone();
            PathResolverPartition {
                part_id,
                table: Arc::clone(table),
                listener_id,
                resolver,
                self_weak: weak.clone(),
                rpath_map: Mutex::new(HashMap::new()),
                rpath_update_list: Mutex::new(HashMap::new()),
                rpath_update_trigger: TaskTrigger::new(
                    scheduler,
                    TaskContext::instanced(RESOLVER_PATH_TASK, part_id),
                    Box::new(move || match trigger_target.upgrade() {
                        Some(partition) => partition.process_update_list(),
                        None => true,
                    }),
                ),
            }
        })
    }

    pub fn part_id(&self) -> usize {
        self.part_id
    }

    pub(crate) fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub(crate) fn listener_id(&self) -> ListenerId {
        self.listener_id
    }

    /// Begin resolution for `path`. Skips paths that are not flagged for
    /// resolution and tables already being torn down.
    pub(crate) fn start_path_resolution(
        &self,
        path: &Arc<Path>,
        route: &Arc<Route>,
        nh_table: &Arc<Table>,
    ) {
        if !path.flags.resolve_nexthop {
            return;
        }
        if self.table.is_deleted() || nh_table.is_deleted() {
            return;
        }
        let Some(resolver) = self.resolver.upgrade() else {
            return;
        };
        let Some(me) = self.self_weak.upgrade() else {
            return;
        };
        let address = path.attrs().nexthop;
        let rnexthop = resolver.locate_resolver_nexthop(address, nh_table);
        assert!(
            self.find_resolver_path(path).is_none(),
            "resolution already started for path"
        );
        let rpath = ResolverPath::create(&me, path, route, &rnexthop);
        self.rpath_map.lock().insert(Arc::as_ptr(path) as usize, Arc::clone(&rpath));
        self.trigger_path_resolution(&rpath);
    }

    /// Refresh resolution for `path`. A nexthop (or backing table) change
    /// is handled as stop-and-restart.
    pub(crate) fn update_path_resolution(
        &self,
        path: &Arc<Path>,
        route: &Arc<Route>,
        nh_table: &Arc<Table>,
    ) {
        let Some(rpath) = self.find_resolver_path(path) else {
            self.start_path_resolution(path, route, nh_table);
            return;
        };
        let rnexthop = rpath.rnexthop();
        if rnexthop.address() != path.attrs().nexthop || !Arc::ptr_eq(rnexthop.table(), nh_table) {
            self.stop_path_resolution(path);
            self.start_path_resolution(path, route, nh_table);
        } else {
            self.trigger_path_resolution(&rpath);
        }
    }

    /// Stop resolution for `path`. The map entry goes right away; resolved
    /// paths and the resolver path itself are torn down on the next update
    /// pass.
    pub(crate) fn stop_path_resolution(&self, path: &Arc<Path>) {
        let removed = self.rpath_map.lock().remove(&(Arc::as_ptr(path) as usize));
        let Some(rpath) = removed else {
            return;
        };
        rpath.clear_path();
        self.trigger_path_resolution(&rpath);
    }

    /// Queue `rpath` for recomputation on this partition's worker.
    pub(crate) fn trigger_path_resolution(&self, rpath: &Arc<ResolverPath>) {
        assert_context(&[TABLE_TASK, RESOLVER_NEXTHOP_TASK, CONFIG_TASK]);
        self.rpath_update_list
            .lock()
            .insert(Arc::as_ptr(rpath) as usize, Arc::clone(rpath));
        self.rpath_update_trigger.set();
    }

    fn find_resolver_path(&self, path: &Arc<Path>) -> Option<Arc<ResolverPath>> {
        self.rpath_map.lock().get(&(Arc::as_ptr(path) as usize)).cloned()
    }

    /// Drain the update list. Resolver paths whose resolution has stopped
    /// are dropped here, which unlinks them from their nexthop.
    fn process_update_list(&self) -> bool {
        assert_context(&[RESOLVER_PATH_TASK]);
        let batch: Vec<Arc<ResolverPath>> =
            self.rpath_update_list.lock().drain().map(|(_, rpath)| rpath).collect();
        for rpath in batch {
            let _done = rpath.update_resolved_paths();
        }
        true
    }

    pub(crate) fn path_count(&self) -> usize {
        self.rpath_map.lock().len()
    }

    pub(crate) fn update_list_len(&self) -> usize {
        self.rpath_update_list.lock().len()
    }

    pub(crate) fn for_each_path(&self, mut f: impl FnMut(&Arc<ResolverPath>)) {
        for rpath in self.rpath_map.lock().values() {
            f(rpath);
        }
    }

    /// Disable update-list processing. Testing only.
    pub(crate) fn disable_update_processing(&self) {
        self.rpath_update_trigger.set_disable();
    }

    /// Enable update-list processing. Testing only.
    pub(crate) fn enable_update_processing(&self) {
        self.rpath_update_trigger.set_enable();
    }

    /// Pause update-list processing, keeping the edge. Testing only.
    pub(crate) fn pause_update_processing(&self) {
        self.rpath_update_trigger.set_deferred();
    }

    /// Resume update-list processing. Testing only.
    pub(crate) fn resume_update_processing(&self) {
        self.rpath_update_trigger.clear_deferred();
    }
}
