// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resolver paths and the pinned host-route state.

use crate::map_sync::map_synchronize;
use crate::nexthop::ResolverNexthop;
use crate::partition::PathResolverPartition;
use crate::RESOLVER_PATH_TASK;
use cascade_sched::assert_context;
use cascade_table::{
    ecmp_cmp, merge_forwarding_communities, Attrs, ListenerId, Path, PathFlags, PathKey, Route,
    Table,
};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Weak};

/// Pins the host route (the route resolved paths are installed on) for as
/// long as any resolver path targets it.
///
/// Stored as a weak in the route's listener state slot; the strong
/// references live in the resolver paths, all on one partition, so the
/// count needs no atomics beyond `Arc`'s. Dropping the last reference
/// clears the slot and lets the partition erase a deleted route.
pub struct ResolverRouteState {
    table: Weak<Table>,
    part_id: usize,
    route: Arc<Route>,
    listener_id: ListenerId,
}

impl ResolverRouteState {
    /// Find or create the state pinning `route`.
    pub(crate) fn locate(
        partition: &PathResolverPartition,
        route: &Arc<Route>,
    ) -> Arc<ResolverRouteState> {
        let listener_id = partition.listener_id();
        let existing = route
            .with_state(listener_id, |slot| {
                slot.and_then(|s| s.downcast_ref::<Weak<ResolverRouteState>>()).cloned()
            })
            .and_then(|weak| weak.upgrade());
        if let Some(existing) = existing {
            return existing;
        }
        let state = Arc::new(ResolverRouteState {
            table: Arc::downgrade(partition.table()),
            part_id: partition.part_id(),
            route: Arc::clone(route),
            listener_id,
        });
        route.set_state(listener_id, Box::new(Arc::downgrade(&state)));
        state
    }
}

impl Drop for ResolverRouteState {
    fn drop(&mut self) {
        self.route.clear_state(self.listener_id);
        if let Some(table) = self.table.upgrade() {
            table.partition(self.part_id).maybe_erase(&self.route);
        }
    }
}

/// A path for which resolution has been requested.
///
/// Lives in the partition's path map while resolution is wanted. After
/// `stop` the map entry is gone and the requesting path is cleared, but the
/// object survives until the partition's next update pass reconciles the
/// resolved-path set down to empty and drops it.
pub struct ResolverPath {
    partition: Weak<PathResolverPartition>,
    part_id: usize,
    path: Mutex<Option<Arc<Path>>>,
    route: Arc<Route>,
    rnexthop: Arc<ResolverNexthop>,
    _state: Arc<ResolverRouteState>,
    resolved: Mutex<BTreeMap<PathKey, Arc<Path>>>,
}

impl ResolverPath {
    /// Build a resolver path and link it as a dependent of the nexthop.
    /// The caller inserts it into the partition map.
    pub(crate) fn create(
        partition: &Arc<PathResolverPartition>,
        path: &Arc<Path>,
        route: &Arc<Route>,
        rnexthop: &Arc<ResolverNexthop>,
    ) -> Arc<ResolverPath> {
        let rpath = Arc::new(ResolverPath {
            partition: Arc::downgrade(partition),
            part_id: partition.part_id(),
            path: Mutex::new(Some(Arc::clone(path))),
            route: Arc::clone(route),
            rnexthop: Arc::clone(rnexthop),
            _state: ResolverRouteState::locate(partition, route),
            resolved: Mutex::new(BTreeMap::new()),
        });
        rnexthop.add_resolver_path(partition.part_id(), &rpath);
        rpath
    }

    /// The route resolved paths are installed on.
    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn rnexthop(&self) -> &Arc<ResolverNexthop> {
        &self.rnexthop
    }

    /// Forget the requesting path; resolution has been stopped and the next
    /// update pass will drain and destroy this object.
    pub(crate) fn clear_path(&self) {
        *self.path.lock() = None;
    }

    pub fn resolved_path_count(&self) -> usize {
        self.resolved.lock().len()
    }

    /// Recompute the resolved-path set from the nexthop route and apply the
    /// diff to the host route. Returns true when resolution has been
    /// stopped and the object may be dropped; a missing nexthop route alone
    /// never destroys the resolver path.
    pub(crate) fn update_resolved_paths(&self) -> bool {
        assert_context(&[RESOLVER_PATH_TASK]);
        let Some(partition) = self.partition.upgrade() else {
            return self.path.lock().is_none();
        };
        let table = partition.table();
        let attr_db = table.attr_db();

        let path = self.path.lock().clone();
        let nh_route = self.rnexthop.route();
        let mut future: BTreeMap<PathKey, Arc<Path>> = BTreeMap::new();
        if let (Some(path), Some(nh_route)) = (path.as_ref(), nh_route.as_ref()) {
            let best = nh_route.best_path();
            let mut seen_forwarding: HashSet<(IpAddr, u32)> = HashSet::new();
            for nh_path in nh_route.paths() {
                // The walk stops at the first infeasible path and at the
                // edge of the ECMP best group.
                if !nh_path.is_feasible() {
                    break;
                }
                if let Some(best) = best.as_ref() {
                    if ecmp_cmp(best, &nh_path) != Ordering::Equal {
                        break;
                    }
                }
                let nh_attrs = nh_path.attrs();
                if !seen_forwarding.insert((nh_attrs.nexthop, nh_path.label)) {
                    continue;
                }
                let Some(source_rd) = nh_attrs.source_rd.clone() else {
                    continue;
                };

                let mut attrs =
                    attr_db.replace_source_rd_and_locate(&path.attrs(), Some(source_rd));
                attrs = attr_db.replace_nexthop_and_locate(&attrs, nh_attrs.nexthop);
                let ext = merge_forwarding_communities(&attrs, &nh_attrs);
                attrs = attr_db.replace_ext_communities_and_locate(&attrs, ext);

                let path_id = path_id_for(&nh_attrs.nexthop);
                let resolved = self.locate_resolved_path(path, path_id, &attrs, nh_path.label);
                future.insert(resolved.key(), resolved);
            }
        }

        let current = self.resolved.lock().clone();
        map_synchronize(
            &current,
            &future,
            |_key, added| self.add_resolved_path(added),
            |key, removed| self.delete_resolved_path(key, removed),
        );

        let table_partition = table.partition(self.part_id);
        if self.route.best_path().is_some() {
            table_partition.notify(&self.route);
        } else {
            table_partition.delete_route(&self.route);
        }

        self.path.lock().is_none()
    }

    /// Reuse the identical resolved path if one is already installed.
    fn locate_resolved_path(
        &self,
        orig: &Arc<Path>,
        path_id: u32,
        attrs: &Arc<Attrs>,
        label: u32,
    ) -> Arc<Path> {
        let key = PathKey {
            peer: orig.peer.as_ref().map(|p| p.name.clone()),
            path_id,
            attrs: Arc::as_ptr(attrs) as usize,
            label,
        };
        if let Some(existing) = self.resolved.lock().get(&key) {
            return Arc::clone(existing);
        }
        Path::new(
            orig.peer.clone(),
            path_id,
            orig.source,
            Arc::clone(attrs),
            label,
            PathFlags { resolve_nexthop: false, resolved: true, infeasible: false },
        )
    }

    fn add_resolved_path(&self, path: &Arc<Path>) {
        self.resolved.lock().insert(path.key(), Arc::clone(path));
        self.route.insert_path(Arc::clone(path));
        tracing::debug!(
            route = %self.route.prefix(),
            nexthop = %path.attrs().nexthop,
            label = path.label,
            path_id = path.path_id,
            "added resolved path"
        );
    }

    fn delete_resolved_path(&self, key: &PathKey, path: &Arc<Path>) {
        self.route.remove_path(key);
        self.resolved.lock().remove(key);
        tracing::debug!(
            route = %self.route.prefix(),
            nexthop = %path.attrs().nexthop,
            label = path.label,
            path_id = path.path_id,
            "deleted resolved path"
        );
    }
}

impl Drop for ResolverPath {
    fn drop(&mut self) {
        let ptr = self as *const ResolverPath as usize;
        self.rnexthop.remove_resolver_path(self.part_id, ptr);
    }
}

/// Path id for a resolved path: the forwarding nexthop address folded to
/// 32 bits (the full v4 address; the low octets for v6).
fn path_id_for(addr: &IpAddr) -> u32 {
    match addr {
        IpAddr::V4(v4) => u32::from(*v4),
        IpAddr::V6(v6) => {
            let octets = v6.octets();
            u32::from_be_bytes([octets[12], octets[13], octets[14], octets[15]])
        }
    }
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
