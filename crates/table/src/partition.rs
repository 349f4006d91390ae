// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One shard of a table: the route map and notification fan-out.

use crate::error::TableError;
use crate::path::{Path, PathKey};
use crate::prefix::Prefix;
use crate::route::Route;
use crate::table::Table;
use crate::{CONFIG_TASK, TABLE_TASK};
use cascade_sched::{assert_context, TaskContext};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

/// One partition of a [`Table`]. Route mutation runs on this partition's
/// `table` context (or a context the scheduler excludes from it).
pub struct TablePartition {
    part_id: usize,
    table: Weak<Table>,
    routes: Mutex<BTreeMap<Prefix, Arc<Route>>>,
}

impl TablePartition {
    pub(crate) fn new(part_id: usize, table: Weak<Table>) -> Arc<Self> {
        Arc::new(Self { part_id, table, routes: Mutex::new(BTreeMap::new()) })
    }

    pub fn part_id(&self) -> usize {
        self.part_id
    }

    /// Find or create the route for `prefix`.
    pub fn locate_route(&self, prefix: Prefix) -> Arc<Route> {
        assert_context(&[TABLE_TASK, CONFIG_TASK]);
        Arc::clone(
            self.routes
                .lock()
                .entry(prefix)
                .or_insert_with(|| Route::new(prefix)),
        )
    }

    pub fn find_route(&self, prefix: Prefix) -> Option<Arc<Route>> {
        self.routes.lock().get(&prefix).cloned()
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().len()
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        self.routes.lock().values().cloned().collect()
    }

    /// Add a path to the route for `prefix` (creating it if needed) and
    /// notify listeners.
    pub fn add_path(&self, prefix: Prefix, path: Arc<Path>) -> Arc<Route> {
        assert_context(&[TABLE_TASK, CONFIG_TASK]);
        let route = self.locate_route(prefix);
        route.insert_path(path);
        self.notify(&route);
        route
    }

    /// Remove a path; deletes the route when the last path goes.
    pub fn remove_path(&self, prefix: Prefix, key: &PathKey) -> Result<(), TableError> {
        assert_context(&[TABLE_TASK, CONFIG_TASK]);
        let route = self
            .find_route(prefix)
            .ok_or_else(|| TableError::NoSuchRoute(prefix.to_string()))?;
        if !route.remove_path(key) {
            return Err(TableError::NoSuchPath(prefix.to_string()));
        }
        if route.path_count() == 0 {
            self.delete_route(&route);
        } else {
            self.notify(&route);
        }
        Ok(())
    }

    /// Schedule listener and condition-match callbacks for `route` on this
    /// partition's `table` context. Callable from any context.
    pub fn notify(&self, route: &Arc<Route>) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let part_id = self.part_id;
        let route = Arc::clone(route);
        let weak_table = self.table.clone();
        table.scheduler().spawn(TaskContext::instanced(TABLE_TASK, part_id), move || {
            let Some(table) = weak_table.upgrade() else {
                return;
            };
            table.run_listeners(part_id, &route);
            table.condition_listener().route_change(part_id, &route);
            table.partition(part_id).maybe_erase(&route);
        });
    }

    /// Mark the route deleted and notify with delete semantics. The map
    /// entry is erased once nothing pins the route.
    pub fn delete_route(&self, route: &Arc<Route>) {
        route.set_deleted();
        self.notify(route);
    }

    /// Erase the route from the map if it is deleted and unpinned. Erasure
    /// is a teardown event for a deleted table.
    pub fn maybe_erase(&self, route: &Arc<Route>) {
        if route.removable() {
            let removed = self.routes.lock().remove(&route.prefix()).is_some();
            if removed {
                if let Some(table) = self.table.upgrade() {
                    table.retry_delete();
                }
            }
        }
    }
}
