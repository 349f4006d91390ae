// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table-level condition listener: predicate subscriptions over route
//! events.
//!
//! A condition is registered on the configuration context and from then on
//! sees every route change in the table on the route's own `table` context.
//! Removal is asynchronous: the listener marks the condition deleted, walks
//! all partitions delivering `deleted = true` so the condition can drop its
//! match state, and only then invokes the requester's done callback (on a
//! `table` context). The condition is finally dropped by `unregister`.

use crate::prefix::Prefix;
use crate::route::Route;
use crate::table::Table;
use crate::{CONFIG_TASK, TABLE_TASK};
use cascade_sched::{assert_context, TaskContext};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// State embedded in every condition implementation.
pub struct ConditionBase {
    deleted: AtomicBool,
}

impl ConditionBase {
    pub fn new() -> Self {
        Self { deleted: AtomicBool::new(false) }
    }

    /// Whether removal has been requested for this condition.
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst)
    }

    pub(crate) fn set_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }
}

impl Default for ConditionBase {
    fn default() -> Self {
        Self::new()
    }
}

/// A predicate over routes, evaluated on the route's `table` context.
pub trait ConditionMatch: Send + Sync {
    fn base(&self) -> &ConditionBase;

    /// Evaluate `route`; `deleted` reports route or condition teardown.
    /// Returns whether the route was interesting.
    fn matches(&self, table: &Arc<Table>, part_id: usize, route: &Arc<Route>, deleted: bool)
        -> bool;

    fn describe(&self) -> String;
}

/// Runs after a condition's match state is fully torn down.
pub type RemoveDoneCb = Box<dyn FnOnce() + Send>;

struct Entry {
    cond: Arc<dyn ConditionMatch>,
    pending_walks: usize,
    remove_done: Option<RemoveDoneCb>,
}

/// Match-state key: condition identity (its base address) plus route.
type MatchStateKey = (usize, usize, Prefix);

#[derive(Default)]
struct ListenerState {
    entries: Vec<Entry>,
    match_states: HashSet<MatchStateKey>,
}

/// Per-table condition subscription registry.
pub struct ConditionListener {
    table: Weak<Table>,
    state: Mutex<ListenerState>,
}

fn cond_id(cond: &Arc<dyn ConditionMatch>) -> usize {
    cond.base() as *const ConditionBase as usize
}

impl ConditionListener {
    pub(crate) fn new(table: Weak<Table>) -> Self {
        Self { table, state: Mutex::new(ListenerState::default()) }
    }

    /// Register a condition and walk existing routes. Config context.
    pub fn add_match_condition(&self, cond: Arc<dyn ConditionMatch>) {
        assert_context(&[CONFIG_TASK]);
        tracing::debug!(condition = %cond.describe(), "condition registered");
        self.state.lock().entries.push(Entry {
            cond: Arc::clone(&cond),
            pending_walks: 0,
            remove_done: None,
        });
        self.walk(&cond, false);
    }

    /// Request removal. Match state is torn down across all partitions and
    /// `done` then runs on a `table` context. Config context.
    pub fn remove_match_condition(&self, cond: Arc<dyn ConditionMatch>, done: RemoveDoneCb) {
        assert_context(&[CONFIG_TASK]);
        tracing::debug!(condition = %cond.describe(), "condition removal requested");
        cond.base().set_deleted();
        {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.iter_mut().find(|e| cond_id(&e.cond) == cond_id(&cond)) {
                entry.remove_done = Some(done);
            }
        }
        self.walk(&cond, true);
    }

    /// Drop a fully torn-down condition. Config context.
    pub fn unregister_match_condition(&self, cond: &Arc<dyn ConditionMatch>) {
        assert_context(&[CONFIG_TASK]);
        assert!(cond.base().is_deleted());
        let id = cond_id(cond);
        // Move the entry out before dropping it: releasing the condition
        // here may be its last reference, and its drop may re-enter actor
        // mutexes that other threads take before the listener lock.
        let removed = {
            let mut state = self.state.lock();
            assert!(
                !state.match_states.iter().any(|(cid, _, _)| *cid == id),
                "unregister with live match state"
            );
            let pos = state.entries.iter().position(|e| cond_id(&e.cond) == id);
            pos.map(|p| state.entries.remove(p))
        };
        drop(removed);
    }

    fn walk(&self, cond: &Arc<dyn ConditionMatch>, removing: bool) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        if removing {
            let mut state = self.state.lock();
            if let Some(entry) = state.entries.iter_mut().find(|e| cond_id(&e.cond) == cond_id(cond)) {
                entry.pending_walks = table.partition_count();
            }
        }
        let scheduler = table.scheduler().clone();
        for part_id in 0..table.partition_count() {
            let table = Arc::clone(&table);
            let cond = Arc::clone(cond);
            let listener_table = self.table.clone();
            scheduler.spawn(TaskContext::instanced(TABLE_TASK, part_id), move || {
                for route in table.partition(part_id).routes() {
                    cond.matches(&table, part_id, &route, removing || route.is_deleted());
                    table.partition(part_id).maybe_erase(&route);
                }
                if removing {
                    if let Some(t) = listener_table.upgrade() {
                        t.condition_listener().finish_remove_walk(&cond);
                    }
                }
            });
        }
    }

    /// Last partition walk done; fire the requester's callback. Table
    /// context.
    fn finish_remove_walk(&self, cond: &Arc<dyn ConditionMatch>) {
        let done = {
            let mut state = self.state.lock();
            match state.entries.iter_mut().find(|e| cond_id(&e.cond) == cond_id(cond)) {
                Some(entry) => {
                    entry.pending_walks -= 1;
                    if entry.pending_walks == 0 {
                        entry.remove_done.take()
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(done) = done {
            done();
        }
    }

    /// Deliver a route change to all live conditions. Table context.
    pub(crate) fn route_change(&self, part_id: usize, route: &Arc<Route>) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let conds: Vec<Arc<dyn ConditionMatch>> = {
            let state = self.state.lock();
            state
                .entries
                .iter()
                .filter(|e| !e.cond.base().is_deleted())
                .map(|e| Arc::clone(&e.cond))
                .collect()
        };
        for cond in conds {
            cond.matches(&table, part_id, route, route.is_deleted());
        }
    }

    /// Record that `cond` holds match state on `route`, pinning it.
    /// Table context.
    pub fn set_match_state(&self, part_id: usize, route: &Arc<Route>, cond: &Arc<dyn ConditionMatch>) {
        assert_context(&[TABLE_TASK]);
        let key = (cond_id(cond), part_id, route.prefix());
        let inserted = self.state.lock().match_states.insert(key);
        if inserted {
            route.add_match_ref();
        }
    }

    pub fn check_match_state(
        &self,
        part_id: usize,
        route: &Arc<Route>,
        cond: &Arc<dyn ConditionMatch>,
    ) -> bool {
        let key = (cond_id(cond), part_id, route.prefix());
        self.state.lock().match_states.contains(&key)
    }

    /// Drop match state, unpinning the route. Table context.
    pub fn remove_match_state(
        &self,
        part_id: usize,
        route: &Arc<Route>,
        cond: &Arc<dyn ConditionMatch>,
    ) {
        assert_context(&[TABLE_TASK]);
        let key = (cond_id(cond), part_id, route.prefix());
        let removed = self.state.lock().match_states.remove(&key);
        if removed {
            route.release_match_ref();
            if let Some(table) = self.table.upgrade() {
                table.partition(part_id).maybe_erase(route);
            }
        }
    }

    pub fn condition_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
