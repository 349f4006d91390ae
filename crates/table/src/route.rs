// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes: prefix, ordered path list, listener state slots.

use crate::path::{full_cmp, Path, PathKey};
use crate::prefix::Prefix;
use crate::table::ListenerId;
use parking_lot::Mutex;
use std::any::Any;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

struct RouteInner {
    paths: Vec<Arc<Path>>,
    states: HashMap<ListenerId, Box<dyn Any + Send + Sync>>,
    deleted: bool,
    match_refs: usize,
}

/// A route in one table partition.
///
/// The path list is kept sorted by [`full_cmp`], so the best path is the
/// first feasible entry and the ECMP group is its maximal prefix of
/// tie-breaking equals. Listener state slots pin the route: a deleted route
/// is physically erased from its partition only once it has no paths, no
/// states and no match-state references.
pub struct Route {
    prefix: Prefix,
    inner: Mutex<RouteInner>,
}

impl Route {
    pub(crate) fn new(prefix: Prefix) -> Arc<Self> {
        Arc::new(Self {
            prefix,
            inner: Mutex::new(RouteInner {
                paths: Vec::new(),
                states: HashMap::new(),
                deleted: false,
                match_refs: 0,
            }),
        })
    }

    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    /// Insert or replace the path with the same key, keeping sort order.
    /// Re-inserting into a deleted route revives it.
    pub fn insert_path(&self, path: Arc<Path>) {
        let mut inner = self.inner.lock();
        let key = path.key();
        inner.paths.retain(|p| p.key() != key);
        let pos = inner
            .paths
            .iter()
            .position(|p| full_cmp(&path, p) == Ordering::Less)
            .unwrap_or(inner.paths.len());
        inner.paths.insert(pos, path);
        inner.deleted = false;
    }

    /// Remove the path with this key; returns whether one was removed.
    pub fn remove_path(&self, key: &PathKey) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.paths.len();
        inner.paths.retain(|p| p.key() != *key);
        inner.paths.len() != before
    }

    /// Re-sort after a path's attributes changed in place.
    pub fn reorder_paths(&self) {
        let mut inner = self.inner.lock();
        inner.paths.sort_by(|a, b| full_cmp(a, b));
    }

    /// First feasible path, if any.
    pub fn best_path(&self) -> Option<Arc<Path>> {
        self.inner.lock().paths.iter().find(|p| p.is_feasible()).cloned()
    }

    pub fn paths(&self) -> Vec<Arc<Path>> {
        self.inner.lock().paths.clone()
    }

    pub fn path_count(&self) -> usize {
        self.inner.lock().paths.len()
    }

    pub fn set_state(&self, id: ListenerId, state: Box<dyn Any + Send + Sync>) {
        self.inner.lock().states.insert(id, state);
    }

    /// Borrow the state slot for `id`.
    pub fn with_state<R>(
        &self,
        id: ListenerId,
        f: impl FnOnce(Option<&(dyn Any + Send + Sync)>) -> R,
    ) -> R {
        let inner = self.inner.lock();
        f(inner.states.get(&id).map(|b| b.as_ref()))
    }

    pub fn clear_state(&self, id: ListenerId) {
        self.inner.lock().states.remove(&id);
    }

    pub fn has_states(&self) -> bool {
        !self.inner.lock().states.is_empty()
    }

    pub fn is_deleted(&self) -> bool {
        self.inner.lock().deleted
    }

    pub(crate) fn set_deleted(&self) {
        self.inner.lock().deleted = true;
    }

    pub(crate) fn add_match_ref(&self) {
        self.inner.lock().match_refs += 1;
    }

    pub(crate) fn release_match_ref(&self) {
        let mut inner = self.inner.lock();
        debug_assert!(inner.match_refs > 0);
        inner.match_refs = inner.match_refs.saturating_sub(1);
    }

    /// Whether the partition may erase this route from its map. States and
    /// match-state references pin a deleted route until listeners let go.
    pub(crate) fn removable(&self) -> bool {
        let inner = self.inner.lock();
        inner.deleted && inner.states.is_empty() && inner.match_refs == 0
    }
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
