// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level assembly: scheduler policy, lifetime manager, attribute
//! database and the table registry.

use crate::attr::AttrDb;
use crate::error::TableError;
use crate::prefix::Family;
use crate::table::Table;
use crate::{CONFIG_TASK, TABLE_TASK};
use cascade_lifetime::{LifetimeManager, SystemClock};
use cascade_sched::{ExclusionPolicy, Scheduler};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Tunables for a [`Network`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Scheduler worker threads.
    pub workers: usize,
    /// Partitions per table.
    pub partitions: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { workers: 4, partitions: 4 }
    }
}

/// The server analog: owns the scheduler, the lifetime manager, the
/// attribute database and all tables.
pub struct Network {
    scheduler: Scheduler,
    lifetime: Arc<LifetimeManager>,
    attr_db: Arc<AttrDb>,
    partitions: usize,
    tables: Mutex<HashMap<String, Arc<Table>>>,
}

impl Network {
    pub fn new(config: NetworkConfig) -> Arc<Self> {
        let scheduler = Scheduler::new(Self::default_policy(), config.workers);
        let lifetime = LifetimeManager::new(&scheduler, Arc::new(SystemClock));
        Arc::new(Self {
            scheduler,
            lifetime,
            attr_db: Arc::new(AttrDb::new()),
            partitions: config.partitions.max(1),
            tables: Mutex::new(HashMap::new()),
        })
    }

    /// The task-exclusion rules the core relies on instead of locks.
    ///
    /// The resolver tags are spelled out here rather than imported; the
    /// resolver crate sits above this one.
    pub fn default_policy() -> ExclusionPolicy {
        let mut policy = ExclusionPolicy::new();
        policy.exclude(CONFIG_TASK, "resolver-nexthop");
        policy.exclude(CONFIG_TASK, "resolver-path");
        policy.exclude(TABLE_TASK, "resolver-nexthop");
        policy.exclude_instance(TABLE_TASK, "resolver-path");
        policy.exclude("resolver-nexthop", "resolver-path");
        policy
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

    pub fn partition_count(&self) -> usize {
        self.partitions
    }

    /// Create a table; its destroy hook removes it from the registry.
    pub fn create_table(
        self: &Arc<Self>,
        name: impl Into<String>,
        family: Family,
    ) -> Result<Arc<Table>, TableError> {
        let name = name.into();
        let mut tables = self.tables.lock();
        if tables.contains_key(&name) {
            return Err(TableError::DuplicateTable(name));
        }
        let table = Table::new(
            name.clone(),
            family,
            self.partitions,
            &self.scheduler,
            &self.lifetime,
            &self.attr_db,
        );
        let network = Arc::downgrade(self);
        let hook_name = name.clone();
        table.set_on_destroy(Box::new(move |_table| {
            if let Some(network) = network.upgrade() {
                network.tables.lock().remove(&hook_name);
            }
        }));
        tables.insert(name, Arc::clone(&table));
        Ok(table)
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.lock().get(name).cloned()
    }

    pub fn table_count(&self) -> usize {
        self.tables.lock().len()
    }

    /// Block until all scheduled work has drained.
    pub fn wait_idle(&self) {
        self.scheduler.wait_idle();
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
#[path = "network_tests.rs"]
mod tests;
