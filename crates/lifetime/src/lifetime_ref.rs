// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed dependency edge from a dependent object to its parent actor.

use crate::actor::{CascadeNode, LifetimeActor, ManagedDelete};
use crate::dependency::DependencyRef;
use std::sync::{Arc, Weak};

/// Edge to a parent actor, owned by the dependent object.
///
/// When the parent cascades, the owner's [`ManagedDelete::managed_delete`]
/// runs, which is expected to call `delete` on the owner's own actor.
/// Dropping the ref severs the edge; resetting before the parent is deleted
/// re-parents the dependent.
pub struct LifetimeRef {
    owner: Weak<dyn ManagedDelete>,
    edge: DependencyRef<CascadeNode, LifetimeActor>,
}

impl LifetimeRef {
    pub fn new(owner: Weak<dyn ManagedDelete>, actor: &Arc<LifetimeActor>) -> Self {
        let mut edge = DependencyRef::new();
        edge.attach(Arc::clone(actor), owner.clone());
        Self { owner, edge }
    }

    /// A ref with no parent yet; attach later with `reset`.
    pub fn unset(owner: Weak<dyn ManagedDelete>) -> Self {
        Self { owner, edge: DependencyRef::new() }
    }

    /// Point at a different parent actor, or detach with `None`.
    pub fn reset(&mut self, actor: Option<&Arc<LifetimeActor>>) {
        match actor {
            Some(actor) => self.edge.attach(Arc::clone(actor), self.owner.clone()),
            None => self.edge.clear(),
        }
    }

    pub fn is_set(&self) -> bool {
        self.edge.is_set()
    }
}
