// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Peers, paths and path ordering.

use crate::attr::Attrs;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;

/// A routing peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Peer {
    pub name: String,
}

impl Peer {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { name: name.into() })
    }
}

/// Where a path was learned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSource {
    Bgp,
    Xmpp,
    Static,
}

/// Path disposition flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathFlags {
    /// Resolution has been requested for this path's nexthop.
    pub resolve_nexthop: bool,
    /// Path was synthesized by the resolver.
    pub resolved: bool,
    /// Path must not be used for forwarding.
    pub infeasible: bool,
}

/// A single path of a route.
///
/// Attributes are interior-mutable so a client can update a path in place
/// (on the route's table context) and re-notify; everything else about a
/// path is fixed at creation.
#[derive(Debug)]
pub struct Path {
    pub peer: Option<Arc<Peer>>,
    pub path_id: u32,
    pub source: PathSource,
    attrs: Mutex<Arc<Attrs>>,
    pub label: u32,
    pub flags: PathFlags,
}

impl Path {
    pub fn new(
        peer: Option<Arc<Peer>>,
        path_id: u32,
        source: PathSource,
        attrs: Arc<Attrs>,
        label: u32,
        flags: PathFlags,
    ) -> Arc<Self> {
        Arc::new(Self { peer, path_id, source, attrs: Mutex::new(attrs), label, flags })
    }

    pub fn attrs(&self) -> Arc<Attrs> {
        Arc::clone(&self.attrs.lock())
    }

    /// Swap the attributes in place. Table context of the owning route.
    pub fn set_attrs(&self, attrs: Arc<Attrs>) {
        *self.attrs.lock() = attrs;
    }

    pub fn is_feasible(&self) -> bool {
        !self.flags.infeasible
    }

    /// Stable identity for diffing: (peer, path id, attribute pointer,
    /// label).
    pub fn key(&self) -> PathKey {
        PathKey {
            peer: self.peer.as_ref().map(|p| p.name.clone()),
            path_id: self.path_id,
            attrs: Arc::as_ptr(&self.attrs.lock()) as usize,
            label: self.label,
        }
    }
}

/// The stable diff key of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
    pub peer: Option<String>,
    pub path_id: u32,
    pub attrs: usize,
    pub label: u32,
}

/// Ordering within the ECMP tie-break prefix: higher local-pref first, then
/// shorter AS path, then lower MED. `Equal` means the two paths are in the
/// same ECMP group.
pub fn ecmp_cmp(a: &Path, b: &Path) -> Ordering {
    let (a_attrs, b_attrs) = (a.attrs(), b.attrs());
    b_attrs
        .local_pref
        .cmp(&a_attrs.local_pref)
        .then(a_attrs.as_path_len.cmp(&b_attrs.as_path_len))
        .then(a_attrs.med.cmp(&b_attrs.med))
}

/// Full deterministic order for a route's path list: feasible paths first,
/// ECMP order, then peer and path-id tie-breaks.
pub fn full_cmp(a: &Path, b: &Path) -> Ordering {
    a.flags
        .infeasible
        .cmp(&b.flags.infeasible)
        .then_with(|| ecmp_cmp(a, b))
        .then_with(|| {
            let a_peer = a.peer.as_ref().map(|p| p.name.as_str()).unwrap_or("");
            let b_peer = b.peer.as_ref().map(|p| p.name.as_str()).unwrap_or("");
            a_peer.cmp(b_peer)
        })
        .then(a.path_id.cmp(&b.path_id))
        .then(a.label.cmp(&b.label))
}

#[cfg(test)]
#[path = "path_tests.rs"]
mod tests;
