// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interned path attributes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Weak};

/// Extended communities carried by a path. The forwarding-relevant subsets
/// (security groups, tunnel encapsulation, load balance) are replaced
/// wholesale during path resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExtCommunities {
    pub security_groups: Vec<u64>,
    pub tunnel_encaps: Vec<String>,
    pub load_balance: Option<u64>,
}

/// Immutable path attributes.
///
/// Always interned through [`AttrDb`]; pointer equality of `Arc<Attrs>`
/// implies content equality, which the resolver relies on for its diff key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attrs {
    pub nexthop: IpAddr,
    pub local_pref: u32,
    pub med: u32,
    pub as_path_len: u32,
    pub source_rd: Option<String>,
    pub ext_communities: ExtCommunities,
}

impl Attrs {
    pub fn new(nexthop: IpAddr) -> Self {
        Self {
            nexthop,
            local_pref: 100,
            med: 0,
            as_path_len: 0,
            source_rd: None,
            ext_communities: ExtCommunities::default(),
        }
    }
}

/// Interning database for [`Attrs`].
#[derive(Default)]
pub struct AttrDb {
    interned: Mutex<HashMap<Attrs, Weak<Attrs>>>,
}

impl AttrDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical `Arc` for these attributes.
    pub fn locate(&self, attrs: Attrs) -> Arc<Attrs> {
        let mut interned = self.interned.lock();
        if let Some(existing) = interned.get(&attrs).and_then(Weak::upgrade) {
            return existing;
        }
        // Drop dead entries while we hold the lock anyway.
        interned.retain(|_, weak| weak.strong_count() > 0);
        let arc = Arc::new(attrs.clone());
        interned.insert(attrs, Arc::downgrade(&arc));
        arc
    }

    pub fn replace_nexthop_and_locate(&self, attrs: &Arc<Attrs>, nexthop: IpAddr) -> Arc<Attrs> {
        let mut next = (**attrs).clone();
        next.nexthop = nexthop;
        self.locate(next)
    }

    pub fn replace_source_rd_and_locate(
        &self,
        attrs: &Arc<Attrs>,
        source_rd: Option<String>,
    ) -> Arc<Attrs> {
        let mut next = (**attrs).clone();
        next.source_rd = source_rd;
        self.locate(next)
    }

    pub fn replace_ext_communities_and_locate(
        &self,
        attrs: &Arc<Attrs>,
        ext_communities: ExtCommunities,
    ) -> Arc<Attrs> {
        let mut next = (**attrs).clone();
        next.ext_communities = ext_communities;
        self.locate(next)
    }
}

/// Combine communities for a resolved path: routing communities come from
/// the requesting path's attributes, while the security-group list, tunnel
/// encapsulation list and load balance are taken from the nexthop path.
pub fn merge_forwarding_communities(attrs: &Attrs, nh_attrs: &Attrs) -> ExtCommunities {
    let mut ext = attrs.ext_communities.clone();
    ext.security_groups = nh_attrs.ext_communities.security_groups.clone();
    ext.tunnel_encaps = nh_attrs.ext_communities.tunnel_encaps.clone();
    if nh_attrs.ext_communities.load_balance.is_some() {
        ext.load_balance = nh_attrs.ext_communities.load_balance;
    }
    ext
}

#[cfg(test)]
#[path = "attr_tests.rs"]
mod tests;
