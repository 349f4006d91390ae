// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;
use std::net::Ipv4Addr;

fn nh(last: u8) -> IpAddr {
    Ipv4Addr::new(10, 0, 0, last).into()
}

#[test]
fn locate_interns_equal_attrs() {
    let db = AttrDb::new();
    let a = db.locate(Attrs::new(nh(1)));
    let b = db.locate(Attrs::new(nh(1)));
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn locate_distinguishes_different_attrs() {
    let db = AttrDb::new();
    let a = db.locate(Attrs::new(nh(1)));
    let b = db.locate(Attrs::new(nh(2)));
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn replace_nexthop_returns_interned_variant() {
    let db = AttrDb::new();
    let base = db.locate(Attrs::new(nh(1)));
    let replaced = db.replace_nexthop_and_locate(&base, nh(9));
    assert_eq!(replaced.nexthop, nh(9));
    assert_eq!(base.nexthop, nh(1));
    let again = db.replace_nexthop_and_locate(&base, nh(9));
    assert!(Arc::ptr_eq(&replaced, &again));
}

#[test]
fn replace_source_rd() {
    let db = AttrDb::new();
    let base = db.locate(Attrs::new(nh(1)));
    let replaced = db.replace_source_rd_and_locate(&base, Some("64512:1".to_string()));
    assert_eq!(replaced.source_rd.as_deref(), Some("64512:1"));
}

#[test]
fn merge_takes_forwarding_sets_from_nexthop() {
    let mut attrs = Attrs::new(nh(1));
    attrs.ext_communities.security_groups = vec![1, 2];
    attrs.ext_communities.load_balance = Some(7);
    let mut nh_attrs = Attrs::new(nh(2));
    nh_attrs.ext_communities.security_groups = vec![8];
    nh_attrs.ext_communities.tunnel_encaps = vec!["gre".to_string()];

    let merged = merge_forwarding_communities(&attrs, &nh_attrs);
    assert_eq!(merged.security_groups, vec![8]);
    assert_eq!(merged.tunnel_encaps, vec!["gre".to_string()]);
    // Nexthop has no load balance; the original value stays.
    assert_eq!(merged.load_balance, Some(7));
}

#[test]
fn merge_replaces_load_balance_when_present() {
    let mut attrs = Attrs::new(nh(1));
    attrs.ext_communities.load_balance = Some(7);
    let mut nh_attrs = Attrs::new(nh(2));
    nh_attrs.ext_communities.load_balance = Some(3);
    assert_eq!(merge_forwarding_communities(&attrs, &nh_attrs).load_balance, Some(3));
}

proptest! {
    /// Interning is stable: any attrs located twice yield one allocation.
    #[test]
    fn locate_is_idempotent(local_pref in 0u32..1000, med in 0u32..1000, label in any::<bool>()) {
        let db = AttrDb::new();
        let mut attrs = Attrs::new(nh(1));
        attrs.local_pref = local_pref;
        attrs.med = med;
        if label {
            attrs.source_rd = Some("64512:9".to_string());
        }
        let a = db.locate(attrs.clone());
        let b = db.locate(attrs);
        prop_assert!(Arc::ptr_eq(&a, &b));
    }
}
