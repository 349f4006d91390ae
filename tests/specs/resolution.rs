// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end path-resolution scenarios on a running scheduler.

use crate::prelude::*;
use cascade_resolver::PathResolver;
use cascade_table::{Attrs, Family, Network, Path, PathFlags, PathSource, Peer, Prefix, Route, Table};
use std::net::IpAddr;
use std::sync::Arc;

struct Env {
    net: Arc<Network>,
    table: Arc<Table>,
    resolver: Arc<PathResolver>,
}

fn env() -> Env {
    let net = test_net();
    let table = net.create_table("inet.0", Family::Inet).unwrap();
    let resolver = PathResolver::create(&table);
    Env { net, table, resolver }
}

const PART: usize = 0;

fn host_prefix() -> Prefix {
    Prefix::new(v4(203, 0, 113, 0), 24)
}

fn start_resolution(env: &Env, path: &Arc<Path>, route: &Arc<Route>) {
    let resolver = Arc::clone(&env.resolver);
    let path = Arc::clone(path);
    let route = Arc::clone(route);
    run_on(&env.net, table_ctx(PART), move || {
        resolver.start_path_resolution(PART, &path, &route, None);
    });
}

/// Resolution against an ECMP group installs one resolved path per group
/// member that passes the filters, and grows with the group.
#[test]
fn ecmp_group_membership_bounds_resolved_paths() {
    let env = env();
    let nexthop = v4(10, 0, 0, 9);
    let backing = Prefix::host(nexthop);

    // Three ECMP-equal feasible paths plus one worse path.
    for (peer, last, label) in [("e1", 1, 101), ("e2", 2, 102), ("e3", 3, 103)] {
        let path = backing_path(&env.table, peer, v4(172, 16, 0, last), 200, label);
        install_path(&env.net, &env.table, PART, backing, path);
    }
    let worse = backing_path(&env.table, "w", v4(172, 16, 9, 9), 100, 999);
    install_path(&env.net, &env.table, PART, backing, worse);

    let req = requesting_path(&env.table, "requester", nexthop);
    let host = install_path(&env.net, &env.table, PART, host_prefix(), Arc::clone(&req));
    start_resolution(&env, &req, &host);
    env.net.wait_idle();

    let resolved = resolved_paths(&host);
    assert_eq!(resolved.len(), 3, "one resolved path per ECMP member");
    let mut nexthops: Vec<IpAddr> = resolved.iter().map(|p| p.attrs().nexthop).collect();
    nexthops.sort();
    assert_eq!(nexthops, vec![v4(172, 16, 0, 1), v4(172, 16, 0, 2), v4(172, 16, 0, 3)]);
    for path in &resolved {
        // Routing attributes come from the requester, forwarding from the
        // nexthop path.
        assert_eq!(path.attrs().local_pref, 150);
        assert_eq!(path.peer.as_ref().unwrap().name, "requester");
        assert_eq!(path.attrs().ext_communities.tunnel_encaps, vec!["mpls".to_string()]);
        assert!(path.attrs().source_rd.is_some());
    }

    // A fourth tied member widens the group by exactly one.
    let extra = backing_path(&env.table, "e4", v4(172, 16, 0, 4), 200, 104);
    install_path(&env.net, &env.table, PART, backing, extra);
    env.net.wait_idle();
    assert_eq!(resolved_paths(&host).len(), 4);
}

/// Infeasible members and members without a source RD are filtered out.
#[test]
fn filters_skip_unusable_nexthop_paths() {
    let env = env();
    let nexthop = v4(10, 0, 0, 8);
    let backing = Prefix::host(nexthop);

    let good = backing_path(&env.table, "good", v4(172, 16, 1, 1), 200, 11);
    install_path(&env.net, &env.table, PART, backing, good);

    // Same ECMP tier but no source RD.
    let mut attrs = Attrs::new(v4(172, 16, 1, 2));
    attrs.local_pref = 200;
    let no_rd = Path::new(
        Some(Peer::new("no-rd")),
        1,
        PathSource::Bgp,
        env.table.attr_db().locate(attrs),
        12,
        PathFlags::default(),
    );
    install_path(&env.net, &env.table, PART, backing, no_rd);

    // Duplicate forwarding info of `good`.
    let dup = backing_path(&env.table, "dup", v4(172, 16, 1, 1), 200, 11);
    install_path(&env.net, &env.table, PART, backing, dup);

    let req = requesting_path(&env.table, "requester", nexthop);
    let host = install_path(&env.net, &env.table, PART, host_prefix(), Arc::clone(&req));
    start_resolution(&env, &req, &host);
    env.net.wait_idle();

    let resolved = resolved_paths(&host);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].attrs().nexthop, v4(172, 16, 1, 1));
}

/// Moving a path to a new nexthop tears the old tracker down
/// asynchronously and brings the new one up; the resolved set follows.
#[test]
fn nexthop_change_swaps_trackers() {
    let env = env();
    let first = v4(10, 0, 0, 1);
    let second = v4(10, 0, 0, 2);

    let old_backing = backing_path(&env.table, "n1", v4(172, 16, 0, 1), 200, 11);
    install_path(&env.net, &env.table, PART, Prefix::host(first), old_backing);

    let req = requesting_path(&env.table, "requester", first);
    let host = install_path(&env.net, &env.table, PART, host_prefix(), Arc::clone(&req));
    start_resolution(&env, &req, &host);
    env.net.wait_idle();

    let resolved = resolved_paths(&host);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].attrs().nexthop, v4(172, 16, 0, 1));
    assert_eq!(env.resolver.nexthop_map_len(), 1);

    // Re-point the requesting path at the second address and update.
    let resolver = Arc::clone(&env.resolver);
    let req2 = Arc::clone(&req);
    let host2 = Arc::clone(&host);
    let table = Arc::clone(&env.table);
    run_on(&env.net, table_ctx(PART), move || {
        let attr_db = table.attr_db();
        let mut attrs = (*req2.attrs()).clone();
        attrs.nexthop = second;
        req2.set_attrs(attr_db.locate(attrs));
        resolver.update_path_resolution(PART, &req2, &host2, None);
    });
    let new_backing = backing_path(&env.table, "n2", v4(172, 16, 0, 2), 200, 22);
    install_path(&env.net, &env.table, PART, Prefix::host(second), new_backing);
    env.net.wait_idle();

    let resolved = resolved_paths(&host);
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].attrs().nexthop, v4(172, 16, 0, 2));

    // The old tracker is fully drained, not parked on the delete list.
    assert_eq!(env.resolver.nexthop_map_len(), 1);
    assert_eq!(env.resolver.delete_list_len(), 0);
    assert_eq!(env.resolver.reg_unreg_list_len(), 0);
    let show = env.resolver.fill_show_info(false);
    assert_eq!(show.nexthops.len(), 1);
    assert_eq!(show.nexthops[0].address, "10.0.0.2");
}

/// Start-then-stop inside one table callback: the nexthop is created and
/// destroyed on the next config pass without ever touching the condition
/// listener.
#[test]
fn register_then_immediate_stop_never_registers() {
    let env = env();
    env.resolver.disable_reg_unreg_processing();

    let nexthop = v4(10, 0, 0, 5);
    let req = requesting_path(&env.table, "requester", nexthop);
    let host = install_path(&env.net, &env.table, PART, host_prefix(), Arc::clone(&req));

    let resolver = Arc::clone(&env.resolver);
    let req2 = Arc::clone(&req);
    let host2 = Arc::clone(&host);
    run_on(&env.net, table_ctx(PART), move || {
        resolver.start_path_resolution(PART, &req2, &host2, None);
        resolver.stop_path_resolution(PART, &req2);
    });
    env.net.wait_idle();

    // The nexthop exists, unregistered, with its reg/unreg pass pending.
    assert_eq!(env.resolver.nexthop_map_len(), 1);
    assert_eq!(env.resolver.reg_unreg_list_len(), 1);
    let show = env.resolver.fill_show_info(false);
    assert!(!show.nexthops[0].registered);

    env.resolver.enable_reg_unreg_processing();
    env.net.wait_idle();

    assert_eq!(env.resolver.nexthop_map_len(), 0);
    assert_eq!(env.resolver.delete_list_len(), 0);
    assert!(env.table.condition_listener().is_empty());
    assert!(resolved_paths(&host).is_empty());
}

/// Deleting the host table cascades to the resolver; once clients stop
/// resolution and routes drain, the resolver is destroyed before the
/// table.
#[test]
fn table_delete_cascades_through_resolver() {
    let env = env();
    let nexthop = v4(10, 0, 0, 7);
    let backing = backing_path(&env.table, "n1", v4(172, 16, 0, 7), 200, 77);
    install_path(&env.net, &env.table, PART, Prefix::host(nexthop), Arc::clone(&backing));

    let req = requesting_path(&env.table, "requester", nexthop);
    let host = install_path(&env.net, &env.table, PART, host_prefix(), Arc::clone(&req));
    start_resolution(&env, &req, &host);
    env.net.wait_idle();
    assert_eq!(resolved_paths(&host).len(), 1);

    let Env { net, table, resolver } = env;
    let weak_resolver = Arc::downgrade(&resolver);
    drop(resolver);

    table.delete();
    net.wait_idle();
    assert!(table.is_deleted());
    assert!(weak_resolver.upgrade().is_some(), "resolver drains before destruction");

    // Client-driven teardown: stop resolution, drain routes.
    {
        let weak = weak_resolver.clone();
        let req = Arc::clone(&req);
        run_on(&net, table_ctx(PART), move || {
            if let Some(resolver) = weak.upgrade() {
                resolver.stop_path_resolution(PART, &req);
            }
        });
    }
    uninstall_path(&net, &table, PART, host_prefix(), &req);
    uninstall_path(&net, &table, PART, Prefix::host(nexthop), &backing);
    net.wait_idle();

    assert!(weak_resolver.upgrade().is_none(), "resolver destroyed");
    assert_eq!(net.table_count(), 0, "table destroyed after its resolver");
    assert_eq!(table.route_count(), 0);
}
