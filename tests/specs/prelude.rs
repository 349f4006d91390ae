// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for scenario specs.

#![allow(dead_code)]

use cascade_lifetime::{Lifetime, LifetimeActor, LifetimeManager, LifetimeRef, ManagedDelete};
use cascade_sched::TaskContext;
use cascade_table::{
    Attrs, Network, NetworkConfig, Path, PathFlags, PathSource, Peer, Prefix, Route, Table,
    TABLE_TASK,
};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Weak};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Opt-in log output for spec debugging: `RUST_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn test_net() -> Arc<Network> {
    init_tracing();
    Network::new(NetworkConfig { workers: 4, partitions: 2 })
}

/// Run `f` on the given context and hand its result back synchronously.
pub fn run_on<T: Send + 'static>(
    net: &Network,
    ctx: TaskContext,
    f: impl FnOnce() -> T + Send + 'static,
) -> T {
    let (tx, rx) = std::sync::mpsc::channel();
    net.scheduler().spawn(ctx, move || {
        let _ = tx.send(f());
    });
    rx.recv().expect("scheduler job completed")
}

pub fn table_ctx(part_id: usize) -> TaskContext {
    TaskContext::instanced(TABLE_TASK, part_id)
}

pub fn v4(a: u8, b: u8, c: u8, d: u8) -> IpAddr {
    Ipv4Addr::new(a, b, c, d).into()
}

/// A managed object for lifetime scenarios: embeds an actor, optionally a
/// parent edge, and holds itself alive until `destroy` releases it.
pub struct Node {
    pub name: &'static str,
    log: EventLog,
    holder: Arc<Mutex<Option<Arc<Node>>>>,
    pub actor: Arc<LifetimeActor>,
    pub parent_ref: Mutex<Option<LifetimeRef>>,
}

impl Node {
    pub fn create(
        manager: &Arc<LifetimeManager>,
        log: &EventLog,
        name: &'static str,
        parent: Option<&Arc<LifetimeActor>>,
    ) -> Arc<Node> {
        let holder = Arc::new(Mutex::new(None));
        let node = Arc::new_cyclic(|weak: &Weak<Node>| Node {
            name,
            log: Arc::clone(log),
            holder: Arc::clone(&holder),
            actor: LifetimeActor::new(Arc::clone(manager), weak.clone() as Weak<dyn Lifetime>),
            parent_ref: Mutex::new(
                parent.map(|p| LifetimeRef::new(weak.clone() as Weak<dyn ManagedDelete>, p)),
            ),
        });
        *holder.lock() = Some(Arc::clone(&node));
        node
    }
}

impl Lifetime for Node {
    fn may_delete(&self) -> bool {
        true
    }

    fn shutdown(&self) {
        self.log.lock().push(format!("shutdown:{}", self.name));
    }

    fn delete_complete(&self) {
        self.log.lock().push(format!("complete:{}", self.name));
    }

    fn destroy(&self) {
        self.parent_ref.lock().take();
        self.holder.lock().take();
        self.log.lock().push(format!("destroy:{}", self.name));
    }
}

impl ManagedDelete for Node {
    fn managed_delete(&self) {
        self.actor.delete();
    }
}

pub fn destroyed(log: &EventLog, name: &str) -> bool {
    log.lock().iter().any(|e| e == &format!("destroy:{name}"))
}

pub fn event_pos(log: &EventLog, event: &str) -> Option<usize> {
    log.lock().iter().position(|e| e == event)
}

/// Build a feasible backing-table path carrying forwarding attributes.
pub fn backing_path(
    table: &Table,
    peer: &str,
    forwarding_nexthop: IpAddr,
    local_pref: u32,
    label: u32,
) -> Arc<Path> {
    let mut attrs = Attrs::new(forwarding_nexthop);
    attrs.local_pref = local_pref;
    attrs.source_rd = Some(format!("64512:{label}"));
    attrs.ext_communities.security_groups = vec![8000 + u64::from(label)];
    attrs.ext_communities.tunnel_encaps = vec!["mpls".to_string()];
    Path::new(
        Some(Peer::new(peer)),
        1,
        PathSource::Bgp,
        table.attr_db().locate(attrs),
        label,
        PathFlags::default(),
    )
}

/// Build a requesting path flagged for nexthop resolution.
pub fn requesting_path(table: &Table, peer: &str, nexthop: IpAddr) -> Arc<Path> {
    let mut attrs = Attrs::new(nexthop);
    attrs.local_pref = 150;
    Path::new(
        Some(Peer::new(peer)),
        1,
        PathSource::Bgp,
        table.attr_db().locate(attrs),
        0,
        PathFlags { resolve_nexthop: true, ..PathFlags::default() },
    )
}

/// Install `path` on the host route for `prefix` in `part_id`.
pub fn install_path(
    net: &Network,
    table: &Arc<Table>,
    part_id: usize,
    prefix: Prefix,
    path: Arc<Path>,
) -> Arc<Route> {
    let table = Arc::clone(table);
    run_on(net, table_ctx(part_id), move || {
        table.partition(part_id).add_path(prefix, path)
    })
}

/// Remove `path` from the route for `prefix` in `part_id`.
pub fn uninstall_path(
    net: &Network,
    table: &Arc<Table>,
    part_id: usize,
    prefix: Prefix,
    path: &Arc<Path>,
) {
    let table = Arc::clone(table);
    let key = path.key();
    run_on(net, table_ctx(part_id), move || {
        let _ = table.partition(part_id).remove_path(prefix, &key);
    });
}

/// Resolved (synthesized) paths currently installed on `route`.
pub fn resolved_paths(route: &Arc<Route>) -> Vec<Arc<Path>> {
    route.paths().into_iter().filter(|p| p.flags.resolved).collect()
}
