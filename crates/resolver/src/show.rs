// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only introspection snapshots.

use serde::{Deserialize, Serialize};

/// Aggregate resolver state plus optional per-path and per-nexthop
/// listings. Informational; the shape may change without notice.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowPathResolver {
    pub name: String,
    pub path_count: usize,
    pub modified_path_count: usize,
    pub nexthop_count: usize,
    pub modified_nexthop_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<ShowResolverPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nexthops: Vec<ShowResolverNexthop>,
}

/// One resolver path: where resolved paths land and what they track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowResolverPath {
    pub prefix: String,
    pub nexthop: String,
    pub resolved_path_count: usize,
}

/// One resolver nexthop and whether a host route currently matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowResolverNexthop {
    pub address: String,
    pub table: String,
    pub registered: bool,
    pub has_route: bool,
}
