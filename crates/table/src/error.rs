// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table-surface errors.

use thiserror::Error;

/// Errors reported by table and network operations.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("partition {0} out of range")]
    PartitionOutOfRange(usize),
    #[error("table `{0}` already exists")]
    DuplicateTable(String),
    #[error("no such table `{0}`")]
    NoSuchTable(String),
    #[error("no such route {0}")]
    NoSuchRoute(String),
    #[error("no such path on {0}")]
    NoSuchPath(String),
}
