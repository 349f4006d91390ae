// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ordered-map reconciliation helper.

use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Clone, Copy)]
enum Step {
    RemoveCurrent,
    AddFuture,
    KeepBoth,
    Done,
}

/// Walk two ordered maps in key order, invoking `add` for keys present only
/// in `future` and `remove` for keys present only in `current`. Keys in
/// both are left untouched.
pub(crate) fn map_synchronize<K: Ord, V>(
    current: &BTreeMap<K, V>,
    future: &BTreeMap<K, V>,
    mut add: impl FnMut(&K, &V),
    mut remove: impl FnMut(&K, &V),
) {
    let mut cur = current.iter().peekable();
    let mut fut = future.iter().peekable();
    loop {
        let step = match (cur.peek(), fut.peek()) {
            (Some((ck, _)), Some((fk, _))) => match ck.cmp(fk) {
                Ordering::Less => Step::RemoveCurrent,
                Ordering::Greater => Step::AddFuture,
                Ordering::Equal => Step::KeepBoth,
            },
            (Some(_), None) => Step::RemoveCurrent,
            (None, Some(_)) => Step::AddFuture,
            (None, None) => Step::Done,
        };
        match step {
            Step::RemoveCurrent => {
                if let Some((key, value)) = cur.next() {
                    remove(key, value);
                }
            }
            Step::AddFuture => {
                if let Some((key, value)) = fut.next() {
                    add(key, value);
                }
            }
            Step::KeepBoth => {
                cur.next();
                fut.next();
            }
            Step::Done => break,
        }
    }
}

#[cfg(test)]
#[path = "map_sync_tests.rs"]
mod tests;
