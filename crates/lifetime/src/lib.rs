// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cascade-lifetime: structured teardown of inter-dependent objects.
//!
//! Dependencies between long-lived objects form an acyclic graph with
//! [`LifetimeActor`]s as nodes and [`LifetimeRef`]s as edges. Deleting an
//! actor cascades delete to its dependents ("on delete cascade"), while
//! destruction runs bottom-up once each actor's readiness conditions hold.
//! A [`LifetimeManager`] serializes all cascade, shutdown and destroy work
//! onto one scheduling context; deletion may be requested from any thread.
//!
//! Each managed object embeds a derived actor (conventionally named
//! `deleter`) and one `LifetimeRef` per parent object. Lightweight
//! dependents that do not warrant a graph edge use the actor's reference
//! count instead.

pub mod actor;
pub mod clock;
pub mod dependency;
pub mod lifetime_ref;
pub mod manager;

#[cfg(test)]
pub mod test_support;

pub use actor::{Lifetime, LifetimeActor, ManagedDelete};
pub use clock::{Clock, FakeClock, SystemClock};
pub use dependency::{DependencyList, DependencyProvider, DependencyRef, EdgeId};
pub use lifetime_ref::LifetimeRef;
pub use manager::{DestroyGate, LifetimeManager};
