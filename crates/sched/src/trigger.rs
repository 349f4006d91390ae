// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Edge-triggered, coalescing task triggers.

use crate::context::TaskContext;
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::sync::Arc;

/// Callback run when a trigger fires. Returns `true` when the work is done;
/// `false` re-arms the trigger for another run.
pub type TriggerFn = dyn Fn() -> bool + Send + Sync;

#[derive(Default)]
struct Flags {
    pending: bool,
    scheduled: bool,
    disabled: bool,
    deferred: bool,
}

struct Inner {
    scheduler: Scheduler,
    ctx: TaskContext,
    cb: Box<TriggerFn>,
    flags: Mutex<Flags>,
}

/// Coalesced "process this list soon" flag bound to a task context.
///
/// Any number of `set` calls between runs produce exactly one run.
pub struct TaskTrigger {
    inner: Arc<Inner>,
}

impl TaskTrigger {
    pub fn new(scheduler: &Scheduler, ctx: TaskContext, cb: Box<TriggerFn>) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheduler: scheduler.clone(),
                ctx,
                cb,
                flags: Mutex::new(Flags::default()),
            }),
        }
    }

    /// Mark the trigger; a run is scheduled unless one is already queued.
    /// Callable from any thread.
    pub fn set(&self) {
        let mut flags = self.inner.flags.lock();
        flags.pending = true;
        Self::maybe_schedule(&self.inner, &mut flags);
    }

    /// Whether a run is pending.
    pub fn is_set(&self) -> bool {
        self.inner.flags.lock().pending
    }

    /// Suspend runs while keeping the edge. Testing only.
    pub fn set_deferred(&self) {
        self.inner.flags.lock().deferred = true;
    }

    /// Resume runs after `set_deferred`. Testing only.
    pub fn clear_deferred(&self) {
        let mut flags = self.inner.flags.lock();
        flags.deferred = false;
        Self::maybe_schedule(&self.inner, &mut flags);
    }

    /// Disable the trigger; `set` calls accumulate. Testing only.
    pub fn set_disable(&self) {
        self.inner.flags.lock().disabled = true;
    }

    /// Re-enable the trigger, running it if set while disabled. Testing only.
    pub fn set_enable(&self) {
        let mut flags = self.inner.flags.lock();
        flags.disabled = false;
        Self::maybe_schedule(&self.inner, &mut flags);
    }

    fn maybe_schedule(inner: &Arc<Inner>, flags: &mut Flags) {
        if flags.pending && !flags.scheduled && !flags.disabled && !flags.deferred {
            flags.scheduled = true;
            let scheduler = inner.scheduler.clone();
            let ctx = inner.ctx;
            let inner = Arc::clone(inner);
            scheduler.spawn(ctx, move || Self::run(&inner));
        }
    }

    fn run(inner: &Arc<Inner>) {
        {
            let mut flags = inner.flags.lock();
            flags.scheduled = false;
            if flags.disabled || flags.deferred || !flags.pending {
                return;
            }
            flags.pending = false;
        }
        let done = (inner.cb)();
        let mut flags = inner.flags.lock();
        if !done {
            flags.pending = true;
        }
        Self::maybe_schedule(inner, &mut flags);
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
