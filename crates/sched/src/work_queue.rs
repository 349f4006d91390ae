// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-consumer FIFO work queues bound to a task context.

use crate::context::TaskContext;
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

struct QueueState<T> {
    items: VecDeque<T>,
    scheduled: bool,
    disabled: bool,
}

struct QueueInner<T> {
    scheduler: Scheduler,
    ctx: TaskContext,
    cb: Box<dyn Fn(T) + Send + Sync>,
    state: Mutex<QueueState<T>>,
}

/// FIFO queue drained by a single consumer callback on a fixed context,
/// one entry per scheduled step. Producers may enqueue from any thread.
pub struct WorkQueue<T: Send + 'static> {
    inner: Arc<QueueInner<T>>,
}

impl<T: Send + 'static> WorkQueue<T> {
    pub fn new(scheduler: &Scheduler, ctx: TaskContext, cb: Box<dyn Fn(T) + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                scheduler: scheduler.clone(),
                ctx,
                cb,
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    scheduled: false,
                    disabled: false,
                }),
            }),
        }
    }

    /// Push an entry. Callable from any thread.
    pub fn enqueue(&self, item: T) {
        let mut state = self.inner.state.lock();
        state.items.push_back(item);
        Self::maybe_schedule(&self.inner, &mut state);
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    /// Block or unblock draining. Testing only.
    pub fn set_disable(&self, disabled: bool) {
        let mut state = self.inner.state.lock();
        state.disabled = disabled;
        if !disabled {
            Self::maybe_schedule(&self.inner, &mut state);
        }
    }

    /// Drop all queued entries.
    pub fn clear(&self) {
        self.inner.state.lock().items.clear();
    }

    fn maybe_schedule(inner: &Arc<QueueInner<T>>, state: &mut QueueState<T>) {
        if !state.items.is_empty() && !state.scheduled && !state.disabled {
            state.scheduled = true;
            let scheduler = inner.scheduler.clone();
            let ctx = inner.ctx;
            let inner = Arc::clone(inner);
            scheduler.spawn(ctx, move || Self::drain_step(&inner));
        }
    }

    fn drain_step(inner: &Arc<QueueInner<T>>) {
        let item = {
            let mut state = inner.state.lock();
            state.scheduled = false;
            if state.disabled {
                return;
            }
            state.items.pop_front()
        };
        let Some(item) = item else {
            return;
        };
        (inner.cb)(item);
        let mut state = inner.state.lock();
        Self::maybe_schedule(inner, &mut state);
    }
}

#[cfg(test)]
#[path = "work_queue_tests.rs"]
mod tests;
