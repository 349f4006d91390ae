// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker pool running jobs under named contexts with declared exclusions.

use crate::context::{ContextGuard, TaskContext};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Which pairs of context tags must never run concurrently.
///
/// Two jobs with the same `(tag, instance)` are always serialized. Beyond
/// that, `exclude` forbids overlap between two tags regardless of instance
/// ids, and `exclude_instance` forbids overlap only when the instance ids
/// match (so shard N of one tag excludes shard N of the other while shards
/// with different ids run in parallel).
#[derive(Debug, Clone, Default)]
pub struct ExclusionPolicy {
    global: HashSet<(&'static str, &'static str)>,
    instanced: HashSet<(&'static str, &'static str)>,
}

impl ExclusionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare two tags mutually exclusive regardless of instance ids.
    pub fn exclude(&mut self, a: &'static str, b: &'static str) -> &mut Self {
        self.global.insert((a, b));
        self.global.insert((b, a));
        self
    }

    /// Declare two tags mutually exclusive when their instance ids match.
    pub fn exclude_instance(&mut self, a: &'static str, b: &'static str) -> &mut Self {
        self.instanced.insert((a, b));
        self.instanced.insert((b, a));
        self
    }

    fn conflicts(&self, a: TaskContext, b: TaskContext) -> bool {
        if a.tag() == b.tag() && a.instance() == b.instance() {
            return true;
        }
        if self.global.contains(&(a.tag(), b.tag())) {
            return true;
        }
        a.instance() == b.instance() && self.instanced.contains(&(a.tag(), b.tag()))
    }
}

struct Job {
    ctx: TaskContext,
    run: Box<dyn FnOnce() + Send + 'static>,
}

#[derive(Default)]
struct State {
    queue: VecDeque<Job>,
    running: Vec<TaskContext>,
    stopped: bool,
    shutdown: bool,
}

struct Shared {
    policy: ExclusionPolicy,
    state: Mutex<State>,
    work_ready: Condvar,
    idle: Condvar,
}

/// Cooperative scheduler. Cheap to clone; all clones share one worker pool.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(policy: ExclusionPolicy, workers: usize) -> Self {
        let shared = Arc::new(Shared {
            policy,
            state: Mutex::new(State::default()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
        });
        for i in 0..workers.max(1) {
            let shared = Arc::clone(&shared);
            let spawned = std::thread::Builder::new()
                .name(format!("cascade-worker-{i}"))
                .spawn(move || worker_loop(&shared));
            if let Err(error) = spawned {
                tracing::warn!(worker = i, %error, "failed to spawn scheduler worker");
            }
        }
        Self { shared }
    }

    /// Queue a job to run under `ctx`. Callable from any thread.
    pub fn spawn(&self, ctx: TaskContext, job: impl FnOnce() + Send + 'static) {
        let mut state = self.shared.state.lock();
        if state.shutdown {
            return;
        }
        state.queue.push_back(Job { ctx, run: Box::new(job) });
        self.shared.work_ready.notify_all();
    }

    /// Stop dispatching new jobs; running jobs finish. Testing only.
    pub fn stop(&self) {
        self.shared.state.lock().stopped = true;
    }

    /// Resume dispatching after `stop`. Testing only.
    pub fn start(&self) {
        self.shared.state.lock().stopped = false;
        self.shared.work_ready.notify_all();
    }

    /// Block until no job is queued or running.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while !(state.queue.is_empty() && state.running.is_empty()) {
            self.shared.idle.wait(&mut state);
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock();
        state.queue.is_empty() && state.running.is_empty()
    }

    /// Stop the workers for good. Queued jobs are dropped.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.shutdown = true;
        state.queue.clear();
        drop(state);
        self.shared.work_ready.notify_all();
        self.shared.idle.notify_all();
    }
}

fn worker_loop(shared: &Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    return;
                }
                if !state.stopped {
                    if let Some(idx) = runnable_index(&shared.policy, &state) {
                        if let Some(job) = state.queue.remove(idx) {
                            state.running.push(job.ctx);
                            break job;
                        }
                    }
                }
                shared.work_ready.wait(&mut state);
            }
        };
        let ctx = job.ctx;
        {
            let _guard = ContextGuard::enter(ctx);
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job.run));
            if outcome.is_err() {
                tracing::error!(context = %ctx, "scheduler job panicked");
            }
        }
        let mut state = shared.state.lock();
        if let Some(pos) = state.running.iter().position(|c| *c == ctx) {
            state.running.remove(pos);
        }
        shared.work_ready.notify_all();
        if state.queue.is_empty() && state.running.is_empty() {
            shared.idle.notify_all();
        }
    }
}

/// First queued job whose context does not conflict with a running one.
fn runnable_index(policy: &ExclusionPolicy, state: &State) -> Option<usize> {
    state
        .queue
        .iter()
        .position(|job| !state.running.iter().any(|r| policy.conflicts(job.ctx, *r)))
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
