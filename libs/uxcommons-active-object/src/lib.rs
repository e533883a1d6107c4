// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The ActiveObject lifecycle protocol: `activate` / `deactivate` /
//! `wait` / `active`, plus the worker-pool engine
//! ([`ActiveObjectCommonImpl`]) that every long-lived subsystem in this
//! workspace (`TaskRunner`, `Planner`, `PeriodicRunner`, the reactor's
//! `EventThreadPool`) is built on top of.

mod error;
mod state;
mod thread_runner;

pub use error::Error;
pub use state::ActiveObjectState;
pub use thread_runner::ThreadRunner;

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// The four operations every long-lived runtime object exposes.
pub trait ActiveObject {
    /// `NotActive -> Active`. Fails with [`Error::AlreadyActive`] unless
    /// the object is currently `NotActive`.
    fn activate(&self) -> Result<(), Error>;

    /// `Active -> Deactivating`. A no-op outside the `Active` state.
    /// Never blocks on worker completion.
    fn deactivate(&self);

    /// Blocks until all workers have stopped, then transitions
    /// `Deactivating -> NotActive`. Safe to call concurrently; every
    /// waiter returns once the object is quiescent.
    fn wait(&self);

    /// Non-blocking snapshot of the current state.
    fn active(&self) -> bool;
}

/// Hook an [`ActiveObject`] uses to report worker failures that are
/// caught rather than propagated (panics inside `work()`, errors from
/// one-shot tasks). Every method has a no-op default so implementors
/// only override what they care about.
pub trait ActiveObjectCallback: Send + Sync {
    fn info(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn critical(&self, _message: &str) {}
}

/// An [`ActiveObjectCallback`] that only emits `tracing` events, used
/// as the default when a caller does not supply one.
#[derive(Debug, Default)]
pub struct TracingCallback;

impl ActiveObjectCallback for TracingCallback {
    fn info(&self, message: &str) {
        tracing::info!(message);
    }
    fn warning(&self, message: &str) {
        tracing::warn!(message);
    }
    fn error(&self, message: &str) {
        tracing::error!(message);
    }
    fn critical(&self, message: &str) {
        tracing::error!(critical = true, message);
    }
}

/// A job run by every worker in an [`ActiveObjectCommonImpl`] pool.
///
/// `work` is invoked once per worker thread and is expected to loop
/// internally until it observes termination. `terminate` is called
/// exactly once, from `deactivate`, and must cause every blocked
/// `work()` call to return in bounded time.
pub trait SingleJob: Send + Sync {
    fn work(&self);
    fn terminate(&self);
}

/// The reusable worker-pool engine behind [`ActiveObject`].
///
/// Generalizes the original library's `ActiveObjectCommonImpl`: owns a
/// fixed-size pool of `threads_number` workers, each running `job`'s
/// `work()` method, coordinated through a `work_mutex` (guarding the
/// lifecycle state) and a `termination_mutex` (serializing concurrent
/// `wait()` callers).
pub struct ActiveObjectCommonImpl<J: SingleJob + 'static> {
    job: Arc<J>,
    callback: Arc<dyn ActiveObjectCallback>,
    threads_number: usize,
    state: Mutex<ActiveObjectState>,
    termination_mutex: Mutex<()>,
    runner: Mutex<Option<ThreadRunner>>,
}

impl<J: SingleJob + 'static> ActiveObjectCommonImpl<J> {
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `threads_number == 0`.
    pub fn new(
        job: Arc<J>,
        threads_number: usize,
        callback: Option<Arc<dyn ActiveObjectCallback>>,
    ) -> Result<Self, Error> {
        if threads_number == 0 {
            return Err(Error::InvalidArgument("threads_number must be > 0"));
        }
        Ok(Self {
            job,
            callback: callback.unwrap_or_else(|| Arc::new(TracingCallback)),
            threads_number,
            state: Mutex::new(ActiveObjectState::NotActive),
            termination_mutex: Mutex::new(()),
            runner: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn job(&self) -> &Arc<J> {
        &self.job
    }

    #[must_use]
    pub fn callback(&self) -> &Arc<dyn ActiveObjectCallback> {
        &self.callback
    }

    /// Starts `start_threads` workers (clamped to `threads_number`).
    pub fn activate_with(&self, start_threads: usize) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        if *state != ActiveObjectState::NotActive {
            return Err(Error::AlreadyActive);
        }
        let start_threads = start_threads.min(self.threads_number).max(1);
        debug!(start_threads, "activating active object");
        let mut runner = ThreadRunner::new(self.threads_number);
        for _ in 0..start_threads {
            let job = self.job.clone();
            runner.spawn(move || job.work());
        }
        *self.runner.lock().unwrap() = Some(runner);
        *state = ActiveObjectState::Active;
        Ok(())
    }

    /// Spawns one additional worker if the pool has not reached
    /// `threads_number`. Cooperative elasticity, not preemption.
    pub fn add_thread(&self) {
        self.add_thread_if(|| true);
    }

    /// Like [`Self::add_thread`], but only grows the pool when
    /// `should_grow` (evaluated under the lifecycle lock, so it can
    /// safely inspect job-internal counters) returns `true`. Lets
    /// [`SingleJob`] implementations such as the task runner avoid
    /// growing on every single enqueue.
    pub fn add_thread_if(&self, should_grow: impl FnOnce() -> bool) {
        let state = self.state.lock().unwrap();
        if *state != ActiveObjectState::Active {
            return;
        }
        if let Some(runner) = self.runner.lock().unwrap().as_mut() {
            if runner.running() < self.threads_number && should_grow() {
                let job = self.job.clone();
                runner.spawn(move || job.work());
            }
        }
    }

    pub fn deactivate(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ActiveObjectState::Active {
            *state = ActiveObjectState::Deactivating;
            self.job.terminate();
        }
    }

    pub fn wait(&self) {
        let _termination_guard = self.termination_mutex.lock().unwrap();
        {
            let state = self.state.lock().unwrap();
            if *state == ActiveObjectState::NotActive {
                return;
            }
        }
        if let Some(runner) = self.runner.lock().unwrap().take() {
            runner.join_all();
        }
        let mut state = self.state.lock().unwrap();
        if *state == ActiveObjectState::Deactivating {
            *state = ActiveObjectState::NotActive;
        }
    }

    #[must_use]
    pub fn active(&self) -> bool {
        *self.state.lock().unwrap() == ActiveObjectState::Active
    }

    /// Runs `f`, catching any panic and reporting it through the
    /// callback instead of letting it unwind past the worker thread.
    pub fn guarded(&self, f: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
            let message = panic_message(&payload);
            warn!(message, "worker panicked, recovered");
            self.callback.error(&message);
        }
    }
}

impl<J: SingleJob + 'static> Drop for ActiveObjectCommonImpl<J> {
    fn drop(&mut self) {
        let still_active = *self.state.lock().unwrap() != ActiveObjectState::NotActive;
        if still_active {
            self.callback
                .warning("active object dropped without wait(); forcing termination");
            self.job.terminate();
            if let Some(runner) = self.runner.lock().unwrap().take() {
                runner.join_all();
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingJob {
        terminate_flag: AtomicBool,
        iterations: AtomicUsize,
    }

    impl SingleJob for CountingJob {
        fn work(&self) {
            while !self.terminate_flag.load(Ordering::Acquire) {
                self.iterations.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        fn terminate(&self) {
            self.terminate_flag.store(true, Ordering::Release);
        }
    }

    #[test]
    fn lifecycle_round_trip() {
        let job = Arc::new(CountingJob {
            terminate_flag: AtomicBool::new(false),
            iterations: AtomicUsize::new(0),
        });
        let engine = ActiveObjectCommonImpl::new(job.clone(), 2, None).unwrap();
        assert!(!engine.active());
        engine.activate_with(2).unwrap();
        assert!(engine.active());
        std::thread::sleep(Duration::from_millis(20));
        engine.deactivate();
        engine.wait();
        assert!(!engine.active());
        assert!(job.iterations.load(Ordering::Relaxed) > 0);

        // a second activate/deactivate/wait cycle must succeed
        job.terminate_flag.store(false, Ordering::Release);
        engine.activate_with(2).unwrap();
        engine.deactivate();
        engine.wait();
    }

    #[test]
    fn double_activate_fails() {
        let job = Arc::new(CountingJob {
            terminate_flag: AtomicBool::new(false),
            iterations: AtomicUsize::new(0),
        });
        let engine = ActiveObjectCommonImpl::new(job, 1, None).unwrap();
        engine.activate_with(1).unwrap();
        assert!(matches!(engine.activate_with(1), Err(Error::AlreadyActive)));
        engine.deactivate();
        engine.wait();
    }

    #[test]
    fn zero_threads_rejected() {
        let job = Arc::new(CountingJob {
            terminate_flag: AtomicBool::new(false),
            iterations: AtomicUsize::new(0),
        });
        assert!(ActiveObjectCommonImpl::new(job, 0, None).is_err());
    }
}
