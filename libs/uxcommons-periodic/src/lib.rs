// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! One dedicated OS thread per recurring task: [`PeriodicRunner`].
//!
//! Unlike [`uxcommons_task_runner::TaskRunner`] or
//! [`uxcommons_planner::Planner`], this component does not pool
//! identical workers over a shared job type — each registered task gets
//! its own thread and its own `stop`/`enforce_start` signal, so it
//! implements the ActiveObject lifecycle directly rather than going
//! through `ActiveObjectCommonImpl`, exactly as the original library's
//! `PeriodicRunner` does alongside (not through) its common active
//! object base.

mod error;
mod task;

pub use error::Error;
pub use task::PeriodicTask;

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uxcommons_active_object::{ActiveObject, ActiveObjectCallback, TracingCallback};
use uxcommons_active_object::ActiveObjectState as State;

struct ControlState {
    period: Duration,
    quit: bool,
    start: bool,
}

struct TaskControl {
    state: Mutex<ControlState>,
    cond: Condvar,
}

impl TaskControl {
    fn new(period: Duration) -> Self {
        Self {
            state: Mutex::new(ControlState {
                period,
                quit: false,
                start: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn wait_period(&self, elapsed: Duration) -> Duration {
        let state = self.state.lock().unwrap();
        state.period.saturating_sub(elapsed)
    }

    fn enforce_start(&self) {
        let mut state = self.state.lock().unwrap();
        state.start = true;
        self.cond.notify_all();
    }

    fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.quit = true;
        self.cond.notify_all();
    }
}

struct Entry {
    task: Arc<dyn PeriodicTask>,
    control: Arc<TaskControl>,
}

impl Entry {
    fn run(&self, callback: &Arc<dyn ActiveObjectCallback>) {
        let mut elapsed = Duration::ZERO;
        loop {
            let mut forced = false;
            let mut wait = self.control.wait_period(elapsed);
            loop {
                let tick_start = Instant::now();
                let state = self.control.state.lock().unwrap();
                let (mut state, _result) = self.control.cond.wait_timeout(state, wait).unwrap();
                if state.quit {
                    state.quit = false;
                    return;
                }
                if state.start {
                    forced = true;
                    state.start = false;
                    break;
                }
                drop(state);
                elapsed += tick_start.elapsed();
                wait = self.control.wait_period(elapsed);
                if wait == Duration::ZERO {
                    break;
                }
            }

            let run_start = Instant::now();
            self.run_once(callback, forced);
            elapsed = run_start.elapsed();
        }
    }

    fn run_once(&self, callback: &Arc<dyn ActiveObjectCallback>, forced: bool) {
        let task = self.task.clone();
        if let Err(payload) =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| task.run(forced)))
        {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "periodic task panicked".to_string());
            callback.warning(&message);
        }
    }
}

/// Runs a set of recurring tasks, one OS thread each.
pub struct PeriodicRunner {
    callback: Arc<dyn ActiveObjectCallback>,
    state: Mutex<State>,
    termination_mutex: Mutex<()>,
    entries: Mutex<Vec<Arc<Entry>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PeriodicRunner {
    #[must_use]
    pub fn new(callback: Option<Arc<dyn ActiveObjectCallback>>) -> Self {
        Self {
            callback: callback.unwrap_or_else(|| Arc::new(TracingCallback)),
            state: Mutex::new(State::NotActive),
            termination_mutex: Mutex::new(()),
            entries: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Registers `task` to run every `period`. If `run` is set, the task
    /// is invoked once immediately (synchronously, before the
    /// registration returns); `silent` controls whether that immediate
    /// invocation goes through the panic-catching `run_once` path or is
    /// called directly.
    ///
    /// # Errors
    /// Returns [`Error::AlreadyActive`] if called after `activate()`.
    pub fn add_task(
        &self,
        task: Arc<dyn PeriodicTask>,
        period: Duration,
        silent: bool,
        run: bool,
    ) -> Result<(), Error> {
        if self.active() {
            return Err(Error::AlreadyActive);
        }
        let entry = Arc::new(Entry {
            task: task.clone(),
            control: Arc::new(TaskControl::new(period)),
        });
        if run {
            if silent {
                entry.run_once(&self.callback, false);
            } else {
                task.run(false);
            }
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    fn signal_all(&self, f: impl Fn(&TaskControl)) {
        for entry in self.entries.lock().unwrap().iter() {
            f(&entry.control);
        }
    }

    pub fn enforce_start_all(&self) {
        debug!("enforcing immediate run of all periodic tasks");
        self.signal_all(TaskControl::enforce_start);
    }
}

impl ActiveObject for PeriodicRunner {
    fn activate(&self) -> Result<(), uxcommons_active_object::Error> {
        let mut state = self.state.lock().unwrap();
        if *state != State::NotActive {
            return Err(uxcommons_active_object::Error::AlreadyActive);
        }
        let entries = self.entries.lock().unwrap().clone();
        let mut handles = self.handles.lock().unwrap();
        for entry in entries {
            let callback = self.callback.clone();
            handles.push(std::thread::spawn(move || entry.run(&callback)));
        }
        *state = State::Active;
        Ok(())
    }

    fn deactivate(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == State::Active {
            *state = State::Deactivating;
            self.signal_all(TaskControl::stop);
        }
    }

    fn wait(&self) {
        let _guard = self.termination_mutex.lock().unwrap();
        {
            let state = self.state.lock().unwrap();
            if *state == State::NotActive {
                return;
            }
        }
        let handles = std::mem::take(&mut *self.handles.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
        let mut state = self.state.lock().unwrap();
        if *state == State::Deactivating {
            *state = State::NotActive;
        }
    }

    fn active(&self) -> bool {
        *self.state.lock().unwrap() == State::Active
    }
}

impl Drop for PeriodicRunner {
    fn drop(&mut self) {
        if *self.state.lock().unwrap() != State::NotActive {
            self.callback
                .warning("PeriodicRunner dropped without wait(); forcing termination");
            self.signal_all(TaskControl::stop);
            let handles = std::mem::take(&mut *self.handles.lock().unwrap());
            for handle in handles {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask(Arc<AtomicUsize>);
    impl PeriodicTask for CountingTask {
        fn run(&self, _forced: bool) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn runs_periodically() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = PeriodicRunner::new(None);
        runner
            .add_task(
                Arc::new(CountingTask(counter.clone())),
                Duration::from_millis(20),
                false,
                false,
            )
            .unwrap();
        runner.activate().unwrap();
        std::thread::sleep(Duration::from_millis(110));
        runner.deactivate();
        runner.wait();
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn enforce_start_runs_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runner = PeriodicRunner::new(None);
        runner
            .add_task(
                Arc::new(CountingTask(counter.clone())),
                Duration::from_secs(3600),
                false,
                false,
            )
            .unwrap();
        runner.activate().unwrap();
        runner.enforce_start_all();
        std::thread::sleep(Duration::from_millis(50));
        runner.deactivate();
        runner.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
