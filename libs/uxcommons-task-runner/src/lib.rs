// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A bounded FIFO task queue backed by a cooperatively-growing worker
//! pool: [`TaskRunner`].

mod error;
mod job;

pub use error::Error;

use std::sync::Arc;
use std::time::Duration;
use uxcommons_active_object::{
    ActiveObject, ActiveObjectCallback, ActiveObjectCommonImpl, Error as AoError,
};

pub use job::Task;
use job::TaskRunnerJob;

/// A worker pool fed by a single shared, optionally-bounded FIFO queue.
///
/// Producers call [`TaskRunner::enqueue`]; the pool starts with
/// `start_threads` workers and grows (up to `threads_number`) only when
/// the queue backs up and no worker is idle — cooperative elasticity,
/// never preemption.
pub struct TaskRunner {
    engine: Arc<ActiveObjectCommonImpl<TaskRunnerJob>>,
    start_threads: usize,
}

impl TaskRunner {
    /// `max_pending == 0` means the queue is unbounded: `enqueue` never
    /// blocks and never returns [`Error::Overflow`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `threads_number == 0` or
    /// `start_threads > threads_number`.
    pub fn new(
        threads_number: usize,
        start_threads: usize,
        max_pending: usize,
        callback: Option<Arc<dyn ActiveObjectCallback>>,
    ) -> Result<Self, Error> {
        if threads_number == 0 {
            return Err(Error::InvalidArgument("threads_number must be > 0"));
        }
        if start_threads > threads_number {
            return Err(Error::InvalidArgument(
                "start_threads must be <= threads_number",
            ));
        }
        let job = Arc::new(TaskRunnerJob::new(threads_number, max_pending));
        let engine = ActiveObjectCommonImpl::new(job, threads_number, callback)
            .map_err(Error::from_lifecycle)?;
        Ok(Self {
            engine: Arc::new(engine),
            start_threads: start_threads.max(1),
        })
    }

    /// Submits `task` for execution by some worker. If the queue is
    /// bounded and full, blocks for up to `timeout` (or forever if
    /// `None`) before failing with [`Error::Overflow`].
    pub fn enqueue(&self, task: Task, timeout: Option<Duration>) -> Result<(), Error> {
        self.engine.job().enqueue(task, timeout)?;
        let job = self.engine.job().clone();
        self.engine.add_thread_if(|| job.should_grow());
        Ok(())
    }

    /// Convenience wrapper for plain closures.
    pub fn enqueue_fn(
        &self,
        timeout: Option<Duration>,
        f: impl FnOnce() + Send + 'static,
    ) -> Result<(), Error> {
        self.enqueue(Box::new(f), timeout)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.engine.job().pending()
    }
}

impl ActiveObject for TaskRunner {
    fn activate(&self) -> Result<(), AoError> {
        self.engine.activate_with(self.start_threads)
    }

    fn deactivate(&self) {
        self.engine.deactivate();
    }

    fn wait(&self) {
        self.engine.wait();
    }

    fn active(&self) -> bool {
        self.engine.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn runs_enqueued_tasks() {
        let runner = TaskRunner::new(4, 2, 0, None).unwrap();
        runner.activate().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..50 {
            let counter = counter.clone();
            runner
                .enqueue_fn(None, move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        // give workers a chance to drain the queue
        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == 50 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        runner.deactivate();
        runner.wait();
    }

    #[test]
    fn bounded_queue_overflows_on_timeout() {
        let runner = TaskRunner::new(1, 1, 1, None).unwrap();
        runner.activate().unwrap();
        // occupy the single worker with a long task so the queue fills up
        runner
            .enqueue_fn(None, || std::thread::sleep(Duration::from_millis(200)))
            .unwrap();
        runner.enqueue_fn(None, || {}).unwrap();
        let result = runner.enqueue_fn(Some(Duration::from_millis(20)), || {});
        assert!(matches!(result, Err(Error::Overflow)));
        runner.deactivate();
        runner.wait();
    }

    #[test]
    fn null_task_rejected() {
        let runner = TaskRunner::new(1, 1, 0, None).unwrap();
        runner.activate().unwrap();
        runner.deactivate();
        runner.wait();
    }
}
