// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{error, trace};
use uxcommons_active_object::SingleJob;
use uxcommons_util::Semaphore;

use crate::Error;

/// A one-shot unit of work. Boxed rather than generic so a single
/// `TaskRunner` can carry heterogeneous callers.
pub type Task = Box<dyn FnOnce() + Send>;

pub(crate) struct TaskRunnerJob {
    threads_number: usize,
    limited: bool,
    tasks: Mutex<VecDeque<Task>>,
    new_task: Semaphore,
    not_full: Semaphore,
    number_of_unused_threads: AtomicUsize,
    terminating: AtomicBool,
}

impl TaskRunnerJob {
    pub(crate) fn new(threads_number: usize, max_pending: usize) -> Self {
        Self {
            threads_number,
            limited: max_pending != 0,
            tasks: Mutex::new(VecDeque::new()),
            new_task: Semaphore::new(0),
            not_full: Semaphore::new(max_pending),
            number_of_unused_threads: AtomicUsize::new(threads_number),
            terminating: AtomicBool::new(false),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub(crate) fn should_grow(&self) -> bool {
        self.tasks.lock().unwrap().len() > self.number_of_unused_threads.load(Ordering::Acquire)
    }

    pub(crate) fn enqueue(&self, task: Task, timeout: Option<Duration>) -> Result<(), Error> {
        if self.limited {
            match timeout {
                None => self.not_full.acquire(),
                Some(timeout) => self
                    .not_full
                    .acquire_timeout(timeout)
                    .map_err(|_| Error::Overflow)?,
            }
        }
        self.tasks.lock().unwrap().push_back(task);
        self.new_task.release();
        Ok(())
    }
}

impl SingleJob for TaskRunnerJob {
    fn work(&self) {
        loop {
            self.new_task.acquire();

            let task = {
                let mut tasks = self.tasks.lock().unwrap();
                if self.terminating.load(Ordering::Acquire) {
                    break;
                }
                match tasks.pop_front() {
                    Some(task) => {
                        self.number_of_unused_threads.fetch_sub(1, Ordering::AcqRel);
                        task
                    }
                    // spurious wakeup: another worker already drained the queue
                    None => continue,
                }
            };

            // release the producer slot *before* running the task, so a
            // long-running task never stalls producers.
            if self.limited {
                self.not_full.release();
            }

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "task panicked".to_string());
                error!(message, "task execution failed");
            } else {
                trace!("task executed");
            }

            self.number_of_unused_threads.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn terminate(&self) {
        self.terminating.store(true, Ordering::Release);
        // one release per worker thread, so every blocked work() loop wakes
        self.new_task.release_n(self.threads_number);
    }
}
