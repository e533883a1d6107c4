// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A classic counting semaphore, used throughout the runtime crates as
/// the POSIX semaphore equivalent (`new_task_`, `not_full_`, the
/// reactor's dispatch counter).
#[derive(Debug)]
pub struct Semaphore {
    state: Mutex<usize>,
    cond: Condvar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryAcquireError;

impl std::fmt::Display for TryAcquireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("semaphore would block")
    }
}

impl std::error::Error for TryAcquireError {}

impl Semaphore {
    #[must_use]
    pub fn new(initial: usize) -> Self {
        Self {
            state: Mutex::new(initial),
            cond: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then consumes it.
    pub fn acquire(&self) {
        let mut count = self.state.lock().unwrap();
        while *count == 0 {
            count = self.cond.wait(count).unwrap();
        }
        *count -= 1;
    }

    /// Blocks until a permit is available or `timeout` elapses.
    ///
    /// Returns `Err(TryAcquireError)` on timeout.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<(), TryAcquireError> {
        let deadline = Instant::now() + timeout;
        let mut count = self.state.lock().unwrap();
        loop {
            if *count > 0 {
                *count -= 1;
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TryAcquireError);
            }
            let (guard, result) = self.cond.wait_timeout(count, deadline - now).unwrap();
            count = guard;
            if result.timed_out() && *count == 0 {
                return Err(TryAcquireError);
            }
        }
    }

    /// Non-blocking acquire.
    pub fn try_acquire(&self) -> Result<(), TryAcquireError> {
        let mut count = self.state.lock().unwrap();
        if *count > 0 {
            *count -= 1;
            Ok(())
        } else {
            Err(TryAcquireError)
        }
    }

    /// Releases a single permit, waking one waiter.
    pub fn release(&self) {
        let mut count = self.state.lock().unwrap();
        *count += 1;
        self.cond.notify_one();
    }

    /// Releases `n` permits, one notification per permit. Used by
    /// `TaskRunner::terminate` to release exactly one waiter per worker
    /// thread.
    pub fn release_n(&self, n: usize) {
        let mut count = self.state.lock().unwrap();
        *count += n;
        self.cond.notify_all();
    }

    #[must_use]
    pub fn available(&self) -> usize {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_release_roundtrip() {
        let sem = Semaphore::new(1);
        sem.acquire();
        assert_eq!(sem.available(), 0);
        sem.release();
        assert_eq!(sem.available(), 1);
    }

    #[test]
    fn try_acquire_fails_when_empty() {
        let sem = Semaphore::new(0);
        assert!(sem.try_acquire().is_err());
    }

    #[test]
    fn acquire_timeout_expires() {
        let sem = Semaphore::new(0);
        assert!(sem.acquire_timeout(Duration::from_millis(20)).is_err());
    }

    #[test]
    fn release_wakes_blocked_acquirer() {
        let sem = Arc::new(Semaphore::new(0));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || {
            sem2.acquire();
        });
        thread::sleep(Duration::from_millis(20));
        sem.release();
        handle.join().unwrap();
    }
}
