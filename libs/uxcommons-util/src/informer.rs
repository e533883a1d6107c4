// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::{Condvar, Mutex};

/// A counting sentinel: `mark()` records one more live unit of work,
/// `release()` retires one, and `wait()` blocks until the count returns
/// to zero. Used by components whose `wait()` must not return until
/// every outstanding callback/response has actually been delivered,
/// not merely scheduled.
#[derive(Debug, Default)]
pub struct Informer {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Informer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    pub fn mark(&self) {
        *self.count.lock().unwrap() += 1;
    }

    /// Retires one marked unit, waking any `wait()` callers if the
    /// count has reached zero.
    pub fn release(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    /// Blocks until every marked unit has been released.
    pub fn wait(&self) {
        let count = self.count.lock().unwrap();
        let _count = self.idle.wait_while(count, |c| *c > 0).unwrap();
    }

    #[must_use]
    pub fn count(&self) -> usize {
        *self.count.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_when_never_marked() {
        let informer = Informer::new();
        informer.wait();
    }

    #[test]
    fn wait_blocks_until_every_mark_is_released() {
        let informer = Arc::new(Informer::new());
        informer.mark();
        informer.mark();
        let waiter = {
            let informer = informer.clone();
            thread::spawn(move || informer.wait())
        };
        thread::sleep(Duration::from_millis(20));
        informer.release();
        assert_eq!(informer.count(), 1);
        informer.release();
        waiter.join().unwrap();
        assert_eq!(informer.count(), 0);
    }
}
