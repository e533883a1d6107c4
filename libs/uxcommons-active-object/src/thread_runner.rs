// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::thread::JoinHandle;

/// A small pool of joinable OS threads, capped at `capacity`.
///
/// `spawn` is used both at activation time (to start the initial
/// worker set) and afterward, for cooperative pool growth.
pub struct ThreadRunner {
    capacity: usize,
    handles: Vec<JoinHandle<()>>,
}

impl ThreadRunner {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            handles: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.handles.len()
    }

    /// Spawns `f` on a new OS thread, unless `capacity` is already
    /// reached.
    pub fn spawn(&mut self, f: impl FnOnce() + Send + 'static) {
        if self.handles.len() >= self.capacity {
            return;
        }
        self.handles.push(std::thread::spawn(f));
    }

    /// Joins every spawned worker, consuming the runner.
    pub fn join_all(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
