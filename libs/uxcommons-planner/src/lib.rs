// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Timer-driven task dispatch: [`Planner`] delivers `goal` callbacks at
//! or near their requested absolute deadlines, using a single
//! dispatcher thread and a time-ordered list.

mod error;
mod job;

pub use error::Error;

use std::sync::Arc;
use std::time::Instant;
use uxcommons_active_object::{
    ActiveObject, ActiveObjectCallback, ActiveObjectCommonImpl, Error as AoError,
};

use job::PlannerJob;

/// A schedulable callback. Identity for `unschedule` is `Arc` pointer
/// equality, not value equality, matching the original library's
/// handle-based cancellation.
pub type Goal = Arc<dyn Fn() + Send + Sync>;

/// Delivers goals at absolute deadlines from a single dispatcher
/// thread.
///
/// `unschedule` never cancels a goal whose delivery has already begun:
/// it only removes entries still sitting in the pending list. This
/// mirrors the original scheduler's behavior exactly rather than
/// "fixing" it, since callers may depend on at-least-once delivery
/// semantics for goals that are mid-flight when `unschedule` races
/// with dispatch.
pub struct Planner {
    engine: Arc<ActiveObjectCommonImpl<PlannerJob>>,
}

impl Planner {
    #[must_use]
    pub fn new(callback: Option<Arc<dyn ActiveObjectCallback>>, delivery_adjustment: bool) -> Self {
        let job = Arc::new(PlannerJob::new(delivery_adjustment));
        let engine = ActiveObjectCommonImpl::new(job, 1, callback)
            .expect("threads_number = 1 is always valid");
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Schedules `goal` for delivery at `deadline`. A `deadline` in the
    /// past is delivered on the dispatcher's next pass.
    pub fn schedule(&self, goal: Goal, deadline: Instant) {
        self.engine.job().schedule(goal, deadline);
    }

    /// Removes every pending entry referencing `goal`; returns how many
    /// were removed. Does not affect a goal whose delivery is already
    /// in progress.
    pub fn unschedule(&self, goal: &Goal) -> usize {
        self.engine.job().unschedule(goal)
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.engine.job().pending()
    }
}

impl ActiveObject for Planner {
    fn activate(&self) -> Result<(), AoError> {
        self.engine.activate_with(1)
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
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn delivers_in_deadline_order() {
        let planner = Planner::new(None, false);
        planner.activate().unwrap();
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let now = Instant::now();

        let mk = |tag: u32, order: Arc<Mutex<Vec<u32>>>| -> Goal {
            Arc::new(move || order.lock().unwrap().push(tag))
        };

        planner.schedule(mk(1, order.clone()), now + Duration::from_millis(100));
        planner.schedule(mk(2, order.clone()), now + Duration::from_millis(50));
        planner.schedule(mk(3, order.clone()), now + Duration::from_millis(50));

        std::thread::sleep(Duration::from_millis(250));
        planner.deactivate();
        planner.wait();

        assert_eq!(*order.lock().unwrap(), vec![2, 3, 1]);
    }

    #[test]
    fn unschedule_removes_pending_entry() {
        let planner = Planner::new(None, false);
        planner.activate().unwrap();
        let fired = Arc::new(Mutex::new(false));
        let fired2 = fired.clone();
        let goal: Goal = Arc::new(move || *fired2.lock().unwrap() = true);
        planner.schedule(goal.clone(), Instant::now() + Duration::from_secs(10));
        let removed = planner.unschedule(&goal);
        assert_eq!(removed, 1);
        planner.deactivate();
        planner.wait();
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn past_deadline_fires_on_next_pass() {
        let planner = Planner::new(None, false);
        planner.activate().unwrap();
        let fired = Arc::new(Mutex::new(false));
        let fired2 = fired.clone();
        let goal: Goal = Arc::new(move || *fired2.lock().unwrap() = true);
        planner.schedule(goal, Instant::now() - Duration::from_secs(1));
        std::thread::sleep(Duration::from_millis(50));
        planner.deactivate();
        planner.wait();
        assert!(*fired.lock().unwrap());
    }
}
