// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, trace};
use uxcommons_active_object::SingleJob;

use crate::Goal;

struct TimedMessage {
    deadline: Instant,
    goal: Goal,
}

struct State {
    messages: VecDeque<TimedMessage>,
    terminating: bool,
    have_new_events: bool,
}

pub(crate) struct PlannerJob {
    state: Mutex<State>,
    cond: Condvar,
    delivery_adjustment: bool,
    delivery_shift: Mutex<Duration>,
}

impl PlannerJob {
    pub(crate) fn new(delivery_adjustment: bool) -> Self {
        Self {
            state: Mutex::new(State {
                messages: VecDeque::new(),
                terminating: false,
                have_new_events: false,
            }),
            cond: Condvar::new(),
            delivery_adjustment,
            delivery_shift: Mutex::new(Duration::ZERO),
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().unwrap().messages.len()
    }

    pub(crate) fn schedule(&self, goal: Goal, deadline: Instant) {
        let mut state = self.state.lock().unwrap();
        // scan from the tail for the first existing entry whose deadline
        // is <= the new one; insert right after it. Entries sharing a
        // deadline keep FIFO (schedule-call) order.
        let mut insert_at = 0;
        for i in (0..state.messages.len()).rev() {
            if state.messages[i].deadline <= deadline {
                insert_at = i + 1;
                break;
            }
        }
        state.messages.insert(insert_at, TimedMessage { deadline, goal });
        if insert_at == 0 {
            state.have_new_events = true;
            self.cond.notify_all();
        }
    }

    pub(crate) fn unschedule(&self, goal: &Goal) -> usize {
        let mut state = self.state.lock().unwrap();
        let before = state.messages.len();
        state
            .messages
            .retain(|msg| !std::sync::Arc::ptr_eq(&msg.goal, goal));
        before - state.messages.len()
    }
}

impl SingleJob for PlannerJob {
    fn work(&self) {
        loop {
            let mut state = self.state.lock().unwrap();
            if state.terminating {
                break;
            }

            let shift = *self.delivery_shift.lock().unwrap();
            let now = Instant::now();
            let effective_now = now + shift;

            let mut pending = Vec::new();
            while let Some(front) = state.messages.front() {
                if front.deadline <= effective_now {
                    pending.push(state.messages.pop_front().unwrap());
                } else {
                    break;
                }
            }
            let next_deadline = state.messages.front().map(|m| m.deadline);

            if pending.is_empty() {
                state.have_new_events = false;
                let wait_target = next_deadline.unwrap_or_else(|| now + Duration::from_secs(3600));
                loop {
                    let wait_for = wait_target.saturating_duration_since(Instant::now());
                    let (guard, result) =
                        self.cond.wait_timeout(state, wait_for).unwrap();
                    state = guard;
                    if state.terminating {
                        break;
                    }
                    if state.have_new_events {
                        if self.delivery_adjustment {
                            let now = Instant::now();
                            if now > wait_target {
                                let delta = now - wait_target;
                                *self.delivery_shift.lock().unwrap() = delta / 2;
                            }
                        }
                        break;
                    }
                    if result.timed_out() {
                        break;
                    }
                }
                // re-pump: new messages may have arrived, or the target
                // deadline is now due.
                continue;
            }

            drop(state);

            for msg in pending {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (msg.goal)())) {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "goal panicked".to_string());
                    error!(message, "planner goal failed");
                } else {
                    trace!("planner goal delivered");
                }
            }
        }
    }

    fn terminate(&self) {
        let mut state = self.state.lock().unwrap();
        state.terminating = true;
        state.have_new_events = true;
        self.cond.notify_all();
    }
}
