// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Cross-thread producer -> reactor hand-off.
//!
//! Producers push items from arbitrary threads; the reactor thread
//! that owns this queue's waker drains it without ever taking an I/O
//! lock while producers are pushing.

use mio::Waker;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

const DATA: u8 = 1 << 0;
const QUIT: u8 = 1 << 1;
const CHECK: u8 = 1 << 2;

/// The reason(s) a [`SignalQueue`] woke its reactor, coalesced: several
/// signals of the same kind raised between drains collapse into one
/// callback invocation per drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub data: bool,
    pub quit: bool,
    pub check: bool,
}

pub struct SignalQueue<T> {
    items: Mutex<VecDeque<T>>,
    pending: AtomicU8,
    waker: Arc<Waker>,
}

impl<T> SignalQueue<T> {
    #[must_use]
    pub fn new(waker: Arc<Waker>) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            pending: AtomicU8::new(0),
            waker,
        }
    }

    /// Pushes `item` and signals `DATA`, waking the owning reactor if
    /// the queue was otherwise quiescent.
    pub fn push(&self, item: T) {
        self.items.lock().unwrap().push_back(item);
        self.signal(DATA);
    }

    pub fn signal_check(&self) {
        self.signal(CHECK);
    }

    pub fn signal_quit(&self) {
        self.signal(QUIT);
    }

    fn signal(&self, bit: u8) {
        self.pending.fetch_or(bit, Ordering::AcqRel);
        let _ = self.waker.wake();
    }

    /// Drains every pending item and the coalesced signal set. Intended
    /// to be called once per reactor wakeup.
    pub fn drain(&self) -> (Vec<T>, Signals) {
        let bits = self.pending.swap(0, Ordering::AcqRel);
        let items: Vec<T> = self.items.lock().unwrap().drain(..).collect();
        (
            items,
            Signals {
                data: bits & DATA != 0,
                quit: bits & QUIT != 0,
                check: bits & CHECK != 0,
            },
        )
    }

    /// Synchronous drain used during teardown: returns remaining items
    /// without requiring the reactor thread to observe a wakeup first.
    pub fn flush(&self) -> Vec<T> {
        self.pending.store(0, Ordering::Release);
        self.items.lock().unwrap().drain(..).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Token;

    #[test]
    fn coalesces_signals_across_a_single_drain() {
        let poll = mio::Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(0)).unwrap());
        let queue: SignalQueue<u32> = SignalQueue::new(waker);
        queue.push(1);
        queue.push(2);
        queue.signal_check();
        let (items, signals) = queue.drain();
        assert_eq!(items, vec![1, 2]);
        assert!(signals.data);
        assert!(signals.check);
        assert!(!signals.quit);

        let (items, signals) = queue.drain();
        assert!(items.is_empty());
        assert_eq!(signals, Signals::default());
    }
}
