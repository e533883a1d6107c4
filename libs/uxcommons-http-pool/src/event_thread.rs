// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use uxcommons_active_object::ActiveObject;
use uxcommons_reactor::{Handler, Reactor};

use crate::connection::Connection;
use crate::policy::{CloseVerdict, PoolPolicy};
use crate::signal_queue::SignalQueue;
use crate::types::ThreadId;

const CONTROL_KEY: u64 = 0;

/// One OS thread's worth of reactor: a private [`Reactor`] instance
/// (so a single select/dispatch worker rotates across its own shard
/// set) plus a control [`SignalQueue`] for close-sweep and shutdown
/// signaling from other threads. Connections are tracked by their
/// reactor registration key so a stale one can be deregistered
/// ([`Reactor::remove`]) instead of merely dropped.
pub struct EventThread {
    pub id: ThreadId,
    reactor: Arc<Reactor>,
    control: Arc<SignalQueue<()>>,
    connections: Mutex<HashMap<usize, Arc<Connection>>>,
    next_key: AtomicU64,
    policy: Arc<dyn PoolPolicy>,
    close_deadline: Mutex<Option<Instant>>,
}

struct ControlHandler {
    queue: Arc<SignalQueue<()>>,
    thread: Weak<EventThread>,
}

impl Handler for ControlHandler {
    fn register(&self, _registry: &mio::Registry, _token: mio::Token) -> io::Result<()> {
        Ok(()) // the waker is already registered; nothing more to do
    }
    fn reregister(&self, _registry: &mio::Registry, _token: mio::Token) -> io::Result<()> {
        Ok(())
    }
    fn deregister(&self, _registry: &mio::Registry) -> io::Result<()> {
        Ok(())
    }
    fn handle_input(&self) -> io::Result<usize> {
        let (_, signals) = self.queue.drain();
        if let Some(thread) = self.thread.upgrade() {
            if signals.check {
                thread.sweep_idle();
            }
        }
        Ok(1) // the control channel is never retired
    }
}

impl EventThread {
    pub(crate) fn new(id: ThreadId, policy: Arc<dyn PoolPolicy>) -> Result<Arc<Self>, crate::Error> {
        let reactor = Arc::new(Reactor::new(1, None)?);
        let waker = reactor.make_waker(CONTROL_KEY as usize)?;
        let control = Arc::new(SignalQueue::new(waker));
        let thread = Arc::new(Self {
            id,
            reactor,
            control,
            connections: Mutex::new(HashMap::new()),
            next_key: AtomicU64::new(CONTROL_KEY + 1),
            policy: policy.clone(),
            close_deadline: Mutex::new(None),
        });
        let handler = Arc::new(ControlHandler {
            queue: thread.control.clone(),
            thread: Arc::downgrade(&thread),
        });
        thread.reactor.activate()?;
        thread.reactor.register(CONTROL_KEY as usize, handler)?;
        policy.thread_added(id);
        Ok(thread)
    }

    /// Registers a freshly-opened connection with this thread's
    /// reactor and tracks it for idle-sweep and shutdown. A thread that
    /// had armed a close deadline (see [`Self::arm_close_timer`])
    /// because it had gone empty is un-armed: it has work again.
    pub(crate) fn register_connection(&self, conn: Arc<Connection>) -> io::Result<()> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed) as usize;
        self.reactor.register(key, conn.clone()).map_err(io::Error::other)?;
        self.connections.lock().unwrap().insert(key, conn);
        *self.close_deadline.lock().unwrap() = None;
        self.policy.thread_connection_added(self.id);
        Ok(())
    }

    /// Asks the control handler to sweep idle connections on its own
    /// thread the next time the reactor wakes; non-blocking.
    pub(crate) fn request_idle_sweep(&self) {
        self.control.signal_check();
    }

    /// Drops connections whose own close deadline has passed, or that
    /// [`Connection::fail_connection`] has already marked terminating
    /// (it removes a failed connection from its `Server` but has no
    /// handle back to the `EventThread` that registered it, so this is
    /// where its reactor registration actually gets deregistered).
    /// If that leaves the thread with no connections at all, consults
    /// [`PoolPolicy::when_close_thread`] to decide whether (and when)
    /// this now-empty thread should itself be retired.
    fn sweep_idle(&self) {
        let mut connections = self.connections.lock().unwrap();
        let stale: Vec<usize> = connections
            .iter()
            .filter(|(_, c)| c.should_close() || c.is_terminating())
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            if let Some(conn) = connections.remove(&key) {
                conn.mark_terminating();
                let _ = self.reactor.remove(key);
                self.policy.thread_connection_removed(self.id);
            }
        }
        if connections.is_empty() {
            drop(connections);
            self.arm_close_timer();
        } else {
            *self.close_deadline.lock().unwrap() = None;
        }
    }

    /// Only arms the deadline the first time the thread is observed
    /// empty: re-consulting the policy on every subsequent sweep while
    /// still empty would keep pushing an `AfterSeconds` deadline
    /// forward and the thread would never actually close.
    fn arm_close_timer(&self) {
        let mut deadline = self.close_deadline.lock().unwrap();
        if deadline.is_some() {
            return;
        }
        *deadline = match self.policy.when_close_thread() {
            CloseVerdict::Now => Some(Instant::now()),
            CloseVerdict::AfterSeconds(secs) => Some(Instant::now() + Duration::from_secs(secs)),
            CloseVerdict::KeepOpen => None,
        };
    }

    /// Consulted by the pool's periodic sweep to decide whether this
    /// (necessarily empty, per [`Self::sweep_idle`]) thread should be
    /// retired: its close deadline has been armed and has passed.
    #[must_use]
    pub(crate) fn should_close(&self) -> bool {
        self.connections.lock().unwrap().is_empty()
            && matches!(*self.close_deadline.lock().unwrap(), Some(deadline) if Instant::now() >= deadline)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub(crate) fn shutdown(&self) {
        let connections: Vec<Arc<Connection>> = self.connections.lock().unwrap().drain().map(|(_, c)| c).collect();
        for conn in connections {
            conn.fail_all("pool is shutting down");
        }
        self.reactor.deactivate();
        self.reactor.wait();
        self.policy.thread_removed(self.id);
    }
}
