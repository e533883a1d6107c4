// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use uxcommons_active_object::{ActiveObject, ActiveObjectState, Error as AoError};
use uxcommons_periodic::{PeriodicRunner, PeriodicTask};
use uxcommons_task_runner::TaskRunner;
use uxcommons_util::Informer;

use crate::event_thread::EventThread;
use crate::policy::PoolPolicy;
use crate::request::{Request, RequestLifecycle, ResponseCallback};
use crate::server::Server;
use crate::types::{HostPort, Method, ThreadId};
use crate::Error;

/// The top-level asynchronous HTTP client facade: routes requests to
/// per-destination [`Server`]s, each of whose connections is driven by
/// one of a small set of [`EventThread`]s, with idle-connection sweeps
/// on a dedicated [`PeriodicRunner`] thread. Terminal callbacks are
/// delivered through a pool-owned [`TaskRunner`] rather than on the
/// reactor thread that completed them; [`HttpAsyncPool::wait`] blocks
/// on an [`Informer`] held by every in-flight [`Request`] until every
/// one of those callbacks has actually run.
pub struct HttpAsyncPool {
    policy: Arc<dyn PoolPolicy>,
    servers: Mutex<HashMap<HostPort, Arc<Server>>>,
    threads: Mutex<Vec<Arc<EventThread>>>,
    next_thread_id: AtomicU64,
    sweeper: PeriodicRunner,
    task_runner: Arc<TaskRunner>,
    informer: Arc<Informer>,
    state: Mutex<ActiveObjectState>,
}

struct SweepTask(Mutex<Weak<HttpAsyncPool>>);

impl PeriodicTask for SweepTask {
    fn run(&self, _forced: bool) {
        if let Some(pool) = self.0.lock().unwrap().upgrade() {
            pool.sweep_all();
        }
    }
}

impl HttpAsyncPool {
    /// # Errors
    /// Propagates failures standing up the initial event thread, its
    /// reactor, or the callback task runner.
    pub fn new(policy: Arc<dyn PoolPolicy>, thread_count: usize) -> Result<Arc<Self>, Error> {
        let thread_count = thread_count.max(1);
        let sweeper = PeriodicRunner::new(None);
        let task_runner = Arc::new(TaskRunner::new(thread_count.max(2), thread_count, 0, None)?);

        let pool = Arc::new(Self {
            policy,
            servers: Mutex::new(HashMap::new()),
            threads: Mutex::new(Vec::new()),
            next_thread_id: AtomicU64::new(1),
            sweeper,
            task_runner,
            informer: Arc::new(Informer::new()),
            state: Mutex::new(ActiveObjectState::NotActive),
        });

        for _ in 0..thread_count {
            pool.spawn_thread()?;
        }

        let interval = pool.policy.expiration_timeout().max(Duration::from_secs(1));
        let task: Arc<dyn PeriodicTask> = Arc::new(SweepTask(Mutex::new(Arc::downgrade(&pool))));
        pool.sweeper.add_task(task, interval, true, false)?;

        Ok(pool)
    }

    fn spawn_thread(&self) -> Result<ThreadId, Error> {
        let id = self.next_thread_id.fetch_add(1, Ordering::Relaxed);
        let thread = EventThread::new(id, self.policy.clone())?;
        self.threads.lock().unwrap().push(thread);
        Ok(id)
    }

    fn sweep_all(&self) {
        for thread in self.threads.lock().unwrap().iter() {
            thread.request_idle_sweep();
        }
        for server in self.servers.lock().unwrap().values() {
            server.sweep_idle();
        }
        self.retire_empty_threads();
    }

    /// Tears down event threads that [`EventThread::should_close`]
    /// reports as empty-and-past-deadline, joining the reactor through
    /// a [`TaskRunner`] task per [`PoolPolicy::when_close_thread`], and
    /// disposing of it. Never retires the last remaining thread. Falls
    /// back to joining on this (the periodic sweeper's) thread if the
    /// task runner can't accept the job, so a retired thread is never
    /// dropped from the pool's bookkeeping without actually being
    /// torn down.
    fn retire_empty_threads(&self) {
        let mut threads = self.threads.lock().unwrap();
        let mut remaining = threads.len();
        let mut keep = Vec::with_capacity(remaining);
        for thread in threads.drain(..) {
            if remaining > 1 && thread.should_close() {
                remaining -= 1;
                if let Err(_err) = self.task_runner.enqueue_fn(None, {
                    let thread = thread.clone();
                    move || thread.shutdown()
                }) {
                    thread.shutdown();
                }
            } else {
                keep.push(thread);
            }
        }
        *threads = keep;
    }

    fn server_for(self: &Arc<Self>, host_port: &HostPort) -> Arc<Server> {
        let mut servers = self.servers.lock().unwrap();
        if let Some(server) = servers.get(host_port) {
            return server.clone();
        }
        let threads = self.threads.lock().unwrap();
        let chosen = self
            .policy
            .choose_thread()
            .and_then(|id| threads.iter().find(|t| t.id == id).cloned())
            .or_else(|| threads.first().cloned())
            .expect("pool always has at least one event thread");
        drop(threads);

        let register_fn: Box<dyn Fn(u64, Arc<crate::connection::Connection>) -> std::io::Result<()> + Send + Sync> = {
            let chosen = chosen.clone();
            Box::new(move |_id, conn| chosen.register_connection(conn))
        };
        let server = Server::new(host_port.clone(), self.policy.clone(), self.task_runner.clone(), register_fn);
        servers.insert(host_port.clone(), server.clone());
        server
    }

    fn submit(self: &Arc<Self>, mut request: Request) -> Result<(), Error> {
        if !self.active() {
            request
                .callback
                .quick_on_error("pool is shutting down".to_string(), None);
            return Err(Error::CancelledOnShutdown);
        }
        request.lifecycle = Some(RequestLifecycle::new(self.informer.clone(), self.policy.clone()));
        let server = self.server_for(&request.host_port);
        server.dispatch(request).map_err(Error::Io)
    }

    pub fn add_get_request(
        self: &Arc<Self>,
        host_port: HostPort,
        uri: impl Into<String>,
        callback: Arc<dyn ResponseCallback>,
    ) -> Result<(), Error> {
        self.submit(Request::get(host_port, uri, callback))
    }

    pub fn add_post_request(
        self: &Arc<Self>,
        host_port: HostPort,
        uri: impl Into<String>,
        body: Vec<u8>,
        callback: Arc<dyn ResponseCallback>,
    ) -> Result<(), Error> {
        self.submit(Request::post(host_port, uri, body, callback))
    }

    pub fn add_request(
        self: &Arc<Self>,
        method: Method,
        host_port: HostPort,
        uri: impl Into<String>,
        body: Option<Vec<u8>>,
        callback: Arc<dyn ResponseCallback>,
    ) -> Result<(), Error> {
        match method {
            Method::Get => self.add_get_request(host_port, uri, callback),
            Method::Post => self.add_post_request(host_port, uri, body.unwrap_or_default(), callback),
        }
    }

    /// Convenience for `deactivate()` immediately followed by `wait()`.
    /// Idempotent, like the two calls it wraps.
    pub fn shutdown(&self) {
        self.deactivate();
        self.wait();
    }

    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }
}

impl ActiveObject for HttpAsyncPool {
    /// Starts the callback task runner and the idle-sweep periodic
    /// task. Event threads are already running by the time `new`
    /// returns, matching every other `ActiveObject` in this workspace:
    /// fallible setup happens in construction, `activate` only starts
    /// already-prepared workers.
    fn activate(&self) -> Result<(), AoError> {
        let mut state = self.state.lock().unwrap();
        if *state != ActiveObjectState::NotActive {
            return Err(AoError::AlreadyActive);
        }
        self.task_runner.activate()?;
        self.sweeper.activate()?;
        *state = ActiveObjectState::Active;
        Ok(())
    }

    /// Stops accepting new requests and signals the sweeper to stop.
    /// Never blocks; the actual teardown of servers, event threads, and
    /// the task runner happens in [`Self::wait`].
    fn deactivate(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == ActiveObjectState::Active {
            *state = ActiveObjectState::Deactivating;
            self.sweeper.deactivate();
        }
    }

    /// Fails everything still queued or in flight and tears down every
    /// event thread, then blocks on the [`Informer`] until every
    /// terminal callback that resulted has actually run, and only then
    /// deactivates the task runner delivering them -- enqueueing a
    /// callback after the runner's `terminate` flag is observed would
    /// otherwise silently drop it (see [`crate::request::deliver_response`]).
    ///
    /// Unlike `wait()` on the task runner or sweeper, this is not
    /// gated on the pool's own `Active` state: event threads are
    /// spawned unconditionally in `new`, not by `activate`, so they
    /// (and the servers built on them) must be torn down even for a
    /// pool that was constructed and dropped without ever activating.
    fn wait(&self) {
        self.sweeper.wait();
        let servers: Vec<Arc<Server>> = self.servers.lock().unwrap().drain().map(|(_, s)| s).collect();
        for server in &servers {
            server.shutdown();
        }
        let threads: Vec<Arc<EventThread>> = self.threads.lock().unwrap().drain(..).collect();
        for thread in &threads {
            thread.shutdown();
        }
        self.informer.wait();
        self.task_runner.deactivate();
        self.task_runner.wait();
        *self.state.lock().unwrap() = ActiveObjectState::NotActive;
    }

    fn active(&self) -> bool {
        *self.state.lock().unwrap() == ActiveObjectState::Active
    }
}

impl Drop for HttpAsyncPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
