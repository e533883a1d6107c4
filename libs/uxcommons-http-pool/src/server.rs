// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use uxcommons_task_runner::TaskRunner;

use crate::connection::Connection;
use crate::policy::PoolPolicy;
use crate::request::{deliver_error, Request};
use crate::types::HostPort;

/// Every open [`Connection`] to a single `host:port`. One `Server` per
/// distinct destination the pool has talked to.
pub struct Server {
    pub host_port: HostPort,
    policy: Arc<dyn PoolPolicy>,
    task_runner: Arc<TaskRunner>,
    next_connection_id: AtomicU64,
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
    self_ref: Mutex<Weak<Server>>,
    register_fn: Box<dyn Fn(u64, Arc<Connection>) -> std::io::Result<()> + Send + Sync>,
}

impl Server {
    pub(crate) fn new(
        host_port: HostPort,
        policy: Arc<dyn PoolPolicy>,
        task_runner: Arc<TaskRunner>,
        register_fn: Box<dyn Fn(u64, Arc<Connection>) -> std::io::Result<()> + Send + Sync>,
    ) -> Arc<Self> {
        let server = Arc::new(Self {
            host_port: host_port.clone(),
            policy: policy.clone(),
            task_runner,
            next_connection_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            self_ref: Mutex::new(Weak::new()),
            register_fn,
        });
        *server.self_ref.lock().unwrap() = Arc::downgrade(&server);
        policy.server_added(&host_port);
        server
    }

    /// Routes `request` to an existing connection (per
    /// [`PoolPolicy::choose_connection`]) or opens a new one. Every
    /// path either hands `request` to a connection or delivers its
    /// terminal `on_error` itself -- it is never silently dropped.
    pub(crate) fn dispatch(&self, request: Request) -> std::io::Result<()> {
        let mut connections = self.connections.lock().unwrap();

        if let Some(id) = self.policy.choose_connection(&self.host_port) {
            if let Some(conn) = connections.get(&id) {
                conn.submit(request);
                self.policy.server_request_added(&self.host_port);
                return Ok(());
            }
        }
        if let Some((_, conn)) = connections.iter().find(|(_, c)| c.is_idle()) {
            conn.submit(request);
            self.policy.server_request_added(&self.host_port);
            return Ok(());
        }

        drop(connections);
        match self.open_connection() {
            Ok(conn) => {
                conn.submit(request);
                self.policy.server_request_added(&self.host_port);
                Ok(())
            }
            Err(err) => {
                deliver_error(&self.task_runner, request, err.to_string());
                Err(err)
            }
        }
    }

    fn open_connection(&self) -> std::io::Result<Arc<Connection>> {
        let addr = (self.host_port.host.as_str(), self.host_port.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "unresolvable host")
            })?;
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let server_weak = self.self_ref.lock().unwrap().clone();
        let conn = Connection::connect(
            id,
            self.host_port.clone(),
            addr,
            server_weak,
            self.policy.clone(),
            self.task_runner.clone(),
        )?;
        (self.register_fn)(id, conn.clone())?;
        self.connections.lock().unwrap().insert(id, conn.clone());
        self.policy.server_connection_added(&self.host_port);
        Ok(conn)
    }

    pub(crate) fn notify_request_removed(&self) {
        self.policy.server_request_removed(&self.host_port);
    }

    /// Drops connections whose policy-driven close deadline has
    /// passed, returning the ids removed.
    pub(crate) fn sweep_idle(&self) -> Vec<u64> {
        let mut connections = self.connections.lock().unwrap();
        let stale: Vec<u64> = connections
            .iter()
            .filter(|(_, c)| c.should_close())
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            connections.remove(id);
            self.policy.server_connection_removed(&self.host_port);
        }
        stale
    }

    /// Re-dispatches requests recovered from a connection that just
    /// failed, per [`PoolPolicy::requests_failed`] / `request_failed`.
    /// Each one goes back through [`Server::dispatch`], landing on an
    /// idle connection if one exists or opening a fresh one.
    pub(crate) fn resend(&self, requests: Vec<Request>) {
        for request in requests {
            if let Err(err) = self.dispatch(request) {
                self.policy.report_error(
                    crate::types::Severity::Warning,
                    &format!("resend to {} failed: {err}", self.host_port),
                );
            }
        }
    }

    pub(crate) fn remove_connection(&self, id: u64) {
        if self.connections.lock().unwrap().remove(&id).is_some() {
            self.policy.server_connection_removed(&self.host_port);
        }
    }

    /// Fails every request on every connection and drops them; used
    /// during pool shutdown.
    pub(crate) fn shutdown(&self) {
        let connections: Vec<Arc<Connection>> =
            self.connections.lock().unwrap().drain().map(|(_, c)| c).collect();
        for conn in connections {
            conn.fail_all("pool is shutting down");
        }
        self.policy.server_removed(&self.host_port);
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}
