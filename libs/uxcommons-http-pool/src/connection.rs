// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use uxcommons_reactor::Handler;
use uxcommons_task_runner::TaskRunner;

use crate::policy::{CloseVerdict, PerRequestVerdict, PoolPolicy, ResendVerdict};
use crate::request::{deliver_error, deliver_response, Request, ResponseInfo};
use crate::server::Server;
use crate::types::{ConnectionId, HostPort, Severity};

/// A single keep-alive HTTP/1.1 connection to one `host:port`. At most
/// one request is ever in flight (no pipelining); the wire protocol is
/// plain HTTP/1.1 over TCP (no TLS, matching the exclusion of the
/// OpenSSL glue from this workspace's scope).
pub struct Connection {
    pub id: ConnectionId,
    pub host_port: HostPort,
    stream: Mutex<TcpStream>,
    pending: Mutex<VecDeque<Request>>,
    in_flight: Mutex<Option<Request>>,
    write_buf: Mutex<Vec<u8>>,
    read_buf: Mutex<Vec<u8>>,
    server: Weak<Server>,
    policy: Arc<dyn PoolPolicy>,
    task_runner: Arc<TaskRunner>,
    terminating: AtomicBool,
    close_deadline: Mutex<Option<Instant>>,
}

impl Connection {
    pub(crate) fn connect(
        id: ConnectionId,
        host_port: HostPort,
        addr: std::net::SocketAddr,
        server: Weak<Server>,
        policy: Arc<dyn PoolPolicy>,
        task_runner: Arc<TaskRunner>,
    ) -> io::Result<Arc<Self>> {
        let stream = TcpStream::connect(addr)?;
        Ok(Arc::new(Self {
            id,
            host_port,
            stream: Mutex::new(stream),
            pending: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(None),
            write_buf: Mutex::new(Vec::new()),
            read_buf: Mutex::new(Vec::new()),
            server,
            policy,
            task_runner,
            terminating: AtomicBool::new(false),
            close_deadline: Mutex::new(None),
        }))
    }

    /// Queues `request`; if nothing is currently in flight, sends it
    /// immediately.
    pub(crate) fn submit(&self, request: Request) {
        if self.terminating.load(Ordering::Acquire) {
            deliver_error(&self.task_runner, request, "connection is closing".to_string());
            return;
        }
        self.pending.lock().unwrap().push_back(request);
        self.try_start_next();
    }

    fn try_start_next(&self) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if in_flight.is_some() {
            return;
        }
        let mut pending = self.pending.lock().unwrap();
        let Some(next) = pending.pop_front() else {
            return;
        };
        drop(pending);
        *self.write_buf.lock().unwrap() = next.to_wire_bytes();
        *in_flight = Some(next);
        *self.close_deadline.lock().unwrap() = None;
        drop(in_flight);
        self.policy.connection_request_added(self.id);
        let _ = self.flush();
    }

    fn flush(&self) -> io::Result<()> {
        let mut stream = self.stream.lock().unwrap();
        let mut buf = self.write_buf.lock().unwrap();
        while !buf.is_empty() {
            match stream.write(&buf) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => {
                    buf.drain(..n);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn read_more(&self) -> io::Result<bool> {
        let mut stream = self.stream.lock().unwrap();
        let mut read_buf = self.read_buf.lock().unwrap();
        let mut tmp = [0_u8; 8192];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => return Ok(false), // peer closed
                Ok(n) => read_buf.extend_from_slice(&tmp[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn try_complete_response(&self) -> io::Result<()> {
        loop {
            let mut read_buf = self.read_buf.lock().unwrap();
            if read_buf.is_empty() {
                return Ok(());
            }
            let mut headers = [httparse::EMPTY_HEADER; 64];
            let mut response = httparse::Response::new(&mut headers);
            let parsed = match response.parse(&read_buf) {
                Ok(httparse::Status::Complete(n)) => n,
                Ok(httparse::Status::Partial) => return Ok(()),
                Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
            };
            let status = response.code.unwrap_or(0);
            let header_pairs: Vec<(String, String)> = response
                .headers
                .iter()
                .map(|h| {
                    (
                        h.name.to_string(),
                        String::from_utf8_lossy(h.value).into_owned(),
                    )
                })
                .collect();
            let content_length = header_pairs
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if read_buf.len() < parsed + content_length {
                return Ok(()); // wait for more body bytes
            }
            let body = read_buf[parsed..parsed + content_length].to_vec();
            read_buf.drain(..parsed + content_length);
            drop(read_buf);

            let info = ResponseInfo {
                status,
                headers: header_pairs,
                body,
            };
            self.complete_in_flight(Ok(info));
        }
    }

    fn complete_in_flight(&self, result: Result<ResponseInfo, String>) {
        let request = self.in_flight.lock().unwrap().take();
        if let Some(server) = self.server.upgrade() {
            server.notify_request_removed();
        }
        self.policy.connection_request_removed(self.id);
        if let Some(request) = request {
            match result {
                Ok(info) => deliver_response(&self.task_runner, request, info),
                Err(description) => deliver_error(&self.task_runner, request, description),
            }
        }
        self.try_start_next();
        if self.in_flight.lock().unwrap().is_none() && self.pending.lock().unwrap().is_empty() {
            self.arm_close_timer();
        }
    }

    /// Called when the pending queue empties and nothing is in flight:
    /// asks the policy when (if ever) this now-idle connection should
    /// close, and arms the single deadline [`Self::should_close`]
    /// checks against.
    fn arm_close_timer(&self) {
        let mut deadline = self.close_deadline.lock().unwrap();
        *deadline = match self.policy.when_close_connection() {
            CloseVerdict::Now => Some(Instant::now()),
            CloseVerdict::AfterSeconds(secs) => Some(Instant::now() + Duration::from_secs(secs)),
            CloseVerdict::KeepOpen => None,
        };
    }

    /// Fails every queued/in-flight request unconditionally (used
    /// during forced shutdown, where resend would only race the pool
    /// tearing itself down).
    pub(crate) fn fail_all(&self, description: &str) {
        self.terminating.store(true, Ordering::Release);
        if let Some(request) = self.in_flight.lock().unwrap().take() {
            deliver_error(&self.task_runner, request, description.to_string());
        }
        let drained: Vec<Request> = self.pending.lock().unwrap().drain(..).collect();
        for request in drained {
            deliver_error(&self.task_runner, request, description.to_string());
        }
    }

    /// A fatal socket-level error (read/write/parse failure, peer
    /// close): the connection itself is unusable, but the requests it
    /// was carrying may still be recoverable by resending them on a
    /// fresh connection, per [`PoolPolicy::requests_failed`].
    fn fail_connection(&self, description: &str) {
        self.terminating.store(true, Ordering::Release);
        let in_flight = self.in_flight.lock().unwrap().take();
        let pending: Vec<Request> = self.pending.lock().unwrap().drain(..).collect();
        if let Some(server) = self.server.upgrade() {
            if in_flight.is_some() {
                server.notify_request_removed();
            }
            server.remove_connection(self.id);
        }

        let Some(in_flight) = in_flight else {
            // nothing was actually in flight; only queued requests can
            // simply be resent as if they'd never been assigned here.
            self.resend_or_cancel(pending, description);
            return;
        };

        match self.policy.requests_failed() {
            ResendVerdict::CancelAll => {
                deliver_error(&self.task_runner, in_flight, description.to_string());
                for request in pending {
                    deliver_error(&self.task_runner, request, description.to_string());
                }
            }
            ResendVerdict::ResendAll => {
                let mut all = vec![in_flight];
                all.extend(pending);
                self.resend_or_cancel(all, description);
            }
            ResendVerdict::CancelFirstResendOthers => {
                deliver_error(&self.task_runner, in_flight, description.to_string());
                self.resend_or_cancel(pending, description);
            }
            ResendVerdict::MoreDetailsRequired => {
                let mut all = vec![in_flight];
                all.extend(pending);
                for request in all {
                    match self.policy.request_failed() {
                        PerRequestVerdict::Resend => self.resend_or_cancel(vec![request], description),
                        PerRequestVerdict::Cancel => {
                            deliver_error(&self.task_runner, request, description.to_string());
                        }
                    }
                }
            }
        }
    }

    fn resend_or_cancel(&self, requests: Vec<Request>, description: &str) {
        let Some(server) = self.server.upgrade() else {
            for request in requests {
                deliver_error(&self.task_runner, request, description.to_string());
            }
            return;
        };
        server.resend(requests);
    }

    /// `true` once no request is queued or in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.lock().unwrap().is_none() && self.pending.lock().unwrap().is_empty()
    }

    /// Checked periodically by the owning event thread: has the close
    /// deadline [`Self::arm_close_timer`] set (per
    /// [`PoolPolicy::when_close_connection`]) passed?
    #[must_use]
    pub fn should_close(&self) -> bool {
        matches!(*self.close_deadline.lock().unwrap(), Some(deadline) if Instant::now() >= deadline)
    }

    #[must_use]
    pub(crate) fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::Acquire)
    }

    pub(crate) fn mark_terminating(&self) {
        self.terminating.store(true, Ordering::Release);
    }
}

impl Handler for Connection {
    fn register(&self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(
            &mut *self.stream.lock().unwrap(),
            token,
            Interest::READABLE | Interest::WRITABLE,
        )
    }

    fn reregister(&self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.reregister(
            &mut *self.stream.lock().unwrap(),
            token,
            Interest::READABLE | Interest::WRITABLE,
        )
    }

    fn deregister(&self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut *self.stream.lock().unwrap())
    }

    fn handle_input(&self) -> io::Result<usize> {
        if let Err(err) = self.flush() {
            self.policy.report_error(
                Severity::Warning,
                &format!("connection {}: write failed: {err}", self.id),
            );
            self.fail_connection(&err.to_string());
            return Err(err);
        }
        match self.read_more() {
            Ok(true) => {}
            Ok(false) => {
                debug!(connection = self.id, "peer closed connection");
                self.fail_connection("connection closed by peer");
                return Ok(0);
            }
            Err(err) => {
                self.policy.report_error(
                    Severity::Warning,
                    &format!("connection {}: read failed: {err}", self.id),
                );
                self.fail_connection(&err.to_string());
                return Err(err);
            }
        }
        if let Err(err) = self.try_complete_response() {
            self.policy.report_error(
                Severity::Error,
                &format!("connection {}: response parse failed: {err}", self.id),
            );
            self.fail_connection(&err.to_string());
            return Err(err);
        }
        trace!(connection = self.id, "handled readiness");
        Ok(1)
    }
}
