// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::types::{ConnectionId, HostPort, Severity, ThreadId};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseVerdict {
    /// Arm the close timer for this many seconds and re-check on fire.
    AfterSeconds(u64),
    /// Close immediately.
    Now,
    /// Stay open indefinitely.
    KeepOpen,
}

/// How to recover the requests still queued on a connection that just
/// closed with work outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendVerdict {
    CancelAll,
    ResendAll,
    CancelFirstResendOthers,
    /// Ask [`PoolPolicy::request_failed`] per request.
    MoreDetailsRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerRequestVerdict {
    Resend,
    Cancel,
}

/// The strategy object that decides connection reuse, thread reuse,
/// close timing, and failure recovery for the pool.
///
/// All methods are non-blocking and are called under pool-internal
/// locks: implementations must not call back into the pool. Every
/// method has a conservative default so an application only overrides
/// the hooks it cares about.
pub trait PoolPolicy: Send + Sync {
    fn choose_thread(&self) -> Option<ThreadId> {
        None
    }
    fn choose_connection(&self, _server: &HostPort) -> Option<ConnectionId> {
        None
    }
    fn when_close_connection(&self) -> CloseVerdict {
        CloseVerdict::Now
    }
    fn when_close_thread(&self) -> CloseVerdict {
        CloseVerdict::Now
    }
    fn expiration_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }
    fn requests_failed(&self) -> ResendVerdict {
        ResendVerdict::CancelAll
    }
    fn request_failed(&self) -> PerRequestVerdict {
        PerRequestVerdict::Cancel
    }

    fn thread_added(&self, _id: ThreadId) {}
    fn thread_removed(&self, _id: ThreadId) {}
    fn server_added(&self, _server: &HostPort) {}
    fn server_removed(&self, _server: &HostPort) {}
    fn server_connection_added(&self, _server: &HostPort) {}
    fn server_connection_removed(&self, _server: &HostPort) {}
    fn thread_connection_added(&self, _thread: ThreadId) {}
    fn thread_connection_removed(&self, _thread: ThreadId) {}
    fn connection_request_added(&self, _connection: ConnectionId) {}
    fn connection_request_removed(&self, _connection: ConnectionId) {}
    fn server_request_added(&self, _server: &HostPort) {}
    fn server_request_removed(&self, _server: &HostPort) {}
    fn request_constructing(&self) {}
    fn request_destroying(&self) {}

    fn report_error(&self, severity: Severity, description: &str) {
        match severity {
            Severity::Info => tracing::info!(description),
            Severity::Warning => tracing::warn!(description),
            Severity::Error => tracing::error!(description),
            Severity::Critical => tracing::error!(critical = true, description),
        }
    }
}

/// A policy that always opens a fresh connection and thread, closes
/// idle connections immediately, and cancels on any failure. A
/// reasonable default for callers that don't need reuse tuning.
#[derive(Debug, Default)]
pub struct SimplePolicy;

impl PoolPolicy for SimplePolicy {}
