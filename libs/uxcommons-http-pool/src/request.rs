// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::policy::PoolPolicy;
use crate::types::{HostPort, Method};
use std::sync::Arc;
use uxcommons_task_runner::TaskRunner;
use uxcommons_util::Informer;

/// An HTTP response, fully buffered (chunked transfer-encoding is out
/// of scope, matching the wire behavior this pool supports).
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The user-facing completion hooks for a [`Request`].
///
/// Every accepted request receives exactly one terminal callback:
/// `on_response` or `on_error`. The `quick_*` variants are invoked
/// synchronously, on whichever thread is delivering the result, on the
/// rare path where handing the response to the task runner itself
/// fails (a full task queue, or the runner shutting down); their
/// default implementations simply forward to the non-quick variants,
/// which is safe as long as callbacks stay cheap.
pub trait ResponseCallback: Send + Sync {
    fn on_response(&self, info: ResponseInfo);
    fn on_error(&self, description: String, info: Option<ResponseInfo>);

    fn quick_on_response(&self, info: ResponseInfo) {
        self.on_response(info);
    }
    fn quick_on_error(&self, description: String, info: Option<ResponseInfo>) {
        self.on_error(description, info);
    }
}

/// An HTTP request, immutable after construction except for the
/// late-bound response fields filled in as it completes.
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub host_port: HostPort,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub callback: Arc<dyn ResponseCallback>,
    pub(crate) lifecycle: Option<RequestLifecycle>,
}

/// Marks a [`Request`] "alive" in the pool's [`Informer`] for as long
/// as it exists, and fires the `request_constructing`/
/// `request_destroying` policy hooks at the matching points. Attached
/// once a request is accepted by [`crate::HttpAsyncPool::add_request`]
/// and dropped only once its terminal callback has actually run, so
/// `HttpAsyncPool::wait()` can block on the informer reaching zero.
pub(crate) struct RequestLifecycle {
    informer: Arc<Informer>,
    policy: Arc<dyn PoolPolicy>,
}

impl RequestLifecycle {
    pub(crate) fn new(informer: Arc<Informer>, policy: Arc<dyn PoolPolicy>) -> Self {
        policy.request_constructing();
        informer.mark();
        Self { informer, policy }
    }
}

impl Drop for RequestLifecycle {
    fn drop(&mut self) {
        self.policy.request_destroying();
        self.informer.release();
    }
}

impl Request {
    #[must_use]
    pub fn get(host_port: HostPort, uri: impl Into<String>, callback: Arc<dyn ResponseCallback>) -> Self {
        Self {
            method: Method::Get,
            uri: uri.into(),
            host_port,
            headers: Vec::new(),
            body: None,
            callback,
            lifecycle: None,
        }
    }

    #[must_use]
    pub fn post(
        host_port: HostPort,
        uri: impl Into<String>,
        body: Vec<u8>,
        callback: Arc<dyn ResponseCallback>,
    ) -> Self {
        Self {
            method: Method::Post,
            uri: uri.into(),
            host_port,
            headers: Vec::new(),
            body: Some(body),
            callback,
            lifecycle: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Renders the HTTP/1.1 request line + headers + body as wire
    /// bytes. `Host` and `Connection: keep-alive` are always
    /// synthesized; `Content-Length` is derived from the body.
    #[must_use]
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.method.as_str().as_bytes());
        out.extend_from_slice(b" ");
        out.extend_from_slice(self.uri.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");
        out.extend_from_slice(format!("Host: {}\r\n", self.host_port.host).as_bytes());
        out.extend_from_slice(b"Connection: keep-alive\r\n");
        for (name, value) in &self.headers {
            out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        if let Some(body) = &self.body {
            out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        if let Some(body) = &self.body {
            out.extend_from_slice(body);
        }
        out
    }
}

/// Hands `request` a successful response through `task_runner`, so
/// `on_response` runs off whatever thread is completing the transfer.
/// If the runner can't accept the task (queue full, shut down), falls
/// back to `quick_on_response` on the calling thread per
/// [`ResponseCallback`]'s contract. Either way `request` is consumed
/// here, releasing its [`RequestLifecycle`] only once the callback has
/// actually run.
pub(crate) fn deliver_response(task_runner: &TaskRunner, request: Request, info: ResponseInfo) {
    let fallback_callback = request.callback.clone();
    let fallback_info = info.clone();
    let enqueued = task_runner.enqueue_fn(None, move || {
        request.callback.on_response(info);
    });
    if enqueued.is_err() {
        fallback_callback.quick_on_response(fallback_info);
    }
}

/// Same as [`deliver_response`] for the error path.
pub(crate) fn deliver_error(task_runner: &TaskRunner, request: Request, description: String) {
    let fallback_callback = request.callback.clone();
    let fallback_description = description.clone();
    let enqueued = task_runner.enqueue_fn(None, move || {
        request.callback.on_error(description, None);
    });
    if enqueued.is_err() {
        fallback_callback.quick_on_error(fallback_description, None);
    }
}
