// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! An asynchronous, keep-alive-reusing HTTP/1.1 client pool.
//!
//! A small number of [`event_thread::EventThread`]s each own a private
//! [`uxcommons_reactor::Reactor`] and drive the [`connection::Connection`]s
//! assigned to them; [`server::Server`] groups connections by
//! destination and a [`policy::PoolPolicy`] governs reuse, closing, and
//! failure recovery. [`pool::HttpAsyncPool`] is the facade applications
//! use.

mod connection;
mod error;
mod event_thread;
mod pool;
mod policy;
mod request;
mod server;
mod signal_queue;
mod types;

pub use error::Error;
pub use policy::{CloseVerdict, PerRequestVerdict, PoolPolicy, ResendVerdict, SimplePolicy};
pub use pool::HttpAsyncPool;
pub use request::{Request, ResponseCallback, ResponseInfo};
pub use signal_queue::{SignalQueue, Signals};
pub use types::{ConnectionId, HostPort, Method, Severity, ThreadId};
pub use uxcommons_active_object::ActiveObject;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn spawn_echo_server(responses: usize) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        std::thread::spawn(move || {
            for _ in 0..responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0_u8; 4096];
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0);
                let body = b"ok";
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: keep-alive\r\n\r\n",
                    body.len()
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.write_all(body).unwrap();
            }
        });
        port
    }

    struct CollectingCallback {
        results: Arc<Mutex<Vec<Result<u16, String>>>>,
        done: Arc<AtomicUsize>,
    }

    impl ResponseCallback for CollectingCallback {
        fn on_response(&self, info: ResponseInfo) {
            self.results.lock().unwrap().push(Ok(info.status));
            self.done.fetch_add(1, Ordering::SeqCst);
        }
        fn on_error(&self, description: String, _info: Option<ResponseInfo>) {
            self.results.lock().unwrap().push(Err(description));
            self.done.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn get_request_round_trips_through_the_pool() {
        let port = spawn_echo_server(1);
        let pool = HttpAsyncPool::new(Arc::new(SimplePolicy), 1).unwrap();
        pool.activate().unwrap();

        let results = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicUsize::new(0));
        let callback = Arc::new(CollectingCallback {
            results: results.clone(),
            done: done.clone(),
        });

        pool.add_get_request(
            HostPort {
                host: "127.0.0.1".to_string(),
                port,
            },
            "/",
            callback,
        )
        .unwrap();

        for _ in 0..200 {
            if done.load(Ordering::SeqCst) >= 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(*results.lock().unwrap(), vec![Ok(200)]);
        pool.shutdown();
    }

    #[test]
    fn shutdown_fails_pending_requests_without_a_server() {
        let pool = HttpAsyncPool::new(Arc::new(SimplePolicy), 1).unwrap();
        pool.activate().unwrap();
        pool.shutdown();

        let results = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicUsize::new(0));
        let callback = Arc::new(CollectingCallback {
            results: results.clone(),
            done: done.clone(),
        });
        let err = pool.add_get_request(
            HostPort {
                host: "127.0.0.1".to_string(),
                port: 1,
            },
            "/",
            callback,
        );
        assert!(err.is_err());
        assert!(results.lock().unwrap().is_empty());
    }

    /// `wait()` must not return until every accepted request's terminal
    /// callback has actually run, even the ones that only get to run
    /// because `deactivate()` forced them to fail -- not merely until
    /// they've been scheduled on the task runner.
    #[test]
    fn wait_blocks_until_every_callback_has_fired() {
        let responses = 20;
        let port = spawn_echo_server(responses);
        let pool = HttpAsyncPool::new(Arc::new(SimplePolicy), 1).unwrap();
        pool.activate().unwrap();

        let results = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..responses {
            let callback = Arc::new(CollectingCallback {
                results: results.clone(),
                done: done.clone(),
            });
            pool.add_get_request(
                HostPort {
                    host: "127.0.0.1".to_string(),
                    port,
                },
                "/",
                callback,
            )
            .unwrap();
        }

        pool.deactivate();
        pool.wait();

        assert_eq!(done.load(Ordering::SeqCst), responses);
        assert_eq!(results.lock().unwrap().len(), responses);
    }
}
