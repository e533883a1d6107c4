// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A sharded socket-readiness reactor: fixed `P = 8` independent
//! partitions, each backed by an `mio::Poll`, so registration and
//! dispatch never contend on a single global lock.

mod error;
mod handler;
mod job;
mod shard;

pub use error::Error;
pub use handler::Handler;

use std::sync::Arc;
use uxcommons_active_object::{
    ActiveObject, ActiveObjectCallback, ActiveObjectCommonImpl, Error as AoError,
};

use job::ReactorJob;
use shard::Shard;

/// Fixed shard count, chosen as a power of two.
pub const SHARD_COUNT: usize = 8;

/// Multiplexes readiness across `SHARD_COUNT` shards using a pool of
/// worker threads that alternate between a select role (blocking in a
/// shard's `mio::Poll`) and a dispatcher role (draining the global
/// ready queue).
pub struct Reactor {
    engine: Arc<ActiveObjectCommonImpl<ReactorJob>>,
    workers: usize,
}

impl Reactor {
    /// # Errors
    /// Propagates any OS error from creating the underlying `mio::Poll`
    /// instances and their wakers.
    pub fn new(
        workers: usize,
        callback: Option<Arc<dyn ActiveObjectCallback>>,
    ) -> Result<Self, Error> {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for id in 0..SHARD_COUNT {
            shards.push(Arc::new(Shard::new(id)?));
        }
        let job = Arc::new(ReactorJob::new(shards, workers));
        let engine =
            ActiveObjectCommonImpl::new(job, workers, callback).map_err(Error::Lifecycle)?;
        Ok(Self {
            engine: Arc::new(engine),
            workers,
        })
    }

    /// Registers `handler` for readiness on the shard `key % SHARD_COUNT`.
    pub fn register(&self, key: usize, handler: Arc<dyn Handler>) -> Result<(), Error> {
        self.engine.job().register(key, handler)?;
        Ok(())
    }

    pub fn remove(&self, key: usize) -> Result<(), Error> {
        self.engine.job().remove(key)?;
        Ok(())
    }

    /// Builds a waker that, when woken, surfaces through this reactor's
    /// normal dispatch path for the handler later registered at `key`
    /// (see [`Reactor::register`]). Used by callers that need a
    /// cross-thread signal channel (e.g. a work queue) delivered on one
    /// of this reactor's own dispatcher threads instead of running a
    /// separate one.
    pub fn make_waker(&self, key: usize) -> Result<Arc<mio::Waker>, Error> {
        Ok(self.engine.job().make_waker(key)?)
    }
}

impl ActiveObject for Reactor {
    fn activate(&self) -> Result<(), AoError> {
        self.engine.activate_with(self.workers)
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
    use mio::net::{TcpListener, TcpStream};
    use mio::{Interest, Registry, Token};
    use std::io::{Read, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct EchoHandler {
        stream: StdMutex<TcpStream>,
        reads: Arc<AtomicUsize>,
    }

    impl Handler for EchoHandler {
        fn register(&self, registry: &Registry, token: Token) -> std::io::Result<()> {
            registry.register(
                &mut *self.stream.lock().unwrap(),
                token,
                Interest::READABLE,
            )
        }
        fn reregister(&self, registry: &Registry, token: Token) -> std::io::Result<()> {
            registry.reregister(
                &mut *self.stream.lock().unwrap(),
                token,
                Interest::READABLE,
            )
        }
        fn deregister(&self, registry: &Registry) -> std::io::Result<()> {
            registry.deregister(&mut *self.stream.lock().unwrap())
        }
        fn handle_input(&self) -> std::io::Result<usize> {
            let mut buf = [0_u8; 256];
            let mut stream = self.stream.lock().unwrap();
            match stream.read(&mut buf) {
                Ok(0) => Ok(0),
                Ok(n) => {
                    self.reads.fetch_add(1, Ordering::SeqCst);
                    Ok(n)
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(1),
                Err(err) => Err(err),
            }
        }
    }

    #[test]
    fn registers_and_observes_readability() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = std::net::TcpStream::connect(addr).unwrap();

        let (accepted, _) = loop {
            match listener.accept() {
                Ok(pair) => break pair,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(err) => panic!("accept failed: {err}"),
            }
        };

        let reactor = Reactor::new(2, None).unwrap();
        reactor.activate().unwrap();

        let reads = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(EchoHandler {
            stream: StdMutex::new(accepted),
            reads: reads.clone(),
        });
        reactor.register(1, handler).unwrap();

        client.write_all(b"hello").unwrap();

        for _ in 0..100 {
            if reads.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(reads.load(Ordering::SeqCst) > 0);

        reactor.deactivate();
        reactor.wait();
    }
}
