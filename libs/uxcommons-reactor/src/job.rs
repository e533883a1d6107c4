// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use mio::{Events, Token};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{trace, warn};
use uxcommons_active_object::SingleJob;
use uxcommons_util::Semaphore;

use crate::handler::Handler;
use crate::shard::Shard;

const POLL_TIMEOUT: Duration = Duration::from_millis(200);

struct ReadyItem {
    shard: usize,
    token: Token,
    handler: Arc<dyn Handler>,
}

pub(crate) struct ReactorJob {
    pub(crate) shards: Vec<Arc<Shard>>,
    ready: Mutex<VecDeque<ReadyItem>>,
    ready_sem: Semaphore,
    terminating: AtomicBool,
    workers: usize,
}

impl ReactorJob {
    pub(crate) fn new(shards: Vec<Arc<Shard>>, workers: usize) -> Self {
        Self {
            shards,
            ready: Mutex::new(VecDeque::new()),
            ready_sem: Semaphore::new(0),
            terminating: AtomicBool::new(false),
            workers,
        }
    }

    pub(crate) fn register(&self, key: usize, handler: Arc<dyn Handler>) -> std::io::Result<()> {
        let shard = &self.shards[key % self.shards.len()];
        let token = Token(key);
        handler.register(&shard.registry, token)?;
        shard
            .data
            .lock()
            .unwrap()
            .handlers
            .insert(token, handler);
        let _ = shard.waker.wake();
        Ok(())
    }

    /// Builds a `mio::Waker` tied to shard `key % P`'s registry, at the
    /// same `Token` a later [`ReactorJob::register`] call for `key`
    /// would use. Lets a caller build a [`uxcommons_util`]-style signal
    /// channel whose wakeups flow through this reactor's normal
    /// ready-queue dispatch, rather than the shard's own internal
    /// waker (which is handled inline and never dispatched).
    pub(crate) fn make_waker(&self, key: usize) -> std::io::Result<Arc<mio::Waker>> {
        let shard = &self.shards[key % self.shards.len()];
        Ok(Arc::new(mio::Waker::new(&shard.registry, Token(key))?))
    }

    pub(crate) fn remove(&self, key: usize) -> std::io::Result<()> {
        let shard = &self.shards[key % self.shards.len()];
        let token = Token(key);
        let handler = shard.data.lock().unwrap().handlers.remove(&token);
        if let Some(handler) = handler {
            handler.deregister(&shard.registry)?;
        }
        Ok(())
    }

    fn poll_shard(&self, shard: &Arc<Shard>, poll: &mut mio::Poll) {
        let mut events = Events::with_capacity(256);
        if let Err(err) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if err.kind() != std::io::ErrorKind::Interrupted {
                warn!(shard = shard.id, error = %err, "shard poll failed");
            }
            return;
        }
        for event in &events {
            let token = event.token();
            if token == shard.waker_token {
                continue;
            }
            // edge-trigger: the handler must be explicitly re-armed by a
            // dispatcher before it is notified again.
            let handler = shard.data.lock().unwrap().handlers.get(&token).cloned();
            if let Some(handler) = handler {
                self.ready.lock().unwrap().push_back(ReadyItem {
                    shard: shard.id,
                    token,
                    handler,
                });
                self.ready_sem.release();
            }
        }
    }

    fn dispatch_one(&self) {
        self.ready_sem.acquire_timeout(POLL_TIMEOUT).ok();
        let item = self.ready.lock().unwrap().pop_front();
        let Some(item) = item else {
            return;
        };
        match item.handler.handle_input() {
            Ok(n) if n > 0 => {
                let shard = &self.shards[item.shard];
                if let Err(err) = item.handler.reregister(&shard.registry, item.token) {
                    warn!(error = %err, "failed to re-arm handler, dropping it");
                    self.remove_locked(shard, item.token);
                }
            }
            Ok(_) => {
                trace!("handler reported completion, removing");
                let shard = &self.shards[item.shard];
                self.remove_locked(shard, item.token);
            }
            Err(err) => {
                warn!(error = %err, "handler failed, removing");
                let shard = &self.shards[item.shard];
                self.remove_locked(shard, item.token);
            }
        }
    }

    fn remove_locked(&self, shard: &Arc<Shard>, token: Token) {
        let handler = shard.data.lock().unwrap().handlers.remove(&token);
        if let Some(handler) = handler {
            let _ = handler.deregister(&shard.registry);
        }
    }
}

impl SingleJob for ReactorJob {
    fn work(&self) {
        while !self.terminating.load(Ordering::Acquire) {
            let mut won = None;
            for shard in &self.shards {
                if let Ok(guard) = shard.poll.try_lock() {
                    won = Some((shard.clone(), guard));
                    break;
                }
            }
            match won {
                Some((shard, mut guard)) => self.poll_shard(&shard, &mut guard),
                None => self.dispatch_one(),
            }
        }
    }

    fn terminate(&self) {
        self.terminating.store(true, Ordering::Release);
        for shard in &self.shards {
            let _ = shard.waker.wake();
        }
        self.ready_sem.release_n(self.workers);
    }
}
