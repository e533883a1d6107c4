// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use mio::{Poll, Registry, Token, Waker};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::handler::Handler;

/// The waker's token is carved out of the top of the `Token` space so
/// it can never collide with an fd-derived token.
pub(crate) fn waker_token(shard_id: usize) -> Token {
    Token(usize::MAX - shard_id)
}

pub(crate) struct ShardData {
    pub(crate) handlers: HashMap<Token, Arc<dyn Handler>>,
}

/// One of the reactor's `P` independent partitions. An fd-derived key
/// `k` is always handled by shard `k mod P`.
pub(crate) struct Shard {
    pub(crate) id: usize,
    /// Held only while a thread is inside the blocking `poll` call;
    /// other threads `try_lock` it to decide whether they "win" this
    /// shard's select role for this iteration.
    pub(crate) poll: Mutex<Poll>,
    pub(crate) registry: Registry,
    /// Handler bookkeeping, independent of the `poll` lock so
    /// registration can proceed while another thread is blocked
    /// inside `poll.poll(..)`.
    pub(crate) data: Mutex<ShardData>,
    pub(crate) waker: Waker,
    pub(crate) waker_token: Token,
}

impl Shard {
    pub(crate) fn new(id: usize) -> std::io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker_token = waker_token(id);
        let waker = Waker::new(&registry, waker_token)?;
        Ok(Self {
            id,
            poll: Mutex::new(poll),
            registry,
            data: Mutex::new(ShardData {
                handlers: HashMap::new(),
            }),
            waker,
            waker_token,
        })
    }
}
