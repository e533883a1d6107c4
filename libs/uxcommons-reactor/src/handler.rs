// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use mio::{Registry, Token};
use std::io;

/// An fd-readiness consumer registered with a [`crate::Reactor`] shard.
///
/// Implementors own the actual `mio` I/O source (a `TcpStream`, a pipe
/// endpoint) behind their own interior mutability, since `mio::Poll`
/// only needs `&Registry` (not `&mut Poll`) to (re)register or
/// deregister a source.
pub trait Handler: Send + Sync {
    fn register(&self, registry: &Registry, token: Token) -> io::Result<()>;

    /// Re-arms interest after an edge-triggered readiness
    /// notification has been consumed.
    fn reregister(&self, registry: &Registry, token: Token) -> io::Result<()>;

    fn deregister(&self, registry: &Registry) -> io::Result<()>;

    /// Called from a dispatcher thread when the source became
    /// readable. `Ok(n)` with `n > 0` means more input may still be
    /// available and the handler should be re-armed; `Ok(0)` means the
    /// source is finished; `Err` deregisters the handler.
    fn handle_input(&self) -> io::Result<usize>;
}
