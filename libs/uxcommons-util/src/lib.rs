// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Small primitives shared by the `uxcommons-*` runtime crates: a
//! counting semaphore built on `Mutex`+`Condvar`, a generic
//! block-recycling buffer pool, and a counting sentinel for
//! "wait until every outstanding unit of work has finished" shutdown
//! protocols.

mod block_pool;
mod informer;
mod semaphore;

pub use block_pool::BlockPool;
pub use informer::Informer;
pub use semaphore::{Semaphore, TryAcquireError};
