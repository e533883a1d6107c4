// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::sync::Mutex;

/// A mutex-guarded free-list that recycles fixed-shape buffers instead
/// of allocating and dropping them on every use.
///
/// Safe-Rust analogue of a block allocator: callers `take()` a value
/// (freshly built via `New` if the pool is empty) and `recycle()` it
/// back when done. `cached()` reports how many buffers are currently
/// parked in the free list.
pub struct BlockPool<T> {
    free: Mutex<Vec<T>>,
    make: Box<dyn Fn() -> T + Send + Sync>,
    reset: Box<dyn Fn(&mut T) + Send + Sync>,
}

impl<T> BlockPool<T> {
    pub fn new<M, R>(make: M, reset: R) -> Self
    where
        M: Fn() -> T + Send + Sync + 'static,
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        Self {
            free: Mutex::new(Vec::new()),
            make: Box::new(make),
            reset: Box::new(reset),
        }
    }

    /// Returns a recycled buffer, or a freshly constructed one if the
    /// free list is empty.
    pub fn take(&self) -> T {
        let mut free = self.free.lock().unwrap();
        free.pop().unwrap_or_else(|| (self.make)())
    }

    /// Resets `value` and parks it in the free list for a future
    /// `take()`.
    pub fn recycle(&self, mut value: T) {
        (self.reset)(&mut value);
        self.free.lock().unwrap().push(value);
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.free.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycles_buffers() {
        let pool: BlockPool<Vec<u8>> = BlockPool::new(|| Vec::with_capacity(64), |v| v.clear());
        let mut buf = pool.take();
        buf.extend_from_slice(b"hello");
        assert_eq!(pool.cached(), 0);
        pool.recycle(buf);
        assert_eq!(pool.cached(), 1);
        let buf2 = pool.take();
        assert!(buf2.is_empty());
        assert_eq!(pool.cached(), 0);
    }
}
