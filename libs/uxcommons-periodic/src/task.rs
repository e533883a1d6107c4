// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// A recurring unit of work run by [`crate::PeriodicRunner`].
///
/// `forced` is `true` when the invocation was triggered by
/// `enforce_start_all` rather than the task's own period elapsing.
pub trait PeriodicTask: Send + Sync {
    fn run(&self, forced: bool);
}
