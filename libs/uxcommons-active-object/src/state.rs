// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

/// The three-value ActiveObject lifecycle. Transitions are monotone:
/// `NotActive -> Active -> Deactivating -> NotActive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveObjectState {
    NotActive,
    Active,
    Deactivating,
}
