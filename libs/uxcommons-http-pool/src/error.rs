// Copyright 2025. Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use thiserror::Error;
use uxcommons_active_object::Error as AoError;
use uxcommons_periodic::Error as PeriodicError;
use uxcommons_reactor::Error as ReactorError;
use uxcommons_task_runner::Error as TaskRunnerError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled on shutdown")]
    CancelledOnShutdown,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reactor(#[from] ReactorError),
    #[error(transparent)]
    TaskRunner(#[from] TaskRunnerError),
    #[error(transparent)]
    Periodic(#[from] PeriodicError),
    #[error(transparent)]
    Lifecycle(#[from] AoError),
}
