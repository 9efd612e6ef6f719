//! Crate-wide error type.
//!
//! Every fallible operation in `uthread` returns `Result<T, Error>`. There
//! is no errno, no nested error-kind hierarchy — the set of ways a call can
//! legitimately fail on the host is small enough to enumerate directly.

use std::fmt;

/// Things that can go wrong when driving the scheduler.
#[derive(Debug)]
pub enum Error {
    /// An API was called before [`crate::run`] bootstrapped the scheduler.
    NotRunning,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotRunning => write!(f, "scheduler is not running (call uthread::run first)"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
