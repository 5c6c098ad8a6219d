// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error types returned from the public, recoverable entry points.
//!
//! Invariant violations (detaching a `JoinHandle` with a pending awaiter, deallocating an
//! arena frame out of LIFO order, mutating promise state off its owning executor) are not
//! represented here: those are programmer bugs and surface as `debug_assert!` panics, per
//! the error taxonomy this crate follows.

use core::alloc::AllocError;
use core::fmt;

/// An executor was submitted work after it had already been asked to stop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SubmitAfterStop(pub(crate) ());

impl fmt::Display for SubmitAfterStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("submitted work after the executor was stopped")
    }
}

impl core::error::Error for SubmitAfterStop {}

/// Failure modes of `spawn`/`spawn_with_stack`/`call`.
#[derive(Debug)]
pub enum SpawnError {
    /// The task's frame could not be allocated (the arena, or the global allocator, is
    /// exhausted).
    Alloc,
    /// The target executor has already been stopped.
    Closed,
}

impl From<AllocError> for SpawnError {
    fn from(_: AllocError) -> Self {
        Self::Alloc
    }
}

impl From<SubmitAfterStop> for SpawnError {
    fn from(_: SubmitAfterStop) -> Self {
        Self::Closed
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::Alloc => f.write_str("failed to allocate the task's frame"),
            SpawnError::Closed => f.write_str("executor was closed"),
        }
    }
}

impl core::error::Error for SpawnError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_after_stop_displays_and_is_a_std_error() {
        let err = SubmitAfterStop(());
        assert_eq!(err.to_string(), "submitted work after the executor was stopped");
        let _: &dyn core::error::Error = &err;
    }

    #[test]
    fn spawn_error_displays_and_is_a_std_error() {
        let err: SpawnError = AllocError.into();
        assert_eq!(err.to_string(), "failed to allocate the task's frame");
        let _: &dyn core::error::Error = &err;

        let err: SpawnError = SubmitAfterStop(()).into();
        assert_eq!(err.to_string(), "executor was closed");
        let _: &dyn core::error::Error = &err;
    }
}
