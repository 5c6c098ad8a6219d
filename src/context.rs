// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The pair of references every spawned task carries: where it runs, and where its frame
//! lives.

use core::alloc::Allocator;

use crate::executor::Executor;

/// The executor a task runs on, and the allocator its frame was carved out of.
///
/// Cheap to copy: both fields are references. A `Promise` stores its `ExecutionContext` so
/// that, on completion, it knows which executor to re-post a waiting continuation onto and
/// which allocator to eventually return its frame to.
///
/// The allocator is required to be `Sync` (on top of `Allocator`) so that `ExecutionContext`
/// itself stays `Send`: it gets captured into the `Job` closures (`Box<dyn FnOnce() + Send>`)
/// that cross from the spawning thread onto an executor's worker thread.
#[derive(Clone, Copy)]
pub struct ExecutionContext {
    executor: &'static dyn Executor,
    allocator: &'static (dyn Allocator + Sync),
}

impl ExecutionContext {
    /// Pair an executor with the allocator tasks spawned in this context should use.
    #[must_use]
    pub const fn new(
        executor: &'static dyn Executor,
        allocator: &'static (dyn Allocator + Sync),
    ) -> Self {
        Self { executor, allocator }
    }

    #[must_use]
    pub fn executor(&self) -> &'static dyn Executor {
        self.executor
    }

    #[must_use]
    pub fn allocator(&self) -> &'static (dyn Allocator + Sync) {
        self.allocator
    }

    /// `true` iff the calling thread is this context's executor's own worker thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.executor.is_on_executor()
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(
            core::ptr::from_ref(self.executor).cast::<()>(),
            core::ptr::from_ref(other.executor).cast::<()>(),
        )
    }
}
