// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Tracks which [`ExecutionContext`] is currently polling a task on this thread.
//!
//! Rust's `Future::poll` has no equivalent of a coroutine's implicit access to its own
//! enclosing promise, so a task being polled has no way to ask "what context am I running
//! in?" except by consulting state the poll-driver sets up around the call. This is that
//! state.

use core::cell::Cell;

use crate::context::ExecutionContext;

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<ExecutionContext>> = const { Cell::new(None) };
}

/// Run `f` with `ctx` recorded as the context currently polling on this thread, restoring
/// whatever was recorded before on the way out (poll calls nest when one task's future
/// awaits another spawned on the same executor and drives it inline).
pub(crate) fn enter<R>(ctx: ExecutionContext, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_CONTEXT.replace(Some(ctx));
    let _restore = RestoreOnDrop(previous);
    f()
}

struct RestoreOnDrop(Option<ExecutionContext>);

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        CURRENT_CONTEXT.set(self.0);
    }
}

/// The context currently polling a task on this thread, if any.
pub(crate) fn get() -> Option<ExecutionContext> {
    CURRENT_CONTEXT.get()
}
