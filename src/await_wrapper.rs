// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Bridging an arbitrary future onto a specific [`Executor`](crate::Executor).
//!
//! A task's own future is always driven by the executor it was spawned on — that's what
//! [`spawn`](crate::spawn) arranges. But a future built some other way (an external
//! library's future, or a resource that must only ever be touched from one particular
//! thread) carries no such guarantee: whoever happens to be polling it keeps polling it.
//! [`on_executor`] makes that guarantee explicit.

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use crate::context::ExecutionContext;
use crate::current;
use crate::task::JoinHandle;
use crate::task::spawn;

enum Phase<F: Future> {
    Inline(F),
    Spawned(JoinHandle<F::Output>),
    Transitioning,
}

/// Future returned by [`on_executor`] / [`OnExecutorExt::on_own_executor`].
///
/// While the calling task happens to already be running on the target executor, `F` is
/// polled in place with no extra indirection. The moment that stops being true — because
/// whatever is driving this future lives on a different executor — `F` is spawned as a real
/// task on the target executor instead, and this future just waits on its `JoinHandle`.
pub struct AwaitWrapper<F: Future> {
    ctx: ExecutionContext,
    phase: Phase<F>,
}

impl<F> Future for AwaitWrapper<F>
where
    F: Future + Unpin + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let this = self.get_mut();

        if matches!(this.phase, Phase::Inline(_)) && !this.ctx.is_current() {
            let Phase::Inline(future) = core::mem::replace(&mut this.phase, Phase::Transitioning)
            else {
                unreachable!()
            };
            let handle = spawn(this.ctx, future).unwrap_or_else(|err| {
                panic!("on_executor: failed to hand the future to its target executor: {err}")
            });
            this.phase = Phase::Spawned(handle);
        }

        match &mut this.phase {
            Phase::Inline(future) => Pin::new(future).poll(cx),
            Phase::Spawned(handle) => Pin::new(handle).poll(cx),
            Phase::Transitioning => unreachable!("left in the transient state"),
        }
    }
}

/// Wrap `future` so that it always ends up polled on `ctx`'s executor, regardless of which
/// executor is doing the polling right now.
pub fn on_executor<F>(ctx: ExecutionContext, future: F) -> AwaitWrapper<F>
where
    F: Future + Unpin + Send + 'static,
    F::Output: Send + 'static,
{
    AwaitWrapper {
        ctx,
        phase: Phase::Inline(future),
    }
}

/// Extension trait adding [`on_own_executor`](OnExecutorExt::on_own_executor) to any future.
pub trait OnExecutorExt: Future + Sized {
    /// Bridge this future onto whichever executor is currently polling the calling task.
    ///
    /// # Panics
    ///
    /// Panics if called while not being driven from inside a task spawned by this crate —
    /// there is no "current executor" to bridge onto otherwise.
    fn on_own_executor(self) -> AwaitWrapper<Self>
    where
        Self: Unpin + Send + 'static,
        Self::Output: Send + 'static,
    {
        let ctx = current::get()
            .expect("on_own_executor called while not running inside a spawned task");
        on_executor(ctx, self)
    }
}

impl<F: Future> OnExecutorExt for F {}
