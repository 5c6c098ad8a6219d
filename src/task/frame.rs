// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `Frame<F>` is the concrete, per-future-type allocation backing a spawned task. Its
//! vtable (see [`vtable_for`]) is the one place the concrete `F` still shows up once a task
//! has been handed out as a type-erased [`JoinHandle`](crate::JoinHandle).

use core::alloc::{Allocator, Layout};
use core::cell::UnsafeCell;
use core::future::Future;
use core::marker::PhantomData;
use core::pin::Pin;
use core::ptr::NonNull;
use core::task::{Context, Poll};
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::context::ExecutionContext;
use crate::task::promise::{Outcome, Promise, Vtable};
use crate::task::state::Completed;

#[repr(C)]
pub(crate) struct Frame<F: Future> {
    promise: Promise<F::Output>,
    future: UnsafeCell<Option<F>>,
}

impl<F: Future> Frame<F> {
    pub(crate) fn new(ctx: ExecutionContext, future: F) -> Self {
        // `promise_ptr`'s cast relies on `promise` sitting at offset 0; `#[repr(C)]` plus
        // field order guarantees this, but pin it down so a reordering doesn't silently
        // break the cast.
        static_assertions::const_assert_eq!(core::mem::offset_of!(Frame<F>, promise), 0);
        Self {
            promise: Promise::new(ctx, vtable_for::<F>()),
            future: UnsafeCell::new(Some(future)),
        }
    }

    pub(crate) fn promise_ptr(this: NonNull<Self>) -> NonNull<Promise<F::Output>> {
        this.cast()
    }
}

/// Fetch (and lazily const-promote) the single `Vtable<F::Output>` instance for this `F`.
pub(crate) fn vtable_for<F: Future + 'static>() -> &'static Vtable<F::Output>
where
    F::Output: 'static,
{
    struct Helper<F>(PhantomData<F>);

    impl<F: Future + 'static> Helper<F>
    where
        F::Output: 'static,
    {
        const VTABLE: Vtable<F::Output> = Vtable {
            poll: poll_frame::<F>,
            drop_frame: drop_frame::<F>,
        };
    }

    &Helper::<F>::VTABLE
}

/// Poll the frame's future once, driving the task-completion handshake through to
/// whichever side needs to act.
///
/// # Safety
///
/// `this` must point at a live `Promise<F::Output>` that is actually the first field of a
/// `Frame<F>`, and this function must not be called concurrently with another poll of the
/// same frame.
unsafe fn poll_frame<F: Future + 'static>(
    this: NonNull<Promise<F::Output>>,
    cx: &mut Context<'_>,
) -> Poll<()>
where
    F::Output: 'static,
{
    let frame = this.cast::<Frame<F>>();
    // Safety: `this` is the promise field of a live `Frame<F>`, this function is never
    // re-entered for the same frame, and the frame's address never changes once allocated.
    let future_cell = unsafe { &mut *frame.as_ref().future.get() };
    let future = future_cell
        .as_mut()
        .expect("poll_frame called after the frame's future already completed");
    // Safety: the frame's allocation is stable for its entire lifetime (owned through a
    // `NonNull` behind an `Allocator`, never moved), so pinning it is sound.
    let pinned = unsafe { Pin::new_unchecked(future) };

    tracing::trace!(task = ?this, "polling task");
    let poll_result = catch_unwind(AssertUnwindSafe(|| pinned.poll(cx)));

    let outcome = match poll_result {
        Ok(Poll::Pending) => {
            tracing::trace!(task = ?this, "task still pending");
            return Poll::Pending;
        }
        Ok(Poll::Ready(value)) => Outcome::Value(value),
        Err(panic) => Outcome::Panic(panic),
    };

    tracing::debug!(
        task = ?this,
        panicked = matches!(outcome, Outcome::Panic(_)),
        "task completed"
    );
    *future_cell = None;

    // Safety: this runs exactly once, right as the future resolves.
    unsafe { Promise::write_outcome(this, outcome) };

    // Safety: `this` lives at least as long as this call.
    let state = unsafe { Promise::state(this) };
    match state.complete() {
        Completed::NoAwaiter => {}
        Completed::WakeAwaiter => {
            // Safety: `complete` just returned `WakeAwaiter`, so a waker was registered
            // and its write happens-before this read.
            if let Some(waker) = unsafe { Promise::take_waker(this) } {
                waker.wake();
            }
        }
        Completed::CleanupSelf => {
            // Safety: `complete` just returned `CleanupSelf`; the outcome was just written
            // above and no consumer will ever read it.
            drop(unsafe { Promise::take_outcome(this) });
            // Safety: the future has already been dropped (set to `None` above) and the
            // outcome has just been taken; nothing referencing the frame remains.
            unsafe { Promise::drop_frame(this) };
        }
    }

    Poll::Ready(())
}

/// # Safety
///
/// `this` must point at a live `Promise<F::Output>` that is the first field of a `Frame<F>`
/// that is no longer being polled (either the future already completed and was dropped, or
/// it never started and is being torn down before its first poll).
unsafe fn drop_frame<F: Future>(this: NonNull<Promise<F::Output>>) {
    let frame = this.cast::<Frame<F>>();
    // Safety: forwarded from this function's own contract; `ctx` is `Copy` and read before
    // the frame itself is deallocated.
    let ctx = unsafe { Promise::context(this) };
    let layout = Layout::new::<Frame<F>>();
    // Safety: no remaining references to the frame exist once this function is invoked per
    // its contract.
    unsafe { core::ptr::drop_in_place(frame.as_ptr()) };
    // Safety: `frame` was allocated from `ctx.allocator()` with exactly this layout.
    unsafe { ctx.allocator().deallocate(frame.cast(), layout) };
}
