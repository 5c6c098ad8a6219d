// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Spawning and driving tasks to completion.

mod frame;
mod join_handle;
mod promise;
pub(crate) mod state;

pub use join_handle::JoinHandle;

use core::alloc::Allocator;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::sync::Arc;
use std::task::Wake;

use crate::arena::StackArena;
use crate::context::ExecutionContext;
use crate::current;
use crate::error::SpawnError;
use crate::executor::Executor;
use crate::task::frame::Frame;
use crate::task::promise::Promise;

/// A future that has been paired with an [`ExecutionContext`] but not yet started.
///
/// Building a `Task` is cheap and allocates nothing; the frame is only carved out of the
/// context's allocator once [`start`](Task::start) or [`start_inline`](Task::start_inline)
/// runs. This mirrors constructing a coroutine handle before its first resumption: the
/// future's captures (by value, or by reference if `future` itself only borrows its
/// arguments) are settled here, execution begins later.
pub struct Task<F> {
    ctx: ExecutionContext,
    future: F,
}

impl<F> Task<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    /// Pair `future` with the context it will run in, without starting it.
    pub fn new(ctx: ExecutionContext, future: F) -> Self {
        Self { ctx, future }
    }

    /// Allocate the task's frame and submit its first poll to the executor.
    ///
    /// Returns as soon as the frame exists; the task's first poll happens asynchronously.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::Alloc`] if the context's allocator cannot provide a frame, or
    /// [`SpawnError::Closed`] if the context's executor has already stopped.
    pub fn start(self) -> Result<JoinHandle<F::Output>, SpawnError> {
        let (ptr, ctx) = self.materialize()?;
        tracing::trace!(task = ?ptr, "task spawned");
        submit_poll(ctx, ptr)?;
        Ok(JoinHandle::new(ptr))
    }

    /// Allocate the task's frame and poll it once, synchronously, on the calling thread,
    /// before returning.
    ///
    /// This is an optimization over [`start`](Task::start) for callers that are already
    /// running on the task's own executor thread (or don't care which thread runs the
    /// first poll): it avoids one round trip through the executor's queue. If the future is
    /// still pending after this first poll, subsequent polls are driven the same way as for
    /// a task started with `start`.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::Alloc`] if the context's allocator cannot provide a frame.
    /// Unlike `start`, a stopped executor does not prevent this first, inline poll; it only
    /// prevents any later re-poll the future's own waker might request.
    pub fn start_inline(self) -> Result<JoinHandle<F::Output>, SpawnError> {
        let (ptr, ctx) = self.materialize()?;
        tracing::trace!(task = ?ptr, "task spawned inline");
        poll_once(ctx, ptr);
        Ok(JoinHandle::new(ptr))
    }

    fn materialize(self) -> Result<(core::ptr::NonNull<Promise<F::Output>>, ExecutionContext), SpawnError> {
        let allocator = self.ctx.allocator();
        let layout = core::alloc::Layout::new::<Frame<F>>();
        let raw = allocator.allocate(layout)?.cast::<Frame<F>>();
        // Safety: `raw` was just allocated with exactly `Frame<F>`'s layout and is
        // uninitialized; we fully initialize it before anyone else can observe it.
        unsafe {
            raw.as_ptr().write(Frame::new(self.ctx, self.future));
        }
        Ok((Frame::promise_ptr(raw), self.ctx))
    }
}

/// Spawn `future` onto `ctx`'s executor using the global allocator (or whichever allocator
/// `ctx` carries), returning a handle to its eventual result.
///
/// # Errors
///
/// See [`Task::start`].
pub fn spawn<F>(ctx: ExecutionContext, future: F) -> Result<JoinHandle<F::Output>, SpawnError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Task::new(ctx, future).start()
}

/// Spawn `future` onto `executor`, backed by a freshly created [`StackArena`] of `stack_size`
/// bytes rather than the global allocator.
///
/// The arena is destroyed automatically once the task's frame (and everything allocated out
/// of the arena while the future ran) has been released — callers never free it explicitly.
///
/// # Errors
///
/// See [`Task::start`].
///
/// # Panics
///
/// Panics if `stack_size` cannot back a valid [`core::alloc::Layout`] or the backing
/// allocation fails; see [`StackArena::create`].
pub fn spawn_with_stack<F>(
    executor: &'static dyn Executor,
    stack_size: usize,
    future: F,
) -> Result<JoinHandle<F::Output>, SpawnError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let arena = StackArena::create(stack_size);
    let allocator: &'static (dyn Allocator + Sync) = Box::leak(Box::new(arena));
    let ctx = ExecutionContext::new(executor, allocator);
    spawn(ctx, future)
}

/// A future built by [`call`]: awaiting it materializes the wrapped future into a task frame
/// and starts it inline on whichever executor is currently driving the awaiting task, the
/// same way `co_await call(f, args...)` resumes its callee synchronously inside the caller's
/// own coroutine frame.
///
/// `call(f, args...).await` is therefore a single expression usable anywhere inside a task
/// body: the wrapped future runs to completion (or its first suspension) as soon as it is
/// awaited, without the caller ever naming an [`ExecutionContext`] — that context is read off
/// [`current::get`] the moment this future is first polled.
pub struct CallableTask<F: Future> {
    phase: CallPhase<F>,
}

enum CallPhase<F: Future> {
    Pending(F),
    Started(JoinHandle<F::Output>),
    Transitioning,
}

/// Build a deferred task out of `future`, usable as `call(future).await` inside a task body.
///
/// Unlike [`spawn`], `call` never takes an [`ExecutionContext`] — the one driving the task
/// that awaits the result is used instead, materializing and `start_inline`-ing `future` the
/// instant it is polled.
pub fn call<F>(future: F) -> CallableTask<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    CallableTask {
        phase: CallPhase::Pending(future),
    }
}

impl<F> Future for CallableTask<F>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    type Output = F::Output;

    /// # Panics
    ///
    /// Panics if polled while not running inside a task spawned by this crate (there is no
    /// current [`ExecutionContext`] to materialize the wrapped future onto), or if the frame
    /// allocation fails on the first poll (see [`Task::start_inline`]).
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        // Safety: `CallableTask` never hands out a `Pin<&mut F>` for its wrapped future
        // before relocating it into a task frame below, so moving it out of the `Pending`
        // variant here does not violate any pinning guarantee already established for it —
        // the same "moved once, pinned at its final address" discipline `Frame::new` itself
        // relies on. This lets `call` accept futures that aren't `Unpin`, same as `spawn`.
        let this = unsafe { self.get_unchecked_mut() };

        if matches!(this.phase, CallPhase::Pending(_)) {
            let CallPhase::Pending(future) = core::mem::replace(&mut this.phase, CallPhase::Transitioning)
            else {
                unreachable!()
            };
            let ctx = current::get()
                .expect("call(...) awaited while not running inside a spawned task");
            let handle = Task::new(ctx, future)
                .start_inline()
                .unwrap_or_else(|err| panic!("call(...): failed to materialize task frame: {err}"));
            this.phase = CallPhase::Started(handle);
        }

        match &mut this.phase {
            CallPhase::Pending(_) => unreachable!(),
            CallPhase::Started(handle) => Pin::new(handle).poll(cx),
            CallPhase::Transitioning => unreachable!("left in the transient state"),
        }
    }
}

fn poll_once<T: Send + 'static>(ctx: ExecutionContext, ptr: core::ptr::NonNull<Promise<T>>) {
    let waker = Waker::from(Arc::new(Repost { ctx, ptr }));
    let mut cx = Context::from_waker(&waker);
    // Safety: this is the frame's first poll, called exactly once, before the frame is
    // reachable from any other thread.
    current::enter(ctx, || {
        let _ = unsafe { Promise::poll(ptr, &mut cx) };
    });
}

fn submit_poll<T: Send + 'static>(
    ctx: ExecutionContext,
    ptr: core::ptr::NonNull<Promise<T>>,
) -> Result<(), SpawnError> {
    let job_ctx = ctx;
    let job_ptr = ptr;
    ctx.executor()
        .submit(Box::new(move || poll_once(job_ctx, job_ptr)))?;
    Ok(())
}

/// A [`Waker`] that, when woken, re-submits this frame's next poll onto its own executor.
///
/// This is the one waker every task frame is polled with: whether the wake originates from
/// the future's own internal machinery or from completion of something it's awaiting, the
/// result is always the same — a `Job` goes back on the owning executor's queue. There is
/// deliberately no "am I already on that executor, so let me just poll inline" shortcut
/// here; see [`crate::on_executor`] for where that shortcut belongs instead.
struct Repost<T> {
    ctx: ExecutionContext,
    ptr: core::ptr::NonNull<Promise<T>>,
}

// Safety: `ExecutionContext` is `Copy`/`Send`; the `NonNull<Promise<T>>` is only ever acted
// on through `Promise`'s own synchronized surface.
unsafe impl<T: Send> Send for Repost<T> {}
unsafe impl<T: Send> Sync for Repost<T> {}

impl<T: Send + 'static> Wake for Repost<T> {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let ctx = self.ctx;
        let ptr = self.ptr;
        let this = self.clone();
        // A `submit` failure here means the executor already stopped; the frame (and
        // whatever it's still awaiting) is simply never polled again, matching how a
        // stopped executor drops its queued jobs.
        let _ = ctx.executor().submit(Box::new(move || {
            let waker = Waker::from(this);
            let mut cx = Context::from_waker(&waker);
            // Safety: exactly one executor drives this frame, and jobs on one executor's
            // queue run one at a time.
            current::enter(ctx, || {
                let _ = unsafe { Promise::poll(ptr, &mut cx) };
            });
        }));
    }
}
