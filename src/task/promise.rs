// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! `Promise<T>` is the type-erased half of a task: everything a [`JoinHandle<T>`](
//! crate::JoinHandle) needs to know, with the concrete future type hidden behind a vtable.

use core::any::Any;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::NonNull;
use core::task::{Context, Poll, Waker};

use crate::context::ExecutionContext;
use crate::task::state::TaskState;

/// The value a task produced, or the panic payload it unwound with.
pub(crate) enum Outcome<T> {
    Value(T),
    Panic(Box<dyn Any + Send + 'static>),
}

/// Per-`F` function pointers that let code holding only a `Promise<T>` drive and eventually
/// drop the concrete `Frame<F>` behind it.
///
/// One `Vtable<T>` instance is generated per distinct future type `F` (see
/// [`super::frame::vtable_for`]), but because its two functions only ever take
/// `NonNull<Promise<T>>`, callers that only know `T` can use it without knowing `F`.
pub(crate) struct Vtable<T> {
    /// Poll the underlying future once. On completion this writes the [`Outcome`], runs the
    /// `TaskState` completion transition, and wakes or cleans up as that transition
    /// dictates — see [`super::frame::poll_frame`].
    pub(crate) poll: unsafe fn(NonNull<Promise<T>>, &mut Context<'_>) -> Poll<()>,
    /// Deallocate the frame (future already dropped) back through its `ExecutionContext`'s
    /// allocator.
    pub(crate) drop_frame: unsafe fn(NonNull<Promise<T>>),
}

#[repr(C)]
pub(crate) struct Promise<T> {
    pub(crate) state: TaskState,
    pub(crate) ctx: ExecutionContext,
    waker: UnsafeCell<Option<Waker>>,
    outcome: UnsafeCell<MaybeUninit<Outcome<T>>>,
    vtable: &'static Vtable<T>,
}

// Safety: a `Promise<T>` is only mutated through the narrow, ordering-documented methods
// below, each of which is only called from the side (producer or sole consumer) the
// `TaskState` handshake grants access to at that moment.
unsafe impl<T: Send> Send for Promise<T> {}
unsafe impl<T: Send> Sync for Promise<T> {}

impl<T> Promise<T> {
    pub(crate) fn new(ctx: ExecutionContext, vtable: &'static Vtable<T>) -> Self {
        Self {
            state: TaskState::new(),
            ctx,
            waker: UnsafeCell::new(None),
            outcome: UnsafeCell::new(MaybeUninit::uninit()),
            vtable,
        }
    }

    /// # Safety
    ///
    /// Must only be called from the thread that owns `this`'s execution (the executor
    /// currently driving the task), and never concurrently with another `poll`.
    pub(crate) unsafe fn poll(this: NonNull<Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Safety: forwarded from this function's own contract.
        unsafe { (this.as_ref().vtable.poll)(this, cx) }
    }

    /// # Safety
    ///
    /// Must only be called once, after the frame's future has already been dropped (i.e.
    /// after a `poll` returned `Ready`, or from a still-`Pending` frame being torn down by
    /// `CallableTask`/arena exhaustion cleanup before it was ever started).
    pub(crate) unsafe fn drop_frame(this: NonNull<Self>) {
        // Safety: forwarded from this function's own contract.
        unsafe { (this.as_ref().vtable.drop_frame)(this) }
    }

    /// Store the consumer's waker before racing to register as the awaiter.
    ///
    /// # Safety
    ///
    /// Must be called only by the sole `JoinHandle` for this task, and only before it calls
    /// `state.register_awaiter()` — the `AcqRel`/`Acquire` pair on that CAS is what makes
    /// this write visible to whichever side performs `complete`.
    pub(crate) unsafe fn set_waker(this: NonNull<Self>, waker: Waker) {
        // Safety: exclusive consumer-side access per this function's contract.
        unsafe {
            *this.as_ref().waker.get() = Some(waker);
        }
    }

    /// Take the waker stored by `set_waker`.
    ///
    /// # Safety
    ///
    /// Must only be called after `state.complete()` returned `WakeAwaiter` for this
    /// promise; the completing CAS's acquire is ordered after the registering CAS's
    /// release, so the write from `set_waker` is guaranteed visible here.
    pub(crate) unsafe fn take_waker(this: NonNull<Self>) -> Option<Waker> {
        // Safety: forwarded from this function's own contract.
        unsafe { (*this.as_ref().waker.get()).take() }
    }

    /// # Safety
    ///
    /// Must only be called once, by the producer, exactly when its future resolves.
    pub(crate) unsafe fn write_outcome(this: NonNull<Self>, outcome: Outcome<T>) {
        // Safety: forwarded from this function's own contract; no concurrent reader exists
        // until `state.complete()` publishes the result.
        unsafe {
            (*this.as_ref().outcome.get()).write(outcome);
        }
    }

    /// # Safety
    ///
    /// Must only be called once, by the consumer, after observing (via `TaskState`) that
    /// the result has been published.
    pub(crate) unsafe fn take_outcome(this: NonNull<Self>) -> Outcome<T> {
        // Safety: forwarded from this function's own contract.
        unsafe { (*this.as_ref().outcome.get()).assume_init_read() }
    }

    /// # Safety
    ///
    /// `this` must point at a live `Promise<T>`.
    pub(crate) unsafe fn context(this: NonNull<Self>) -> ExecutionContext {
        // Safety: `ExecutionContext` is `Copy` and never mutated after construction.
        unsafe { this.as_ref().ctx }
    }

    /// # Safety
    ///
    /// `this` must point at a live `Promise<T>` for the returned lifetime `'a`. `TaskState`
    /// is internally synchronized (plain atomics), so an arbitrary number of shared
    /// references may coexist safely.
    pub(crate) unsafe fn state<'a>(this: NonNull<Self>) -> &'a TaskState {
        // Safety: forwarded from this function's own contract.
        unsafe { &*core::ptr::addr_of!((*this.as_ptr()).state) }
    }
}
