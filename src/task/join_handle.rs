// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! [`JoinHandle<T>`], the consumer side of a spawned task.

use core::future::Future;
use core::pin::Pin;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};
use core::task::{Context, Poll, Waker};
use std::sync::Arc;
use std::task::Wake;
use std::thread::{self, Thread};

use crate::task::promise::{Outcome, Promise};
use crate::task::state::{Detached, Registered};

#[derive(PartialEq, Eq, Clone, Copy)]
enum Phase {
    NotRegistered,
    Registered,
    Done,
}

/// A handle to a spawned task's eventual result.
///
/// `JoinHandle<T>` implements [`Future<Output = T>`], so it can be `.await`ed from another
/// task. Dropping a `JoinHandle` before it completes detaches the task: the task keeps
/// running to completion, and its result (or panic) is discarded silently when it finishes.
///
/// Polling a `JoinHandle` after it has yielded `Ready` is a programmer error.
pub struct JoinHandle<T> {
    ptr: NonNull<Promise<T>>,
    phase: Phase,
}

// Safety: a `Promise<T>` is internally synchronized (see its own `unsafe impl Send + Sync`);
// a `JoinHandle<T>` only ever accesses it through that synchronized surface.
unsafe impl<T: Send> Send for JoinHandle<T> {}

impl<T> JoinHandle<T> {
    pub(crate) fn new(ptr: NonNull<Promise<T>>) -> Self {
        Self {
            ptr,
            phase: Phase::NotRegistered,
        }
    }

    /// `true` if the task has finished and its result is ready to be taken.
    ///
    /// Never blocks, never registers a waiter; safe to call at any point in this handle's
    /// lifetime, including after it has already yielded its result through `.await`/`wait`
    /// (in which case it simply keeps returning `true`).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self.phase {
            Phase::Done => true,
            // Safety: `self.ptr` is valid for the whole lifetime of this handle.
            _ => unsafe { Promise::state(self.ptr) }.is_complete(),
        }
    }

    /// Non-blocking take: returns the result if the task has already finished, otherwise
    /// hands the handle back unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the handle has already yielded its result through `.await` or `wait`.
    pub fn try_take(mut self) -> Result<T, Self> {
        assert!(
            self.phase != Phase::Done,
            "JoinHandle::try_take called after the task's result was already taken"
        );
        assert!(
            self.phase == Phase::NotRegistered,
            "JoinHandle::try_take called after this handle was already polled as a future"
        );

        // Safety: `self.ptr` is valid; no registration has happened on this handle yet, so
        // reading `is_complete` commits to nothing.
        if unsafe { Promise::state(self.ptr) }.is_complete() {
            self.phase = Phase::Done;
            // Safety: state observed complete; we are this task's sole consumer and have
            // not taken the outcome before.
            let outcome = unsafe { Promise::take_outcome(self.ptr) };
            // Safety: the producer is done touching this frame once it reached
            // `HAS_RESULT`; we are the last party with a reference to it.
            unsafe { Promise::drop_frame(self.ptr) };
            core::mem::forget(self);
            match outcome {
                Outcome::Value(value) => Ok(value),
                Outcome::Panic(payload) => std::panic::resume_unwind(payload),
            }
        } else {
            Err(self)
        }
    }

    /// Block the calling thread until the task completes and return its result.
    ///
    /// # Panics
    ///
    /// Panics if this handle has already been polled as a future or already yielded its
    /// result. In debug builds, also panics (rather than deadlocking) if called from within
    /// the task's own executor thread while the task is still pending: that thread is the
    /// only one that could ever poll the task to completion, so blocking it here would wait
    /// forever.
    pub fn wait(self) -> T {
        match self.try_take() {
            Ok(value) => return value,
            Err(handle) => Self::wait_registered(handle),
        }
    }

    fn wait_registered(mut self) -> T {
        let parker = Arc::new(ThreadParker::new());
        let waker = Waker::from(parker.clone());
        // Safety: sole consumer, not yet registered.
        unsafe { Promise::set_waker(self.ptr, waker) };
        // Safety: `self.ptr` is valid for this handle's lifetime.
        match unsafe { Promise::state(self.ptr) }.register_awaiter() {
            Registered::Pending => {
                self.phase = Phase::Registered;
                // Safety: `self.ptr` is valid for this handle's lifetime.
                debug_assert!(
                    !unsafe { Promise::context(self.ptr) }.is_current(),
                    "JoinHandle::wait called from the task's own executor thread would deadlock"
                );
                parker.park();
            }
            Registered::AlreadyComplete => {}
        }
        self.phase = Phase::Done;
        // Safety: state is now known complete (either we observed `AlreadyComplete`, or
        // the parker only unparks after `complete` ran and woke it).
        let outcome = unsafe { Promise::take_outcome(self.ptr) };
        // Safety: the producer will not touch this frame again once complete.
        unsafe { Promise::drop_frame(self.ptr) };
        core::mem::forget(self);
        match outcome {
            Outcome::Value(value) => value,
            Outcome::Panic(payload) => std::panic::resume_unwind(payload),
        }
    }
}

impl<T> Future for JoinHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        assert!(
            this.phase != Phase::Done,
            "JoinHandle polled after it already yielded Ready"
        );

        if this.phase == Phase::NotRegistered {
            // Safety: sole consumer, registering for the first time.
            unsafe { Promise::set_waker(this.ptr, cx.waker().clone()) };
            // Safety: `this.ptr` is valid for this handle's lifetime.
            match unsafe { Promise::state(this.ptr) }.register_awaiter() {
                Registered::Pending => {
                    this.phase = Phase::Registered;
                    return Poll::Pending;
                }
                Registered::AlreadyComplete => {}
            }
        }

        this.phase = Phase::Done;
        // Safety: reached only once registration observed completion (either
        // immediately, or via the wake that follows the `HAS_AWAITER -> HAS_RESULT`
        // transition).
        let outcome = unsafe { Promise::take_outcome(this.ptr) };
        // Safety: the producer will not touch this frame again once complete.
        unsafe { Promise::drop_frame(this.ptr) };
        match outcome {
            Outcome::Value(value) => Poll::Ready(value),
            Outcome::Panic(payload) => std::panic::resume_unwind(payload),
        }
    }
}

impl<T> Drop for JoinHandle<T> {
    fn drop(&mut self) {
        if self.phase == Phase::Done {
            return;
        }

        // Safety: `self.ptr` is valid; this handle has not registered as an awaiter (if it
        // had, `phase` would be `Registered`, handled below).
        if self.phase == Phase::NotRegistered {
            tracing::trace!(task = ?self.ptr, "join handle dropped, detaching task");
            match unsafe { Promise::state(self.ptr) }.detach() {
                Detached::NotYetComplete => {
                    // The task now owns cleanup; nothing further to do here.
                }
                Detached::AlreadyComplete => {
                    // Safety: state observed complete and we never took the outcome.
                    drop(unsafe { Promise::take_outcome(self.ptr) });
                    // Safety: the producer will not touch this frame again.
                    unsafe { Promise::drop_frame(self.ptr) };
                }
            }
            return;
        }

        // `Registered`: a waker from an earlier poll is already installed. Reinstalling a
        // new one here would race the producer's `take_waker` the instant it observes
        // completion — `Promise::set_waker`'s own contract only allows a single write,
        // before `register_awaiter`, not a second one after. Instead, convert the
        // registration straight back into a detach: the producer then takes the
        // `CleanupSelf` branch on completion, which never touches the waker slot, so there
        // is nothing to race.
        tracing::trace!(task = ?self.ptr, "join handle dropped after registration, detaching task");
        match unsafe { Promise::state(self.ptr) }.cancel_registration() {
            Detached::NotYetComplete => {
                // The task now owns cleanup; nothing further to do here.
            }
            Detached::AlreadyComplete => {
                // Safety: state observed complete and we never took the outcome.
                drop(unsafe { Promise::take_outcome(self.ptr) });
                // Safety: the producer will not touch this frame again.
                unsafe { Promise::drop_frame(self.ptr) };
            }
        }
    }
}

struct ThreadParker {
    thread: Thread,
    unparked: AtomicBool,
}

impl ThreadParker {
    fn new() -> Self {
        Self {
            thread: thread::current(),
            unparked: AtomicBool::new(false),
        }
    }

    fn park(&self) {
        while !self.unparked.swap(false, Ordering::Acquire) {
            thread::park();
        }
    }
}

impl Wake for ThreadParker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.unparked.store(true, Ordering::Release);
        self.thread.unpark();
    }
}
