// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single-value, single-producer/single-consumer channel.
//!
//! This is the same `EMPTY`/`DETACHED`/`HAS_AWAITER`/`HAS_RESULT` handshake a task's
//! `Promise` uses, applied to a bare value instead of a future's return slot — handy for
//! handing a result back out of code that was never spawned as a task in the first place
//! (a callback, a different runtime's future bridged in through [`crate::on_executor`]).

use core::cell::UnsafeCell;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use std::sync::Arc;

use crate::task::state::{Completed, Detached, Registered, TaskState};

struct Inner<T> {
    state: TaskState,
    waker: UnsafeCell<Option<Waker>>,
    // `None` once read by `complete`'s winner; always `Some(Some(_))` on the happy path,
    // `Some(None)` if the sender dropped without sending.
    value: UnsafeCell<Option<Option<T>>>,
}

// Safety: access to `waker`/`value` is gated by `TaskState`'s handshake, which hands each
// side exclusive access to the cell it touches at any given moment.
unsafe impl<T: Send> Send for Inner<T> {}
unsafe impl<T: Send> Sync for Inner<T> {}

/// The sending half of a [`channel`].
///
/// Dropping a `Sender` without calling [`send`](Sender::send) disconnects the channel: the
/// receiver observes [`RecvError`] instead of hanging forever.
pub struct Sender<T> {
    inner: Arc<Inner<T>>,
    sent: bool,
}

/// The receiving half of a [`channel`].
///
/// Implements `Future<Output = Result<T, RecvError>>`; `.await` it, or call
/// [`recv`](Receiver::recv) to block the calling thread.
pub struct Receiver<T> {
    inner: Arc<Inner<T>>,
    done: bool,
}

/// The [`Sender`] was dropped without ever calling [`send`](Sender::send).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RecvError(());

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("sender dropped without sending a value")
    }
}

impl core::error::Error for RecvError {}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let inner = Arc::new(Inner {
        state: TaskState::new(),
        waker: UnsafeCell::new(None),
        value: UnsafeCell::new(None),
    });
    (
        Sender {
            inner: inner.clone(),
            sent: false,
        },
        Receiver {
            inner,
            done: false,
        },
    )
}

impl<T> Sender<T> {
    /// Send `value` to the receiver.
    pub fn send(mut self, value: T) {
        self.complete(Some(value));
    }

    fn complete(&mut self, value: Option<T>) {
        self.sent = true;
        // Safety: `Sender` is not `Clone`, and this runs at most once per instance (guarded
        // by `sent`).
        unsafe {
            *self.inner.value.get() = Some(value);
        }
        match self.inner.state.complete() {
            Completed::NoAwaiter => {}
            Completed::WakeAwaiter => {
                // Safety: `complete` just returned `WakeAwaiter`.
                let waker = unsafe { (*self.inner.waker.get()).take() };
                if let Some(waker) = waker {
                    waker.wake();
                }
            }
            Completed::CleanupSelf => {
                // Safety: the value was just written above and the receiver will never
                // read it.
                drop(unsafe { (*self.inner.value.get()).take() });
            }
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        if !self.sent {
            self.complete(None);
        }
    }
}

impl<T> Receiver<T> {
    /// Block the calling thread until a value arrives or the sender disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError`] if the [`Sender`] was dropped without sending.
    pub fn recv(mut self) -> Result<T, RecvError> {
        use std::task::Wake;
        use std::thread::{self, Thread};

        struct Parker {
            thread: Thread,
            unparked: core::sync::atomic::AtomicBool,
        }
        impl Wake for Parker {
            fn wake(self: Arc<Self>) {
                self.wake_by_ref();
            }
            fn wake_by_ref(self: &Arc<Self>) {
                self.unparked
                    .store(true, core::sync::atomic::Ordering::Release);
                self.thread.unpark();
            }
        }

        let parker = Arc::new(Parker {
            thread: thread::current(),
            unparked: core::sync::atomic::AtomicBool::new(false),
        });
        let waker = Waker::from(parker.clone());
        let mut cx = Context::from_waker(&waker);
        loop {
            match Pin::new(&mut self).poll(&mut cx) {
                Poll::Ready(result) => return result,
                Poll::Pending => {
                    while !parker
                        .unparked
                        .swap(false, core::sync::atomic::Ordering::Acquire)
                    {
                        thread::park();
                    }
                }
            }
        }
    }
}

impl<T> Future for Receiver<T> {
    type Output = Result<T, RecvError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.done, "Receiver polled after it already yielded Ready");

        // Safety: sole consumer.
        unsafe {
            *this.inner.waker.get() = Some(cx.waker().clone());
        }
        match this.inner.state.register_awaiter() {
            Registered::Pending => Poll::Pending,
            Registered::AlreadyComplete => {
                this.done = true;
                // Safety: state observed complete, we are the sole consumer.
                let value = unsafe { (*this.inner.value.get()).take() }.flatten();
                Poll::Ready(value.ok_or(RecvError(())))
            }
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        match self.inner.state.detach() {
            Detached::NotYetComplete => {}
            Detached::AlreadyComplete => {
                // Safety: state observed complete and this value was never taken.
                drop(unsafe { (*self.inner.value.get()).take() });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_recv() {
        let (tx, rx) = channel::<u32>();
        tx.send(42);
        assert_eq!(rx.recv().unwrap(), 42);
    }

    #[test]
    fn recv_blocks_for_send_from_another_thread() {
        let (tx, rx) = channel::<u32>();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tx.send(7);
        });
        assert_eq!(rx.recv().unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn dropped_sender_disconnects_receiver() {
        let (tx, rx) = channel::<u32>();
        drop(tx);
        assert_eq!(rx.recv(), Err(RecvError(())));
    }

    #[test]
    fn dropped_receiver_is_silently_ignored_by_send() {
        let (tx, rx) = channel::<u32>();
        drop(rx);
        tx.send(9);
    }
}
