// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The four-state handshake between a task's producer side (the running future) and its
//! consumer side (the [`JoinHandle`](crate::JoinHandle)).
//!
//! ```text
//!            register_awaiter           complete
//!   EMPTY ───────────────────▶ HAS_AWAITER ───────▶ HAS_RESULT
//!     │                                                 ▲
//!     │ detach                                          │
//!     ▼                                                 │
//!  DETACHED ────────────────────────────────────────────┘
//!                            complete
//! ```
//!
//! Exactly one of `register_awaiter`/`detach` may win the race out of `EMPTY`; exactly one
//! `complete` call ever happens. Completion uses release ordering so that whichever side
//! observes the `HAS_RESULT` transition also observes every write the producer made to the
//! result slot before it; registration/detach use acquire so a `complete` that raced ahead
//! is never missed.

use core::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const DETACHED: u8 = 1;
const HAS_AWAITER: u8 = 2;
const HAS_RESULT: u8 = 3;

pub(crate) struct TaskState(AtomicU8);

/// What the consumer should do after calling [`TaskState::register_awaiter`].
pub(crate) enum Registered {
    /// No result yet; the producer will wake this task's waker on completion.
    Pending,
    /// The producer finished before the consumer registered; the result is ready now.
    AlreadyComplete,
}

/// What the consumer should do after calling [`TaskState::detach`].
pub(crate) enum Detached {
    /// The producer has not completed yet; it now owns cleanup of the frame.
    NotYetComplete,
    /// The producer already finished; the caller must drop the result itself.
    AlreadyComplete,
}

/// What the producer should do after calling [`TaskState::complete`].
pub(crate) enum Completed {
    /// No one was waiting; nothing further to do.
    NoAwaiter,
    /// A registered awaiter must be woken.
    WakeAwaiter,
    /// The handle was dropped first; the producer owns cleaning up the frame.
    CleanupSelf,
}

impl TaskState {
    pub(crate) const fn new() -> Self {
        Self(AtomicU8::new(EMPTY))
    }

    /// Attempt to register this task's consumer as the (sole) awaiter.
    ///
    /// Must only be called once per task; calling it twice is a programmer error.
    pub(crate) fn register_awaiter(&self) -> Registered {
        match self
            .0
            .compare_exchange(EMPTY, HAS_AWAITER, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Registered::Pending,
            Err(HAS_RESULT) => Registered::AlreadyComplete,
            Err(other) => unreachable!("register_awaiter observed invalid state {other}"),
        }
    }

    /// Detach the consumer side: the `JoinHandle` was dropped without ever observing
    /// completion.
    pub(crate) fn detach(&self) -> Detached {
        match self
            .0
            .compare_exchange(EMPTY, DETACHED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Detached::NotYetComplete,
            Err(HAS_RESULT) => Detached::AlreadyComplete,
            Err(other) => unreachable!("detach observed invalid state {other}"),
        }
    }

    /// Detach the consumer side after it already registered a waker (i.e. was polled at
    /// least once as a `Future` and returned `Pending`) — used when a `JoinHandle` is
    /// dropped in that state instead of being awaited to completion.
    ///
    /// This never touches the waker slot itself: converting straight back to `DETACHED`
    /// means the producer's `complete()` takes the `CleanupSelf` branch, which never calls
    /// `take_waker`, so there is no race with a second write to that slot.
    pub(crate) fn cancel_registration(&self) -> Detached {
        match self
            .0
            .compare_exchange(HAS_AWAITER, DETACHED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Detached::NotYetComplete,
            Err(HAS_RESULT) => Detached::AlreadyComplete,
            Err(other) => unreachable!("cancel_registration observed invalid state {other}"),
        }
    }

    /// Non-committing peek: `true` once `complete` has run. Since `HAS_RESULT` is terminal,
    /// observing it here is safe without any further synchronization — the state will
    /// never change again.
    pub(crate) fn is_complete(&self) -> bool {
        self.0.load(Ordering::Acquire) == HAS_RESULT
    }

    /// Mark the task complete. Must be called at most once.
    pub(crate) fn complete(&self) -> Completed {
        loop {
            let current = self.0.load(Ordering::Acquire);
            let result = match current {
                EMPTY => self
                    .0
                    .compare_exchange(EMPTY, HAS_RESULT, Ordering::AcqRel, Ordering::Acquire)
                    .map(|_| Completed::NoAwaiter),
                HAS_AWAITER => self
                    .0
                    .compare_exchange(HAS_AWAITER, HAS_RESULT, Ordering::AcqRel, Ordering::Acquire)
                    .map(|_| Completed::WakeAwaiter),
                DETACHED => self
                    .0
                    .compare_exchange(DETACHED, HAS_RESULT, Ordering::AcqRel, Ordering::Acquire)
                    .map(|_| Completed::CleanupSelf),
                HAS_RESULT => unreachable!("complete called more than once"),
                other => unreachable!("complete observed invalid state {other}"),
            };
            match result {
                Ok(outcome) => return outcome,
                Err(_) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_completes_before_consumer_registers() {
        let state = TaskState::new();
        assert!(matches!(state.complete(), Completed::NoAwaiter));
        assert!(matches!(
            state.register_awaiter(),
            Registered::AlreadyComplete
        ));
    }

    #[test]
    fn consumer_registers_before_producer_completes() {
        let state = TaskState::new();
        assert!(matches!(state.register_awaiter(), Registered::Pending));
        assert!(matches!(state.complete(), Completed::WakeAwaiter));
    }

    #[test]
    fn consumer_detaches_before_producer_completes() {
        let state = TaskState::new();
        assert!(matches!(state.detach(), Detached::NotYetComplete));
        assert!(matches!(state.complete(), Completed::CleanupSelf));
    }

    #[test]
    fn producer_completes_before_consumer_detaches() {
        let state = TaskState::new();
        assert!(matches!(state.complete(), Completed::NoAwaiter));
        assert!(matches!(state.detach(), Detached::AlreadyComplete));
    }

    #[test]
    #[should_panic(expected = "complete called more than once")]
    fn double_complete_panics() {
        let state = TaskState::new();
        state.complete();
        state.complete();
    }

    #[test]
    fn consumer_cancels_registration_before_producer_completes() {
        let state = TaskState::new();
        assert!(matches!(state.register_awaiter(), Registered::Pending));
        assert!(matches!(
            state.cancel_registration(),
            Detached::NotYetComplete
        ));
        assert!(matches!(state.complete(), Completed::CleanupSelf));
    }

    #[test]
    fn producer_completes_before_consumer_cancels_registration() {
        let state = TaskState::new();
        assert!(matches!(state.register_awaiter(), Registered::Pending));
        assert!(matches!(state.complete(), Completed::WakeAwaiter));
        assert!(matches!(
            state.cancel_registration(),
            Detached::AlreadyComplete
        ));
    }
}
