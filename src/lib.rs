// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A minimal cooperative async task runtime.
//!
//! This crate provides the plumbing between a task's suspension/resumption lifecycle
//! (`Promise`/`JoinHandle`), the [`Executor`] that runs work, and the [`Allocator`] that
//! owns a task's frame. It does not provide a multi-threaded or work-stealing scheduler,
//! cancellation, timers, or I/O — see the module docs below for what each piece owns.
#![feature(allocator_api)]

pub mod arena;
pub mod context;
pub mod error;
pub mod executor;
pub mod sync;
pub mod task;

mod await_wrapper;
mod current;

pub use arena::{ArenaHandle, StackArena};
pub use await_wrapper::{AwaitWrapper, OnExecutorExt, on_executor};
pub use context::ExecutionContext;
pub use error::{SpawnError, SubmitAfterStop};
pub use executor::{Executor, Job, ThreadExecutor};
pub use task::{CallableTask, JoinHandle, Task, call, spawn, spawn_with_stack};

pub use core::alloc::Allocator;
