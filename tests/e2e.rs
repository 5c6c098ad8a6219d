// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![feature(allocator_api)]

use std::alloc::Global;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskrt::{ExecutionContext, Executor, ThreadExecutor, call, on_executor, spawn, spawn_with_stack};

fn leak_executor() -> &'static dyn Executor {
    Box::leak(Box::new(ThreadExecutor::new()))
}

/// E1: spawn a plain async block, join its value.
#[test]
fn simple_value_roundtrip() {
    let executor = leak_executor();
    let ctx = ExecutionContext::new(executor, &Global);

    let handle = spawn(ctx, async { 1 + 1 }).unwrap();
    assert_eq!(handle.wait(), 2);
}

/// E2: a task that spawns a nested task on the same executor and awaits it before
/// producing its own result — the "test calls test2, baton lets the caller observe the
/// sum" scenario the original demo was built around.
#[test]
fn nested_spawn_sums_with_parent() {
    let executor = leak_executor();
    let ctx = ExecutionContext::new(executor, &Global);

    async fn test2(ctx: ExecutionContext, x: u32) -> u32 {
        let inner = spawn(ctx, async move { x + 1 }).unwrap();
        inner.await
    }

    let x = 42u32;
    let handle = spawn(ctx, async move {
        let nested = test2(ctx, x).await;
        nested + 23
    })
    .unwrap();

    assert_eq!(handle.wait(), 66);
}

/// E3: a stack-arena-backed task runs, completes, and its arena is torn down with it —
/// creating and joining several in a row must not leak or double free.
#[test]
fn spawn_with_stack_runs_to_completion() {
    let executor = leak_executor();

    for i in 0..8u32 {
        let handle = spawn_with_stack(executor, 4096, async move { i * i }).unwrap();
        assert_eq!(handle.wait(), i * i);
    }
}

/// E4: an arena too small for the task's frame fails to spawn with `SpawnError::Alloc`
/// rather than panicking or corrupting state.
#[test]
fn arena_exhaustion_surfaces_as_alloc_error() {
    let executor = leak_executor();

    // A future capturing a large buffer won't fit in a one-byte arena.
    let big = [0u8; 4096];
    let err = spawn_with_stack(executor, 1, async move {
        core::hint::black_box(&big);
    });
    assert!(matches!(err, Err(taskrt::SpawnError::Alloc)));
}

/// E5: dropping a `JoinHandle` before the task completes detaches it — the task keeps
/// running and its result is silently discarded.
#[test]
fn early_detach_lets_task_run_to_completion() {
    let executor = leak_executor();
    let ctx = ExecutionContext::new(executor, &Global);

    let ran = Arc::new(AtomicU32::new(0));
    let ran_clone = ran.clone();

    let handle = spawn(ctx, async move {
        std::thread::sleep(Duration::from_millis(20));
        ran_clone.store(1, Ordering::Release);
    })
    .unwrap();

    drop(handle);

    // Give the detached task time to actually finish.
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(ran.load(Ordering::Acquire), 1);
}

/// E6: bridging a plain oneshot receiver onto a specific executor via `on_executor` drives
/// it to completion regardless of which thread produced the value.
#[test]
fn on_executor_bridges_external_future() {
    let executor = leak_executor();
    let ctx = ExecutionContext::new(executor, &Global);

    let (tx, rx) = taskrt::sync::oneshot::channel::<u32>();

    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        tx.send(5);
    });

    let handle = spawn(ctx, async move {
        let value = on_executor(ctx, rx).await;
        value.unwrap() * 2
    })
    .unwrap();

    assert_eq!(handle.wait(), 10);
}

/// `call(future).await` materializes and inline-starts `future` the moment it is awaited,
/// usable as a single expression inside another task's body — no `ExecutionContext` passed
/// explicitly, it is read off whichever executor is currently driving the awaiting task.
#[test]
fn call_runs_inline_as_a_single_awaited_expression() {
    init_tracing();
    let executor = leak_executor();
    let ctx = ExecutionContext::new(executor, &Global);

    let x = 19u32;
    let handle = spawn(ctx, async move { call(async move { x + 1 }).await }).unwrap();
    assert_eq!(handle.wait(), 20);
}

/// `Task::start_inline` runs the first poll synchronously, so an already-ready future yields
/// its result without ever touching the executor's queue.
#[test]
fn start_inline_resolves_immediately_ready_futures_without_a_repost() {
    init_tracing();
    let executor = leak_executor();
    let ctx = ExecutionContext::new(executor, &Global);

    let task = taskrt::Task::new(ctx, async { 100 });
    let handle = task.start_inline().unwrap();
    assert!(handle.is_ready());
    assert_eq!(handle.wait(), 100);
}

/// `ThreadExecutor::is_on_executor` reports `false` from the thread that spawned it and
/// `true` from its own worker thread.
#[test]
fn is_on_executor_true_only_from_worker_thread() {
    init_tracing();
    let executor: &'static ThreadExecutor = Box::leak(Box::new(ThreadExecutor::new()));
    assert!(!executor.is_on_executor());

    let (tx, rx) = std::sync::mpsc::channel();
    executor
        .submit(Box::new(move || {
            let _ = tx.send(executor.is_on_executor());
        }))
        .unwrap();
    assert!(rx.recv().unwrap());
}

/// A task whose future panics surfaces that panic through `JoinHandle::wait()` rather than
/// poisoning the executor — later tasks on the same executor still run normally.
#[test]
fn panicking_task_surfaces_through_wait() {
    init_tracing();
    let executor = leak_executor();
    let ctx = ExecutionContext::new(executor, &Global);

    let handle = spawn(ctx, async {
        panic!("boom");
    })
    .unwrap();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handle.wait()));
    assert!(result.is_err());

    let handle = spawn(ctx, async { 1 + 1 }).unwrap();
    assert_eq!(handle.wait(), 2);
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
