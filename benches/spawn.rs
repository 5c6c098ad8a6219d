// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![feature(allocator_api)]

use std::alloc::Global;

use criterion::{Criterion, criterion_group, criterion_main};
use taskrt::{ExecutionContext, ThreadExecutor, spawn, spawn_with_stack};

fn spawn_join_global_allocator(c: &mut Criterion) {
    let executor: &'static ThreadExecutor = Box::leak(Box::new(ThreadExecutor::new()));
    let ctx = ExecutionContext::new(executor, &Global);

    c.bench_function("spawn_join/global_allocator", |b| {
        b.iter(|| {
            let handle = spawn(ctx, async { 1 + 1 }).unwrap();
            criterion::black_box(handle.wait());
        });
    });
}

fn spawn_join_stack_arena(c: &mut Criterion) {
    let executor: &'static ThreadExecutor = Box::leak(Box::new(ThreadExecutor::new()));

    c.bench_function("spawn_join/stack_arena", |b| {
        b.iter(|| {
            let handle = spawn_with_stack(executor, 4096, async { 1 + 1 }).unwrap();
            criterion::black_box(handle.wait());
        });
    });
}

criterion_group!(benches, spawn_join_global_allocator, spawn_join_stack_arena);
criterion_main!(benches);
