// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

#![feature(allocator_api)]

use std::alloc::Global;
use std::future::Future;
use std::pin::Pin;

use criterion::{Criterion, criterion_group, criterion_main};
use taskrt::{ExecutionContext, ThreadExecutor, spawn};

/// Spawns a fresh task for every hop, so each `.await` along the chain forces a real
/// re-post through the executor's queue rather than resolving immediately in place —
/// the worst case `JoinHandle` polling has to handle.
fn chain(ctx: ExecutionContext, depth: u32) -> Pin<Box<dyn Future<Output = u32> + Send>> {
    Box::pin(async move {
        if depth == 0 {
            0
        } else {
            let next = spawn(ctx, chain(ctx, depth - 1)).unwrap();
            next.await + 1
        }
    })
}

fn ping_pong_chain(c: &mut Criterion) {
    let executor: &'static ThreadExecutor = Box::leak(Box::new(ThreadExecutor::new()));
    let ctx = ExecutionContext::new(executor, &Global);

    c.bench_function("ping_pong/chain_depth_32", |b| {
        b.iter(|| {
            let handle = spawn(ctx, chain(ctx, 32)).unwrap();
            criterion::black_box(handle.wait());
        });
    });
}

criterion_group!(benches, ping_pong_chain);
criterion_main!(benches);
