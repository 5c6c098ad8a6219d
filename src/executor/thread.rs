// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use crate::error::SubmitAfterStop;
use crate::executor::{Executor, Job};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle as ThreadJoinHandle, ThreadId};

struct Queue {
    jobs: VecDeque<Job>,
    stop: bool,
}

struct Inner {
    queue: Mutex<Queue>,
    cond: Condvar,
}

impl Inner {
    fn run(&self) {
        loop {
            let mut guard = self.queue.lock().unwrap();
            while !guard.stop && guard.jobs.is_empty() {
                guard = self.cond.wait(guard).unwrap();
            }

            while let Some(job) = guard.jobs.pop_front() {
                drop(guard);
                tracing::trace!("running queued job");
                job();
                guard = self.queue.lock().unwrap();
            }

            if guard.stop {
                tracing::debug!("executor worker thread stopping");
                break;
            }
        }
    }
}

/// A single-threaded executor that runs submitted jobs in FIFO order on one owned worker
/// thread.
///
/// Construction blocks until the worker thread is up and its [`ThreadId`] recorded, so
/// [`is_on_executor`](Executor::is_on_executor) is accurate the moment `new` returns.
pub struct ThreadExecutor {
    inner: Arc<Inner>,
    worker_id: ThreadId,
    worker: Mutex<Option<ThreadJoinHandle<()>>>,
}

impl ThreadExecutor {
    /// Spawn the worker thread and wait for it to report its thread id.
    ///
    /// # Panics
    ///
    /// Panics if the OS refuses to spawn the worker thread, or if it dies before reporting
    /// its id.
    #[must_use]
    pub fn new() -> Self {
        let inner = Arc::new(Inner {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                stop: false,
            }),
            cond: Condvar::new(),
        });

        let (tx, rx) = std::sync::mpsc::sync_channel::<ThreadId>(0);
        let worker_inner = inner.clone();
        let handle = thread::Builder::new()
            .name("thread-executor".into())
            .spawn(move || {
                tx.send(thread::current().id())
                    .expect("caller still waiting for worker thread id");
                worker_inner.run();
            })
            .expect("failed to spawn executor worker thread");

        let worker_id = rx.recv().expect("worker thread died before reporting its id");
        tracing::debug!(?worker_id, "executor worker thread started");

        Self {
            inner,
            worker_id,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// Stop accepting new work and join the worker thread.
    ///
    /// Jobs already queued are run to completion before the worker exits.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread itself panicked.
    pub fn join(&self) {
        {
            let mut guard = self.inner.queue.lock().unwrap();
            guard.stop = true;
            self.inner.cond.notify_all();
        }

        if let Some(handle) = self.worker.lock().unwrap().take() {
            handle.join().expect("executor worker thread panicked");
        }
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadExecutor {
    fn submit(&self, job: Job) -> Result<(), SubmitAfterStop> {
        let mut guard = self.inner.queue.lock().unwrap();
        if guard.stop {
            tracing::trace!("job submitted after executor stop");
            return Err(SubmitAfterStop(()));
        }
        guard.jobs.push_back(job);
        self.inner.cond.notify_all();
        tracing::trace!(queue_len = guard.jobs.len(), "job submitted");
        Ok(())
    }

    fn is_on_executor(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}
