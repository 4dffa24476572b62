//! `FixedPool` — default `WorkerPool` implementation.
//!
//! Spawns N OS threads at creation. The dispatcher hands items over a
//! zero-capacity crossbeam channel: `send` completes only when an idle
//! worker is blocked in `recv`, so the hand-off itself is the backpressure
//! and no more than N items are ever in flight. Items are taken in send
//! order; completion order is whatever the workers make of it.
//!
//! No dynamic scaling. Workers block, they never poll. Draining drops the
//! sender, which lets every worker fall out of `recv` after its current
//! item, and joins them all.
//!
//! A panicking executor fails only the item it was running: the panic is
//! caught, recorded as `ItemError::Panicked`, and the worker goes idle again.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use gdriver_core::constants::MAX_WORKERS;
use gdriver_core::error::{DriverResult, ItemError, ResourceError};
use gdriver_core::item::WorkItem;
use gdriver_core::pool::{ItemExecutor, WorkerPool};
use gdriver_core::report::RunCounters;

pub struct FixedPool {
    /// Hand-off channel. `None` once the pool is draining.
    tx: Option<Sender<WorkItem>>,
    counters: Arc<RunCounters>,
    handles: Vec<(usize, JoinHandle<()>)>,
    total: usize,
}

impl FixedPool {
    /// Create a pool with `n` idle workers running `executor`.
    ///
    /// `n` is clamped to `1..=MAX_WORKERS`. If a spawn fails, the workers
    /// already started are joined before the error is returned.
    pub fn new<E: ItemExecutor>(
        n: usize,
        executor: Arc<E>,
        counters: Arc<RunCounters>,
    ) -> Result<Self, ResourceError> {
        let n = n.clamp(1, MAX_WORKERS);
        let (tx, rx) = crossbeam_channel::bounded::<WorkItem>(0);

        let mut pool = FixedPool {
            tx: Some(tx),
            counters,
            handles: Vec::with_capacity(n),
            total: n,
        };

        for worker_id in 0..n {
            let rx = rx.clone();
            let executor = Arc::clone(&executor);
            let counters = Arc::clone(&pool.counters);
            let spawned = thread::Builder::new()
                .name(format!("gdriver-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, rx, executor, counters));
            match spawned {
                Ok(handle) => pool.handles.push((worker_id, handle)),
                Err(e) => {
                    if let Err(join) = pool.drain() {
                        tracing::error!(error = %join, "join after failed spawn");
                    }
                    return Err(ResourceError::WorkerSpawn {
                        index: worker_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(workers = n, "worker pool started");
        Ok(pool)
    }

    /// Default pool sizing: nproc/2, clamped to 2..=8.
    pub fn auto_size() -> usize {
        let cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus / 2).clamp(2, 8)
    }

    pub fn counters(&self) -> &Arc<RunCounters> {
        &self.counters
    }

    pub fn is_draining(&self) -> bool {
        self.tx.is_none()
    }
}

impl WorkerPool for FixedPool {
    fn dispatch(&self, item: WorkItem) -> DriverResult<()> {
        let tx = self.tx.as_ref().ok_or(ResourceError::PoolClosed)?;
        // Blocks until an idle worker takes the item. Fails only if every
        // worker has died.
        tx.send(item).map_err(|_| ResourceError::PoolClosed)?;
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.counters.in_flight()
    }

    fn size(&self) -> usize {
        self.total
    }

    fn live_workers(&self) -> usize {
        self.handles.iter().filter(|(_, h)| !h.is_finished()).count()
    }

    fn drain(&mut self) -> Result<(), ResourceError> {
        // Hang up: workers finish their current item, then recv() fails.
        self.tx.take();

        let mut first_err = None;
        let joined = self.handles.len();
        for (index, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!(worker = index, "worker panicked");
                first_err.get_or_insert(ResourceError::WorkerPanicked { index });
            }
        }
        if joined > 0 {
            tracing::debug!(workers = joined, "worker pool drained");
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for FixedPool {
    fn drop(&mut self) {
        // Workers are always joined, never detached.
        if let Err(e) = self.drain() {
            tracing::error!(error = %e, "worker pool drain on drop");
        }
    }
}

/// Worker thread main loop.
fn worker_loop<E: ItemExecutor>(
    worker_id: usize,
    rx: Receiver<WorkItem>,
    executor: Arc<E>,
    counters: Arc<RunCounters>,
) {
    let mut executed = 0u64;
    // Blocks while idle; ends once the dispatcher hangs up.
    while let Ok(item) = rx.recv() {
        counters.begin_execution();
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(&item)))
            .unwrap_or_else(|payload| {
                Err(ItemError::Panicked {
                    item: item.id,
                    message: panic_message(payload.as_ref()),
                })
            });
        if let Err(e) = &outcome {
            tracing::debug!(worker = worker_id, item = %item.id, error = %e, "thread callback failed");
        }
        counters.end_execution(outcome, started.elapsed());
        executed += 1;
    }
    tracing::trace!(worker = worker_id, executed, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
