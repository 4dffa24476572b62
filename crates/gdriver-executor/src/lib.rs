//! # gdriver-executor — The Dispatch Loop
//!
//! The dispatcher runs on the thread that called `run()`. After the host
//! phase it executes this loop:
//!
//! ```text
//! loop {
//!     1. Stop signal raised?            → leave, nothing new is pulled
//!     2. source.next_item()             → None? leave (drain follows)
//!     3. process callback (this thread) → Drop?    count dropped
//!                                       → Fail?    record, count failed
//!                                       → Forward? step 4
//!     4. pool.dispatch(item)            → blocks until a worker is idle
//! }
//! ```
//!
//! Only this thread touches the work source and the process callback, so
//! neither needs a lock. Draining and joining the pool is the caller's
//! job; this crate never owns the pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use gdriver_core::error::DriverResult;
use gdriver_core::loader::LoadedModule;
use gdriver_core::pool::WorkerPool;
use gdriver_core::report::RunCounters;
use gdriver_core::source::WorkSource;
use gdriver_module::registry::{HandlerModule, ProcessOutcome};

/// Configuration for the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Log progress every N pulled items. 0 disables progress logging.
    pub progress_interval: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            progress_interval: 100_000,
        }
    }
}

/// What the dispatch loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Items pulled from the source.
    pub pulled: u64,
    /// Items handed to the pool.
    pub forwarded: u64,
    /// The loop left because of the stop signal, not end of work.
    pub stopped_early: bool,
}

/// Run the host callback if the module binds one.
///
/// Called before the first item is pulled. A failure aborts the run.
pub fn run_host_phase<M: LoadedModule>(module: &HandlerModule<M>) -> DriverResult<()> {
    let started = Instant::now();
    if module.run_host()? {
        tracing::info!(
            host = module.host_name().unwrap_or_default(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "host phase complete"
        );
    } else {
        tracing::debug!(module = %module.path().display(), "no host callback bound, skipping host phase");
    }
    Ok(())
}

/// The dispatch loop, generic over the work source, loaded module and pool.
///
/// Returns when the source is exhausted or `stop` is raised. Per-item
/// failures are recorded in `counters`; only a pool that can no longer
/// accept work is an error.
pub fn dispatcher_loop<S, M, P>(
    source: &mut S,
    module: &HandlerModule<M>,
    pool: &P,
    counters: &RunCounters,
    config: &DispatcherConfig,
    stop: &AtomicBool,
) -> DriverResult<DispatchSummary>
where
    S: WorkSource + ?Sized,
    M: LoadedModule,
    P: WorkerPool,
{
    let mut summary = DispatchSummary::default();

    loop {
        // ── Step 1: Stop signal ──
        if stop.load(Ordering::Acquire) {
            summary.stopped_early = true;
            tracing::info!(pulled = summary.pulled, "stop requested, no further dispatch");
            break;
        }

        // ── Step 2: Pull ──
        let Some(item) = source.next_item() else {
            tracing::debug!(pulled = summary.pulled, "work source exhausted");
            break;
        };
        counters.record_received();
        summary.pulled += 1;

        // ── Step 3: Process phase ──
        match module.process(item) {
            Ok(ProcessOutcome::Forward(item)) => {
                // ── Step 4: Hand-off ──
                pool.dispatch(item)?;
                summary.forwarded += 1;
            }
            Ok(ProcessOutcome::Drop) => counters.record_dropped(),
            Err(e) => {
                tracing::debug!(item = %e.item(), error = %e, "process callback failed");
                counters.record_failure(e);
            }
        }

        if config.progress_interval > 0 && summary.pulled % config.progress_interval == 0 {
            tracing::info!(
                pulled = summary.pulled,
                forwarded = summary.forwarded,
                in_flight = pool.in_flight(),
                "dispatch progress"
            );
        }
    }

    Ok(summary)
}
