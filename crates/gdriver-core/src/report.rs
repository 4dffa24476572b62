//! Run counters and the final run report.
//!
//! Workers and the dispatch thread update [`RunCounters`] with atomics; the
//! per-item failure log is a lock-free queue. The controller turns the
//! counters into a [`RunReport`] after every worker has been joined, so the
//! report is never torn.

use core::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_queue::SegQueue;

use crate::error::{ItemError, Phase};

#[derive(Debug, Default)]
pub struct RunCounters {
    received: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    process_failed: AtomicU64,
    execution_failed: AtomicU64,
    busy_nanos: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    failures: SegQueue<ItemError>,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// An item was pulled from the work source.
    #[inline]
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// The process callback asked to drop an item.
    #[inline]
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a per-item failure in either phase.
    pub fn record_failure(&self, err: ItemError) {
        match err.phase() {
            Phase::Process => self.process_failed.fetch_add(1, Ordering::Relaxed),
            Phase::Thread => self.execution_failed.fetch_add(1, Ordering::Relaxed),
        };
        self.failures.push(err);
    }

    /// A worker picked up an item.
    pub fn begin_execution(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
    }

    /// A worker finished an item.
    pub fn end_execution(&self, outcome: Result<(), ItemError>, busy: Duration) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.busy_nanos
            .fetch_add(busy.as_nanos().min(u64::MAX as u128) as u64, Ordering::Relaxed);
        match outcome {
            Ok(()) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => self.record_failure(e),
        }
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[inline]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    #[inline]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Build the report, moving the failure log out of the counters.
    ///
    /// Call once, after the pool has been drained.
    pub fn take_report(&self, elapsed: Duration, workers: usize) -> RunReport {
        let mut failures = Vec::with_capacity(self.failures.len());
        while let Some(e) = self.failures.pop() {
            failures.push(e);
        }
        failures.sort_by_key(|e| e.item());

        let process_failed = self.process_failed.load(Ordering::Acquire);
        let execution_failed = self.execution_failed.load(Ordering::Acquire);
        RunReport {
            received: self.received.load(Ordering::Acquire),
            processed: self.processed.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            failed: process_failed + execution_failed,
            process_failed,
            execution_failed,
            elapsed,
            busy: Duration::from_nanos(self.busy_nanos.load(Ordering::Acquire)),
            peak_in_flight: self.peak_in_flight(),
            workers,
            failures,
        }
    }
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Items pulled from the work source.
    pub received: u64,
    /// Items whose thread callback succeeded.
    pub processed: u64,
    /// Items the process callback dropped.
    pub dropped: u64,
    /// `process_failed + execution_failed`.
    pub failed: u64,
    pub process_failed: u64,
    pub execution_failed: u64,
    /// Wall time from the start of the host phase to the last join.
    pub elapsed: Duration,
    /// Sum of thread callback time over all workers.
    pub busy: Duration,
    pub peak_in_flight: usize,
    pub workers: usize,
    /// Per-item failures, ordered by item id.
    pub failures: Vec<ItemError>,
}

impl RunReport {
    /// `processed + dropped + failed`. Equals `received` after a clean drain.
    pub fn accounted(&self) -> u64 {
        self.processed + self.dropped + self.failed
    }

    /// Items per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.received as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} dropped={} failed={} (process={} thread={}) received={} \
             workers={} peak_in_flight={} elapsed={:?} busy={:?}",
            self.processed,
            self.dropped,
            self.failed,
            self.process_failed,
            self.execution_failed,
            self.received,
            self.workers,
            self.peak_in_flight,
            self.elapsed,
            self.busy,
        )
    }
}
