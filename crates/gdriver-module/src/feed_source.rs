//! `FeedSource` — work pushed by an external producer.
//!
//! Wraps a crossbeam receiver. `next_item()` blocks until the producer
//! sends an item and reports end of work once every sender is dropped.
//! Single pass: a feed cannot be rewound.
//!
//! Once a stop signal is attached, an idle feed wakes every
//! `STOP_POLL_INTERVAL` to check it, so a stop request ends the feed even
//! while the producer is silent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use gdriver_core::item::WorkItem;
use gdriver_core::source::WorkSource;

/// How long an idle feed waits before re-checking the stop signal.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug)]
pub struct FeedSource {
    rx: Receiver<WorkItem>,
    stop: Option<Arc<AtomicBool>>,
}

impl FeedSource {
    pub fn new(rx: Receiver<WorkItem>) -> Self {
        Self { rx, stop: None }
    }

    /// Feed with a producer-side buffer of `capacity` items.
    pub fn bounded(capacity: usize) -> (Sender<WorkItem>, Self) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (tx, Self::new(rx))
    }

    pub fn unbounded() -> (Sender<WorkItem>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self::new(rx))
    }
}

impl WorkSource for FeedSource {
    fn next_item(&mut self) -> Option<WorkItem> {
        let Some(stop) = &self.stop else {
            return self.rx.recv().ok();
        };
        loop {
            if stop.load(Ordering::Acquire) {
                tracing::debug!("feed abandoned on stop request");
                return None;
            }
            match self.rx.recv_timeout(STOP_POLL_INTERVAL) {
                Ok(item) => return Some(item),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    fn attach_stop(&mut self, stop: Arc<AtomicBool>) {
        self.stop = Some(stop);
    }
}
