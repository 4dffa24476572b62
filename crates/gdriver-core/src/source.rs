//! Work source abstraction.
//!
//! A `WorkSource` yields the items a run dispatches. Only the dispatch
//! thread calls it, so implementations need no internal locking.
//!
//! # Implementors (gdriver-module)
//!
//! - `SyntheticSource`: K generated items of fixed size (benchmark runs).
//! - `VecSource`: a fixed list of items.
//! - `FeedSource`: items pushed by an external producer over a channel.
//! - `TraceSource`: a file replayed in fixed-size chunks.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::item::WorkItem;

pub trait WorkSource: Send {
    /// Next item, or `None` once the source is exhausted.
    ///
    /// After `None`, further calls keep returning `None` until `reset()`.
    fn next_item(&mut self) -> Option<WorkItem>;

    /// Rewind to the first item. Returns `false` if the source is single-pass.
    fn reset(&mut self) -> bool {
        false
    }

    /// Number of items left, when known.
    fn remaining(&self) -> Option<usize> {
        None
    }

    /// Share the driver's stop signal. Sources whose `next_item()` can
    /// block indefinitely must return `None` soon after it is raised.
    fn attach_stop(&mut self, _stop: Arc<AtomicBool>) {}
}

impl<S: WorkSource + ?Sized> WorkSource for Box<S> {
    fn next_item(&mut self) -> Option<WorkItem> {
        (**self).next_item()
    }

    fn reset(&mut self) -> bool {
        (**self).reset()
    }

    fn remaining(&self) -> Option<usize> {
        (**self).remaining()
    }

    fn attach_stop(&mut self, stop: Arc<AtomicBool>) {
        (**self).attach_stop(stop)
    }
}
