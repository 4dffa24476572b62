//! Worker pool abstraction.
//!
//! A `WorkerPool` runs the thread phase. Items are handed to idle workers
//! one at a time; a worker owns its item until the thread callback returns.
//!
//! # Implementors
//!
//! - `FixedPool` (default, gdriver-module): N OS threads spawned at
//!   creation, rendezvous hand-off, no scaling.

use crate::error::{DriverResult, ItemError, ResourceError};
use crate::item::WorkItem;

/// What a worker does with an item.
pub trait ItemExecutor: Send + Sync + 'static {
    fn execute(&self, item: &WorkItem) -> Result<(), ItemError>;
}

/// Executes items on a fixed set of threads.
///
/// **Contract:**
/// - `dispatch()` blocks until an idle worker has taken the item
///   (backpressure; at most `size()` items are ever in flight).
/// - Items are taken in `dispatch()` call order.
/// - After `drain()` every worker has been joined and `dispatch()` fails
///   with `ResourceError::PoolClosed`.
pub trait WorkerPool: Send + Sync {
    fn dispatch(&self, item: WorkItem) -> DriverResult<()>;

    /// Items currently being executed.
    fn in_flight(&self) -> usize;

    /// Number of worker threads (fixed at creation).
    fn size(&self) -> usize;

    /// Worker threads not yet joined.
    fn live_workers(&self) -> usize;

    /// Stop accepting work, let in-flight items finish, join every worker.
    /// Idempotent.
    fn drain(&mut self) -> Result<(), ResourceError>;
}
