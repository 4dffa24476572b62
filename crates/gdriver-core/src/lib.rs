//! # gdriver-core — Trait definitions for gdriver
//!
//! This crate defines the trait boundaries and shared types of the generic
//! handler driver. Each trait models one seam:
//!
//! | Trait          | Seam                                   |
//! |----------------|----------------------------------------|
//! | ModuleLoader   | how a handler module path is opened    |
//! | LoadedModule   | symbol lookup and explicit unload      |
//! | WorkSource     | where work items come from             |
//! | WorkerPool     | how the thread phase is executed       |
//! | ItemExecutor   | what a worker does with one item       |
//!
//! Default implementations live in `gdriver-module`, the dispatch loop in
//! `gdriver-executor`, and the lifecycle controller in `gdriver`.
//!
//! ## Modules
//!
//! - `abi` - C callback signatures, item descriptor, status codes
//! - `item` - Work item and item id
//! - `module_state` - Per-module state blob handed to callbacks
//! - `loader` - Module loader traits
//! - `source` - Work source trait
//! - `pool` - Worker pool and item executor traits
//! - `report` - Atomic run counters and the run report
//! - `state` - Driver lifecycle state
//! - `error` - Error types

pub mod abi;
pub mod item;
pub mod module_state;
pub mod loader;
pub mod source;
pub mod pool;
pub mod report;
pub mod state;
pub mod error;

pub use abi::{ItemDesc, Symbol, SymbolKind, ABI_VERSION, PROCESS_DROP, PROCESS_FORWARD};
pub use error::{DriverError, DriverResult, ItemError, Phase, ResolutionError, ResourceError};
pub use item::{ItemId, WorkItem};
pub use loader::{LoadedModule, ModuleLoader};
pub use module_state::ModuleState;
pub use pool::{ItemExecutor, WorkerPool};
pub use report::{RunCounters, RunReport};
pub use source::WorkSource;
pub use state::DriverState;

/// Shared limits.
pub mod constants {
    /// Maximum worker threads per pool.
    pub const MAX_WORKERS: usize = 64;

    /// Default module state size when the module does not export one.
    pub const DEFAULT_STATE_SIZE: usize = 4096;

    /// Largest module state blob the driver allocates (1 GiB).
    pub const MAX_STATE_SIZE: usize = 1 << 30;

    /// Largest synthetic item or trace chunk (64 MiB).
    pub const MAX_ITEM_SIZE: usize = 1 << 26;
}
