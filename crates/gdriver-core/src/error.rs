//! gdriver error types.
//!
//! Two families:
//!
//! - [`DriverError`] is fatal to the lifecycle call that produced it and
//!   unwinds to the caller of `init` / `run`.
//! - [`ItemError`] is per work item. It never leaves the dispatch engine;
//!   it is counted and kept in the run report.

use std::path::PathBuf;

use thiserror::Error;

use crate::item::ItemId;
use crate::state::DriverState;

/// Result type for lifecycle operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Fatal driver errors.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Handler module or one of its symbols could not be resolved.
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Illegal lifecycle transition. The driver state is left unchanged.
    #[error("lifecycle error: cannot {op} while {state}")]
    Lifecycle {
        op: &'static str,
        state: DriverState,
    },

    /// Worker pool or module resource failure.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// The host callback returned a non-zero status.
    #[error("host callback `{symbol}` failed with status {code}")]
    HostPhase { symbol: String, code: i32 },

    /// Invalid configuration or argument override.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Module and symbol resolution failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("cannot load handler module {path:?}: {reason}")]
    ModuleLoad { path: PathBuf, reason: String },

    #[error("symbol `{symbol}` not found in handler module {path:?}")]
    MissingSymbol { path: PathBuf, symbol: String },

    #[error("handler module {path:?} has ABI version {found}, expected {expected}")]
    AbiMismatch {
        path: PathBuf,
        expected: u32,
        found: u32,
    },

    #[error("registry already holds handler module {path:?}")]
    AlreadyLoaded { path: PathBuf },
}

/// Worker pool and module lifetime failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("failed to spawn worker {index}: {reason}")]
    WorkerSpawn { index: usize, reason: String },

    #[error("worker {index} panicked")]
    WorkerPanicked { index: usize },

    #[error("worker pool no longer accepts work")]
    PoolClosed,

    #[error("failed to release handler module {path:?}: {reason}")]
    ModuleRelease { path: PathBuf, reason: String },

    #[error("handler module {path:?} is still referenced at release")]
    ModuleInUse { path: PathBuf },

    #[error("cannot allocate {bytes} byte module state: {reason}")]
    StateAlloc { bytes: usize, reason: String },
}

/// Which callback phase an item failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Process,
    Thread,
}

/// Per-item failure, recovered locally by the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    /// The process callback returned a failure status.
    #[error("process callback failed on item {item} with status {code}")]
    Process { item: ItemId, code: i32 },

    /// The process callback reported a payload it was not allowed to produce.
    #[error("process callback produced an invalid transform of item {item}: {reason}")]
    InvalidTransform { item: ItemId, reason: String },

    /// The thread callback returned a failure status.
    #[error("thread callback failed on item {item} with status {code}")]
    Execution { item: ItemId, code: i32 },

    /// The executor panicked while running the item.
    #[error("executor panicked on item {item}: {message}")]
    Panicked { item: ItemId, message: String },
}

impl ItemError {
    /// Item the failure is recorded against.
    pub fn item(&self) -> ItemId {
        match self {
            ItemError::Process { item, .. }
            | ItemError::InvalidTransform { item, .. }
            | ItemError::Execution { item, .. }
            | ItemError::Panicked { item, .. } => *item,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            ItemError::Process { .. } | ItemError::InvalidTransform { .. } => Phase::Process,
            ItemError::Execution { .. } | ItemError::Panicked { .. } => Phase::Thread,
        }
    }
}
