//! Handler module ABI.
//!
//! A handler module exports up to three callbacks with the C calling
//! convention, plus optional metadata symbols:
//!
//! | Symbol                 | Type            | Required |
//! |------------------------|-----------------|----------|
//! | host callback          | [`HostFn`]      | no       |
//! | process callback       | [`ProcessFn`]   | yes      |
//! | thread callback        | [`ThreadFn`]    | yes      |
//! | `gdriver_abi_version`  | [`AbiVersionFn`]| no       |
//! | `gdriver_state_size`   | [`StateSizeFn`] | no       |
//!
//! Every callback receives the module-local state blob as
//! `(state, state_len)`. The driver orders the phases (host strictly before
//! any dispatch, process strictly serialized on the dispatch thread) but does
//! not lock the blob: thread callbacks run in parallel and must treat it as
//! shared memory.
//!
//! ## Status codes
//!
//! - host / thread: `0` = success, anything else = failure.
//! - process: [`PROCESS_FORWARD`], [`PROCESS_DROP`], anything else = failure.

use libc::{c_int, c_void};

use crate::item::{ItemId, WorkItem};

/// ABI revision implemented by this driver.
pub const ABI_VERSION: u32 = 1;

/// Optional metadata symbol: `extern "C" fn() -> u32`.
pub const ABI_VERSION_SYMBOL: &str = "gdriver_abi_version";

/// Optional metadata symbol: `extern "C" fn() -> usize`.
pub const STATE_SIZE_SYMBOL: &str = "gdriver_state_size";

/// Process status: hand the (possibly rewritten) item to a worker.
pub const PROCESS_FORWARD: c_int = 0;

/// Process status: discard the item.
pub const PROCESS_DROP: c_int = 1;

/// Item view handed across the ABI.
///
/// The process callback may rewrite `data[..len]` in place and shrink
/// `len`. It must not grow `len` past `capacity` or move `data`.
#[derive(Debug)]
#[repr(C)]
pub struct ItemDesc {
    pub id: u64,
    pub data: *mut u8,
    pub len: usize,
    pub capacity: usize,
}

impl ItemDesc {
    /// Borrow `item` for a single callback invocation.
    ///
    /// The descriptor is only valid while `item` is not touched.
    pub fn borrow_mut(item: &mut WorkItem) -> Self {
        let len = item.payload.len();
        Self {
            id: item.id.as_u64(),
            data: item.payload.as_mut_ptr(),
            len,
            capacity: len,
        }
    }

    pub fn item_id(&self) -> ItemId {
        ItemId(self.id)
    }
}

/// One-time setup before dispatch.
pub type HostFn = unsafe extern "C" fn(state: *mut c_void, state_len: usize) -> c_int;

/// Per-item transform/filter, serialized on the dispatch thread.
pub type ProcessFn =
    unsafe extern "C" fn(item: *mut ItemDesc, state: *mut c_void, state_len: usize) -> c_int;

/// Per-item execution on a worker thread.
pub type ThreadFn =
    unsafe extern "C" fn(item: *const ItemDesc, state: *mut c_void, state_len: usize) -> c_int;

pub type AbiVersionFn = unsafe extern "C" fn() -> u32;

pub type StateSizeFn = unsafe extern "C" fn() -> usize;

/// What a symbol is expected to be when it is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Host,
    Process,
    Thread,
    AbiVersion,
    StateSize,
}

/// A resolved, typed symbol.
///
/// The function pointer stays valid only while the module it came from is
/// loaded; holders must release the pointer before unloading the module.
#[derive(Debug, Clone, Copy)]
pub enum Symbol {
    Host(HostFn),
    Process(ProcessFn),
    Thread(ThreadFn),
    AbiVersion(AbiVersionFn),
    StateSize(StateSizeFn),
}

impl Symbol {
    pub fn kind(&self) -> SymbolKind {
        match self {
            Symbol::Host(_) => SymbolKind::Host,
            Symbol::Process(_) => SymbolKind::Process,
            Symbol::Thread(_) => SymbolKind::Thread,
            Symbol::AbiVersion(_) => SymbolKind::AbiVersion,
            Symbol::StateSize(_) => SymbolKind::StateSize,
        }
    }
}
