//! Module-local state blob.
//!
//! One zeroed, 8-byte aligned region per handler module instance. It is
//! handed to every callback as a raw `(ptr, len)` pair so two drivers in one
//! process never share handler state.

use core::cell::UnsafeCell;

use libc::c_void;

use crate::constants::MAX_STATE_SIZE;
use crate::error::ResourceError;

const WORD: usize = core::mem::size_of::<u64>();

pub struct ModuleState {
    words: Box<[UnsafeCell<u64>]>,
    len: usize,
}

// Safety: the blob is plain memory. Access discipline between host, process
// and thread callbacks is part of the handler module contract; the driver
// only guarantees phase ordering.
unsafe impl Send for ModuleState {}
unsafe impl Sync for ModuleState {}

impl ModuleState {
    /// Allocate `len` zeroed bytes (rounded up to whole words internally).
    ///
    /// Sizes above `MAX_STATE_SIZE`, and allocations the system refuses,
    /// are errors rather than aborts.
    pub fn try_zeroed(len: usize) -> Result<Self, ResourceError> {
        if len > MAX_STATE_SIZE {
            return Err(ResourceError::StateAlloc {
                bytes: len,
                reason: format!("exceeds limit of {} bytes", MAX_STATE_SIZE),
            });
        }
        let count = len.div_ceil(WORD);
        let mut words = Vec::new();
        words
            .try_reserve_exact(count)
            .map_err(|e| ResourceError::StateAlloc {
                bytes: len,
                reason: e.to_string(),
            })?;
        words.resize_with(count, || UnsafeCell::new(0));
        Ok(Self {
            words: words.into_boxed_slice(),
            len,
        })
    }

    /// Length in bytes as seen by callbacks.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw pointer passed to callbacks.
    #[inline]
    pub fn as_ptr(&self) -> *mut c_void {
        UnsafeCell::raw_get(self.words.as_ptr()) as *mut c_void
    }

    /// Copy of the blob. `&mut self` guarantees no callback is running.
    pub fn snapshot(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.words.len() * WORD);
        for w in self.words.iter_mut() {
            out.extend_from_slice(&w.get_mut().to_ne_bytes());
        }
        out.truncate(self.len);
        out
    }

    /// Word `idx` of the blob. `&mut self` guarantees no callback is running.
    pub fn word(&mut self, idx: usize) -> Option<u64> {
        self.words.get_mut(idx).map(|w| *w.get_mut())
    }
}

impl core::fmt::Debug for ModuleState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ModuleState").field("len", &self.len).finish()
    }
}
