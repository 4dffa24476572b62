//! Work item types.
//!
//! A [`WorkItem`] is owned by exactly one stage at a time:
//! work source → dispatch thread → one worker. It is moved, never shared.

use core::fmt;

/// Stable identity of a work item.
///
/// Travels unchanged through the process phase (a transform may rewrite the
/// payload, never the id) and is what failures are recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ItemId(pub u64);

impl ItemId {
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An opaque unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: ItemId,
    pub payload: Vec<u8>,
}

impl WorkItem {
    pub fn new(id: u64, payload: Vec<u8>) -> Self {
        Self {
            id: ItemId(id),
            payload,
        }
    }

    /// Item with an empty payload.
    pub fn empty(id: u64) -> Self {
        Self::new(id, Vec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
