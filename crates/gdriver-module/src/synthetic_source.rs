//! `SyntheticSource` — bounded benchmark work source.
//!
//! Yields `count` items of `item_size` bytes with ids `0..count`. Payload
//! byte `i` of item `id` is `(id + i) as u8`, so a handler can verify what
//! it received without any side channel.

use gdriver_core::constants::MAX_ITEM_SIZE;
use gdriver_core::item::WorkItem;
use gdriver_core::source::WorkSource;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    count: u64,
    item_size: usize,
    next: u64,
}

impl SyntheticSource {
    /// `item_size` is capped at `MAX_ITEM_SIZE`.
    pub fn new(count: u64, item_size: usize) -> Self {
        Self {
            count,
            item_size: item_size.min(MAX_ITEM_SIZE),
            next: 0,
        }
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Payload generated for item `id`.
    pub fn payload_for(id: u64, item_size: usize) -> Vec<u8> {
        (0..item_size)
            .map(|i| id.wrapping_add(i as u64) as u8)
            .collect()
    }
}

impl WorkSource for SyntheticSource {
    fn next_item(&mut self) -> Option<WorkItem> {
        if self.next >= self.count {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(WorkItem::new(id, Self::payload_for(id, self.item_size)))
    }

    fn reset(&mut self) -> bool {
        self.next = 0;
        true
    }

    fn remaining(&self) -> Option<usize> {
        usize::try_from(self.count - self.next).ok()
    }
}
