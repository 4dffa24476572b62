//! `VecSource` — a fixed list of work items.

use gdriver_core::item::WorkItem;
use gdriver_core::source::WorkSource;

#[derive(Debug, Clone, Default)]
pub struct VecSource {
    items: Vec<WorkItem>,
    cursor: usize,
}

impl VecSource {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self { items, cursor: 0 }
    }
}

impl FromIterator<WorkItem> for VecSource {
    fn from_iter<I: IntoIterator<Item = WorkItem>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl WorkSource for VecSource {
    fn next_item(&mut self) -> Option<WorkItem> {
        let item = self.items.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(item)
    }

    fn reset(&mut self) -> bool {
        self.cursor = 0;
        true
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.items.len() - self.cursor)
    }
}
