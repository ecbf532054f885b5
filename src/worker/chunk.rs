use crate::partition::PartitionKeyRange;
use serde::{Deserialize, Serialize};

/// Bounded batch of items read, processed and committed as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk<T> {
    items: Vec<T>,
    source_range: PartitionKeyRange,
    /// Zero-based position of this chunk within its range
    sequence: u64,
}

impl<T> Chunk<T> {
    pub fn new(items: Vec<T>, source_range: PartitionKeyRange, sequence: u64) -> Self {
        Self {
            items,
            source_range,
            sequence,
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn source_range(&self) -> &PartitionKeyRange {
        &self.source_range
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}
