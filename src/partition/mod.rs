//! # Key Range Partitioning
//!
//! Splits a keyed dataset into disjoint, contiguous key ranges. Each range becomes
//! one unit of dispatch; disjointness is what lets workers read concurrently
//! without coordinating on rows.

pub mod partitioner;
pub mod range;

pub use partitioner::{ColumnRangePartitioner, RangePartitioner};
pub use range::{ensure_disjoint, PartitionKeyRange};
