use super::range::PartitionKeyRange;
use crate::error::{DispatchError, DispatchResult};
use crate::worker::BoundsProvider;
use std::sync::Arc;
use tracing::{debug, info};

/// Deterministic splitter of `[min, max]` into at most `count` contiguous ranges.
///
/// # Examples
///
/// ```rust
/// use range_dispatch::partition::RangePartitioner;
///
/// let ranges = RangePartitioner.partition(0, 999, 4).unwrap();
/// assert_eq!(ranges.len(), 4);
/// assert_eq!(ranges[3].lower_bound(), 750);
/// assert_eq!(ranges[3].upper_bound(), 1000);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RangePartitioner;

impl RangePartitioner {
    pub fn partition(&self, min: i64, max: i64, count: i32) -> DispatchResult<Vec<PartitionKeyRange>> {
        if count <= 0 {
            return Err(DispatchError::invalid_argument(format!(
                "partition count must be at least 1, got {count}"
            )));
        }
        if min > max {
            return Err(DispatchError::invalid_argument(format!(
                "partition min {min} exceeds max {max}"
            )));
        }

        // Widen so that max + 1 and the span never overflow
        let end = max as i128 + 1;
        let span = end - min as i128;
        let count = count as i128;
        let target_size = (span + count - 1) / count;

        let mut ranges = Vec::with_capacity(count.min(span) as usize);
        let mut lower = min as i128;
        while lower < end {
            let upper = (lower + target_size).min(end);
            let label = format!("partition{}", ranges.len());
            ranges.push(PartitionKeyRange::from_wide(lower, upper, label));
            lower = upper;
        }

        debug!(
            min = min,
            max = max,
            requested = count as i64,
            produced = ranges.len(),
            target_size = target_size as i64,
            "Computed key range partitions"
        );
        Ok(ranges)
    }
}

/// Partitions a table by the min/max of one key column
pub struct ColumnRangePartitioner {
    bounds: Arc<dyn BoundsProvider>,
    table: String,
    column: String,
    partitioner: RangePartitioner,
}

impl ColumnRangePartitioner {
    pub fn new(
        bounds: Arc<dyn BoundsProvider>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            bounds,
            table: table.into(),
            column: column.into(),
            partitioner: RangePartitioner,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Query the bounds and split them into `grid_size` ranges.
    ///
    /// An empty table has no bounds and yields no partitions.
    pub async fn partition(&self, grid_size: i32) -> DispatchResult<Vec<PartitionKeyRange>> {
        if grid_size <= 0 {
            return Err(DispatchError::invalid_argument(format!(
                "grid size must be at least 1, got {grid_size}"
            )));
        }

        match self.bounds.min_max_key(&self.table, &self.column).await? {
            Some((min, max)) => {
                info!(
                    table = %self.table,
                    column = %self.column,
                    min = min,
                    max = max,
                    grid_size = grid_size,
                    "Partitioning table by column range"
                );
                self.partitioner.partition(min, max, grid_size)
            }
            None => {
                info!(table = %self.table, "Table is empty, no partitions produced");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTable;

    fn bounds(ranges: &[PartitionKeyRange]) -> Vec<(i64, i64)> {
        ranges
            .iter()
            .map(|r| (r.lower_bound(), r.upper_bound()))
            .collect()
    }

    #[test]
    fn test_even_split() {
        let ranges = RangePartitioner.partition(0, 999, 4).unwrap();
        assert_eq!(
            bounds(&ranges),
            vec![(0, 250), (250, 500), (500, 750), (750, 1000)]
        );
        assert_eq!(ranges[2].label(), "partition2");
    }

    #[test]
    fn test_single_key_domain() {
        let ranges = RangePartitioner.partition(5, 5, 3).unwrap();
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].contains(5));
        assert_eq!(ranges[0].key_count(), 1);
    }

    #[test]
    fn test_last_range_clipped() {
        let ranges = RangePartitioner.partition(0, 9, 4).unwrap();
        assert_eq!(bounds(&ranges), vec![(0, 3), (3, 6), (6, 9), (9, 10)]);
    }

    #[test]
    fn test_fewer_ranges_than_requested_never_empty() {
        let ranges = RangePartitioner.partition(1, 3, 10).unwrap();
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().all(|r| r.key_count() == 1));
    }

    #[test]
    fn test_extreme_bounds_do_not_overflow() {
        let ranges = RangePartitioner.partition(i64::MIN, i64::MAX, 2).unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].lower_bound(), i64::MIN);
        assert_eq!(ranges[1].lower_bound(), 0);
        assert!(ranges[1].is_upper_inclusive());
        assert!(ranges[1].contains(i64::MAX));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(
            RangePartitioner.partition(0, 10, 0),
            Err(DispatchError::InvalidArgument { .. })
        ));
        assert!(matches!(
            RangePartitioner.partition(10, 0, 2),
            Err(DispatchError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_deterministic() {
        let first = RangePartitioner.partition(-50, 1234, 7).unwrap();
        let second = RangePartitioner.partition(-50, 1234, 7).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_column_partitioner_uses_bounds() {
        let table = InMemoryTable::new("customer", (100..200).map(|k| (k, k)));
        let partitioner = ColumnRangePartitioner::new(Arc::new(table), "customer", "id");
        let ranges = partitioner.partition(4).await.unwrap();
        assert_eq!(
            bounds(&ranges),
            vec![(100, 125), (125, 150), (150, 175), (175, 200)]
        );
    }

    #[tokio::test]
    async fn test_column_partitioner_empty_table() {
        let table = InMemoryTable::<i64>::new("customer", std::iter::empty());
        let partitioner = ColumnRangePartitioner::new(Arc::new(table), "customer", "id");
        assert!(partitioner.partition(4).await.unwrap().is_empty());
    }
}
