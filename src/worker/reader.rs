use super::traits::DataSource;
use crate::error::DispatchResult;
use crate::partition::PartitionKeyRange;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Sequential chunk source over one key range; an empty chunk means exhausted
#[async_trait]
pub trait ChunkReader: Send {
    type Row: Send;

    async fn read_chunk(&mut self) -> DispatchResult<Vec<Self::Row>>;
}

/// Offset-paging reader with fetch size equal to the chunk size
pub struct PagingChunkReader<S: DataSource> {
    source: Arc<S>,
    range: PartitionKeyRange,
    page_size: usize,
    offset: u64,
    exhausted: bool,
}

impl<S: DataSource> PagingChunkReader<S> {
    pub fn new(source: Arc<S>, range: PartitionKeyRange, page_size: usize) -> Self {
        info!(
            range = %range,
            "reading {} to {}",
            range.lower_bound(),
            range.upper_bound()
        );
        Self {
            source,
            range,
            page_size: page_size.max(1),
            offset: 0,
            exhausted: false,
        }
    }

    /// Rows handed out so far
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[async_trait]
impl<S: DataSource> ChunkReader for PagingChunkReader<S> {
    type Row = S::Row;

    async fn read_chunk(&mut self) -> DispatchResult<Vec<S::Row>> {
        if self.exhausted {
            return Ok(Vec::new());
        }

        let rows = self
            .source
            .fetch_page(&self.range, self.offset, self.page_size)
            .await?;

        // A short page is the last one, skip the extra round trip
        if rows.len() < self.page_size {
            self.exhausted = true;
        }
        self.offset += rows.len() as u64;

        debug!(
            range = %self.range,
            rows = rows.len(),
            offset = self.offset,
            "Read chunk"
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryTable;

    #[tokio::test]
    async fn test_reads_range_in_pages_until_empty() {
        let table = Arc::new(InMemoryTable::new("t", (0..25).map(|k| (k, k))));
        let range = PartitionKeyRange::new(3, 23, "p").unwrap();
        let mut reader = PagingChunkReader::new(table, range, 8);

        let mut sizes = Vec::new();
        let mut keys = Vec::new();
        loop {
            let rows = reader.read_chunk().await.unwrap();
            if rows.is_empty() {
                break;
            }
            sizes.push(rows.len());
            keys.extend(rows.iter().map(|row| row.key));
        }

        assert_eq!(sizes, vec![8, 8, 4]);
        assert_eq!(keys, (3..23).collect::<Vec<_>>());
        assert_eq!(reader.offset(), 20);
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_empty_page() {
        let table = Arc::new(InMemoryTable::new("t", (0..16).map(|k| (k, k))));
        let range = PartitionKeyRange::new(0, 16, "p").unwrap();
        let mut reader = PagingChunkReader::new(table, range, 8);

        assert_eq!(reader.read_chunk().await.unwrap().len(), 8);
        assert_eq!(reader.read_chunk().await.unwrap().len(), 8);
        assert!(reader.read_chunk().await.unwrap().is_empty());
        assert!(reader.read_chunk().await.unwrap().is_empty());
    }
}
