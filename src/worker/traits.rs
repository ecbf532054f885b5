//! Collaborator contracts consumed by the worker pipeline.

use super::chunk::Chunk;
use crate::error::DispatchResult;
use crate::partition::PartitionKeyRange;
use async_trait::async_trait;

/// Paged, key-ordered access to the rows of one key range.
///
/// Pages must be ordered by the partition key ascending and restartable from any
/// offset, so a reader can resume by offset alone.
#[async_trait]
pub trait DataSource: Send + Sync {
    type Row: Send;

    async fn fetch_page(
        &self,
        range: &PartitionKeyRange,
        offset: u64,
        page_size: usize,
    ) -> DispatchResult<Vec<Self::Row>>;
}

/// Min/max of a key column, `None` when the table has no rows
#[async_trait]
pub trait BoundsProvider: Send + Sync {
    async fn min_max_key(&self, table: &str, column: &str) -> DispatchResult<Option<(i64, i64)>>;
}

/// Converts a raw row into a domain item; fails with `MappingError` on malformed rows
pub trait RowMapper<R>: Send + Sync {
    type Item: Send;

    fn map_row(&self, row: R) -> DispatchResult<Self::Item>;
}

/// Stateless per-item transformation
pub trait ItemProcessor<I>: Send + Sync {
    type Output: Send;

    fn process(&self, item: I) -> DispatchResult<Self::Output>;
}

/// Persists one chunk as a single atomic commit.
///
/// Either every item of the chunk becomes visible or none does. Implementations
/// must tolerate the same chunk being committed twice (redelivered requests), e.g.
/// through upsert semantics keyed by [`KeyedItem::key`].
#[async_trait]
pub trait ChunkWriter<T: Send + Sync>: Send + Sync {
    async fn commit(&self, chunk: &Chunk<T>) -> DispatchResult<()>;
}

/// Items carrying their partition key, used for idempotent upserts
pub trait KeyedItem {
    fn key(&self) -> i64;
}

impl KeyedItem for i64 {
    fn key(&self) -> i64 {
        *self
    }
}

/// Adapts a closure into a [`RowMapper`]
pub struct FnMapper<F>(pub F);

impl<R, I, F> RowMapper<R> for FnMapper<F>
where
    F: Fn(R) -> DispatchResult<I> + Send + Sync,
    I: Send,
{
    type Item = I;

    fn map_row(&self, row: R) -> DispatchResult<I> {
        (self.0)(row)
    }
}

/// Adapts a closure into an [`ItemProcessor`]
pub struct FnProcessor<F>(pub F);

impl<I, O, F> ItemProcessor<I> for FnProcessor<F>
where
    F: Fn(I) -> DispatchResult<O> + Send + Sync,
    O: Send,
{
    type Output = O;

    fn process(&self, item: I) -> DispatchResult<O> {
        (self.0)(item)
    }
}

/// Passes items through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProcessor;

impl<I: Send> ItemProcessor<I> for IdentityProcessor {
    type Output = I;

    fn process(&self, item: I) -> DispatchResult<I> {
        Ok(item)
    }
}
