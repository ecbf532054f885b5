//! Read → process → write execution of a single work unit.

use super::chunk::Chunk;
use super::reader::{ChunkReader, PagingChunkReader};
use super::traits::{ChunkWriter, DataSource, ItemProcessor, RowMapper};
use crate::error::{DispatchError, DispatchResult};
use crate::logging::log_unit_operation;
use crate::messaging::{CompletionReport, WorkRequest};
use crate::partition::PartitionKeyRange;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Executes one work unit and produces exactly one report for it.
///
/// Never returns an error: every failure is carried in the report so the
/// dispatcher can fold it into the step outcome.
#[async_trait]
pub trait UnitExecutor: Send + Sync {
    async fn execute(&self, request: &WorkRequest) -> CompletionReport;
}

/// Work committed so far for one unit attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitProgress {
    pub chunks_committed: u64,
    pub items_committed: i64,
}

/// Chunk-oriented pipeline over a data source, mapper, processor and writer
pub struct ChunkPipeline<S, M, P, W> {
    source: Arc<S>,
    mapper: M,
    processor: P,
    writer: Arc<W>,
    chunk_size: usize,
    worker_id: String,
}

impl<S, M, P, W> ChunkPipeline<S, M, P, W>
where
    S: DataSource,
    M: RowMapper<S::Row>,
    P: ItemProcessor<M::Item>,
    P::Output: Sync,
    W: ChunkWriter<P::Output>,
{
    pub fn new(source: Arc<S>, mapper: M, processor: P, writer: Arc<W>, chunk_size: usize) -> Self {
        Self {
            source,
            mapper,
            processor,
            writer,
            chunk_size: chunk_size.max(1),
            worker_id: format!("worker-{}", std::process::id()),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Process every chunk of `range`, stopping at the first failure.
    ///
    /// `progress` reflects only chunks the writer accepted, so on error it tells
    /// exactly how far the unit got.
    pub async fn run(
        &self,
        range: &PartitionKeyRange,
        progress: &mut UnitProgress,
    ) -> DispatchResult<()> {
        let mut reader =
            PagingChunkReader::new(Arc::clone(&self.source), range.clone(), self.chunk_size);

        loop {
            let rows = reader.read_chunk().await?;
            if rows.is_empty() {
                return Ok(());
            }

            let chunk = self.transform(rows, range, progress.chunks_committed)?;
            self.writer.commit(&chunk).await.map_err(|error| match error {
                DispatchError::WriterFailure { .. } => error,
                other => DispatchError::writer(other.to_string()),
            })?;

            progress.chunks_committed += 1;
            progress.items_committed += chunk.len() as i64;
            debug!(
                worker_id = %self.worker_id,
                range = %range,
                sequence = chunk.sequence(),
                items = chunk.len(),
                "Committed chunk"
            );
        }
    }

    /// Map and process a page of rows; any item failure fails the whole chunk
    fn transform(
        &self,
        rows: Vec<S::Row>,
        range: &PartitionKeyRange,
        sequence: u64,
    ) -> DispatchResult<Chunk<P::Output>> {
        let items = rows
            .into_iter()
            .map(|row| {
                self.mapper
                    .map_row(row)
                    .and_then(|item| self.processor.process(item))
            })
            .collect::<DispatchResult<Vec<_>>>()?;
        Ok(Chunk::new(items, range.clone(), sequence))
    }
}

#[async_trait]
impl<S, M, P, W> UnitExecutor for ChunkPipeline<S, M, P, W>
where
    S: DataSource,
    M: RowMapper<S::Row>,
    P: ItemProcessor<M::Item>,
    P::Output: Sync,
    W: ChunkWriter<P::Output>,
{
    async fn execute(&self, request: &WorkRequest) -> CompletionReport {
        let started = Instant::now();
        let mut progress = UnitProgress::default();
        let result = self.run(&request.range, &mut progress).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                log_unit_operation(
                    "execute",
                    &request.unit_id,
                    &request.range,
                    "completed",
                    Some(duration_ms),
                    None,
                );
                CompletionReport::success(request, progress.items_committed)
                    .with_worker_id(&self.worker_id)
            }
            Err(error) => {
                warn!(
                    worker_id = %self.worker_id,
                    unit_id = %request.unit_id,
                    range = %request.range,
                    chunks_committed = progress.chunks_committed,
                    error = %error,
                    "Work unit failed"
                );
                log_unit_operation(
                    "execute",
                    &request.unit_id,
                    &request.range,
                    "failed",
                    Some(duration_ms),
                    Some(&error.to_string()),
                );
                CompletionReport::failure(request, progress.items_committed, &error)
                    .with_worker_id(&self.worker_id)
            }
        }
    }
}
