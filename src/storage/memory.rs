//! In-memory data source and chunk sink.
//!
//! Both keep their data behind `parking_lot` locks and never hold a guard across an
//! await point. The sink applies a chunk under one write lock, which gives the
//! all-or-nothing commit the pipeline relies on.

use crate::error::{DispatchError, DispatchResult};
use crate::partition::PartitionKeyRange;
use crate::worker::{BoundsProvider, Chunk, ChunkWriter, DataSource, KeyedItem};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A stored row and its partition key
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow<R> {
    pub key: i64,
    pub data: R,
}

/// Key-ordered table usable as both [`DataSource`] and [`BoundsProvider`]
#[derive(Debug)]
pub struct InMemoryTable<R> {
    name: String,
    rows: RwLock<BTreeMap<i64, R>>,
    read_keys: Mutex<Vec<i64>>,
}

impl<R: Clone + Send + Sync> InMemoryTable<R> {
    pub fn new(name: impl Into<String>, rows: impl IntoIterator<Item = (i64, R)>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(rows.into_iter().collect()),
            read_keys: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn insert(&self, key: i64, row: R) {
        self.rows.write().insert(key, row);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Every key handed out by `fetch_page`, in fetch order
    pub fn read_keys(&self) -> Vec<i64> {
        self.read_keys.lock().clone()
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> DataSource for InMemoryTable<R> {
    type Row = SourceRow<R>;

    async fn fetch_page(
        &self,
        range: &PartitionKeyRange,
        offset: u64,
        page_size: usize,
    ) -> DispatchResult<Vec<SourceRow<R>>> {
        let offset = usize::try_from(offset)
            .map_err(|_| DispatchError::invalid_argument(format!("offset {offset} too large")))?;

        let page: Vec<SourceRow<R>> = {
            let rows = self.rows.read();
            rows.range(range.lower_bound()..)
                .take_while(|(key, _)| range.contains(**key))
                .skip(offset)
                .take(page_size)
                .map(|(key, data)| SourceRow {
                    key: *key,
                    data: data.clone(),
                })
                .collect()
        };

        self.read_keys.lock().extend(page.iter().map(|row| row.key));
        Ok(page)
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> BoundsProvider for InMemoryTable<R> {
    async fn min_max_key(&self, table: &str, _column: &str) -> DispatchResult<Option<(i64, i64)>> {
        if table != self.name {
            return Err(DispatchError::invalid_argument(format!(
                "unknown table {table}, expected {}",
                self.name
            )));
        }

        let rows = self.rows.read();
        Ok(rows
            .keys()
            .next()
            .copied()
            .zip(rows.keys().next_back().copied()))
    }
}

/// One successful commit as recorded by [`InMemorySink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub label: String,
    pub sequence: u64,
    pub len: usize,
}

/// Upsert sink keyed by [`KeyedItem::key`] with injectable chunk failures
#[derive(Debug)]
pub struct InMemorySink<T> {
    rows: RwLock<BTreeMap<i64, T>>,
    commits: Mutex<Vec<CommitRecord>>,
    failing_chunks: Mutex<HashSet<(String, u64)>>,
    commit_delay: Option<Duration>,
    active_commits: AtomicUsize,
    peak_commits: AtomicUsize,
}

impl<T> Default for InMemorySink<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            commits: Mutex::new(Vec::new()),
            failing_chunks: Mutex::new(HashSet::new()),
            commit_delay: None,
            active_commits: AtomicUsize::new(0),
            peak_commits: AtomicUsize::new(0),
        }
    }
}

impl<T: KeyedItem + Clone + Send + Sync> InMemorySink<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every commit
    pub fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = Some(delay);
        self
    }

    /// Reject the chunk with this sequence number from the range labelled `label`
    pub fn fail_on_chunk(&self, label: impl Into<String>, sequence: u64) {
        self.failing_chunks.lock().insert((label.into(), sequence));
    }

    pub fn clear_failures(&self) {
        self.failing_chunks.lock().clear();
    }

    pub fn committed_count(&self) -> usize {
        self.rows.read().len()
    }

    pub fn get(&self, key: i64) -> Option<T> {
        self.rows.read().get(&key).cloned()
    }

    pub fn contains(&self, key: i64) -> bool {
        self.rows.read().contains_key(&key)
    }

    /// Stored items in key order
    pub fn items(&self) -> Vec<T> {
        self.rows.read().values().cloned().collect()
    }

    pub fn commit_log(&self) -> Vec<CommitRecord> {
        self.commits.lock().clone()
    }

    /// Most commits observed running at the same time
    pub fn peak_concurrent_commits(&self) -> usize {
        self.peak_commits.load(Ordering::SeqCst)
    }

    fn apply(&self, chunk: &Chunk<T>) -> DispatchResult<()> {
        let label = chunk.source_range().label().to_string();
        if self
            .failing_chunks
            .lock()
            .contains(&(label.clone(), chunk.sequence()))
        {
            return Err(DispatchError::writer(format!(
                "injected failure for chunk {} of {label}",
                chunk.sequence()
            )));
        }

        {
            let mut rows = self.rows.write();
            for item in chunk.items() {
                rows.insert(item.key(), item.clone());
            }
        }

        self.commits.lock().push(CommitRecord {
            label,
            sequence: chunk.sequence(),
            len: chunk.len(),
        });
        Ok(())
    }
}

#[async_trait]
impl<T: KeyedItem + Clone + Send + Sync> ChunkWriter<T> for InMemorySink<T> {
    async fn commit(&self, chunk: &Chunk<T>) -> DispatchResult<()> {
        let active = self.active_commits.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_commits.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.commit_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.apply(chunk);

        self.active_commits.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
