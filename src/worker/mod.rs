//! # Worker Pipeline
//!
//! Everything a worker needs to execute one unit: the collaborator traits it
//! consumes (data source, row mapper, item processor, chunk writer), the paging
//! chunk reader, and the read → process → write pipeline that produces exactly one
//! completion report per unit attempt.

pub mod chunk;
pub mod pipeline;
pub mod reader;
pub mod traits;

pub use chunk::Chunk;
pub use pipeline::{ChunkPipeline, UnitExecutor, UnitProgress};
pub use reader::{ChunkReader, PagingChunkReader};
pub use traits::{
    BoundsProvider, ChunkWriter, DataSource, FnMapper, FnProcessor, IdentityProcessor,
    ItemProcessor, KeyedItem, RowMapper,
};
