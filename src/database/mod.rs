//! # Database Collaborators
//!
//! PostgreSQL-backed implementations of the worker contracts:
//!
//! - [`PgBoundsProvider`] - min/max of a key column for partitioning
//! - [`PgRangeSource`] - key-ordered paging over one range
//! - [`PgChunkWriter`] - transactional JSONB upsert per chunk
//!
//! Table and column names are validated before they are interpolated into SQL.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use range_dispatch::config::DispatchConfig;
//! use range_dispatch::database::{DatabaseConnection, PgBoundsProvider};
//! use range_dispatch::partition::ColumnRangePartitioner;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DispatchConfig::from_env()?;
//! let db = DatabaseConnection::new(&config).await?;
//!
//! let bounds = Arc::new(PgBoundsProvider::new(db.pool().clone()));
//! let ranges = ColumnRangePartitioner::new(bounds, "customer", "id")
//!     .partition(i32::try_from(config.grid_size)?)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bounds;
pub mod connection;
pub mod source;
pub mod writer;

pub use bounds::PgBoundsProvider;
pub use connection::DatabaseConnection;
pub use source::PgRangeSource;
pub use writer::PgChunkWriter;
