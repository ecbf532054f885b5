#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Range Dispatch Core
//!
//! Partition-and-dispatch coordinator for chunk-oriented processing of a keyed
//! dataset.
//!
//! ## Overview
//!
//! A step splits the key domain of a table into disjoint ranges, hands each range to
//! a worker as one work unit, and aggregates the per-unit completion reports into a
//! single [`StepOutcome`]. Workers read their range in bounded chunks, transform each
//! item, and commit every chunk atomically.
//!
//! ## Architecture
//!
//! - The [`Dispatcher`] owns every [`WorkUnit`] and is the only writer of unit state.
//! - Workers talk to the dispatcher only through a [`Transport`]: in-process
//!   ([`LocalTransport`]) or over request/reply queues ([`RemoteTransport`]).
//! - Unit failures fold into the outcome. Only invalid input and the step timeout
//!   are raised from [`Dispatcher::start`].
//! - A failed outcome lists the failed ranges; replaying them and merging the
//!   result yields the logical outcome of the whole step.
//!
//! ## Module Organization
//!
//! - [`partition`] - key ranges and the range partitioner
//! - [`worker`] - collaborator traits, chunk reader and the worker pipeline
//! - [`execution`] - work units, the dispatcher and step outcomes
//! - [`messaging`] - transports, brokers and message envelopes
//! - [`state_machine`] - work unit lifecycle
//! - [`storage`] - in-memory data source and sink
//! - [`database`] - PostgreSQL bounds provider, range source and chunk writer
//! - [`events`] - lifecycle event publishing
//! - [`config`], [`logging`], [`error`] - ambient configuration, tracing setup and errors
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use range_dispatch::config::DispatchConfig;
//! use range_dispatch::execution::Dispatcher;
//! use range_dispatch::messaging::LocalTransport;
//! use range_dispatch::storage::{InMemorySink, InMemoryTable, SourceRow};
//! use range_dispatch::worker::{ChunkPipeline, FnMapper, IdentityProcessor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DispatchConfig::default();
//! let table = Arc::new(InMemoryTable::new("customer", (0..4000).map(|k| (k, k))));
//! let sink = Arc::new(InMemorySink::<i64>::new());
//!
//! let pipeline = ChunkPipeline::new(
//!     table,
//!     FnMapper(|row: SourceRow<i64>| Ok(row.data)),
//!     IdentityProcessor,
//!     Arc::clone(&sink),
//!     config.chunk_size,
//! );
//! let transport = Arc::new(LocalTransport::start(
//!     Arc::new(pipeline),
//!     config.local_workers,
//!     config.local_queue_capacity,
//! ));
//!
//! let dispatcher = Dispatcher::new(config, transport.clone())?;
//! let outcome = dispatcher.start_bounded(0, 3999).await?;
//! assert!(outcome.is_completed());
//! transport.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod messaging;
pub mod partition;
pub mod state_machine;
pub mod storage;
pub mod validation;
pub mod worker;

pub use config::DispatchConfig;
pub use error::{DispatchError, DispatchResult};
pub use events::{DispatchEvent, EventPublisher};
pub use execution::{
    Dispatcher, DispatcherBuilder, StepExecutionContext, StepOutcome, StepStatus, StopHandle,
    UnitId, WorkUnit,
};
pub use messaging::{CompletionReport, LocalTransport, RemoteTransport, Transport, WorkRequest};
pub use partition::{PartitionKeyRange, RangePartitioner};
pub use state_machine::WorkUnitState;
pub use worker::{ChunkPipeline, ChunkReader, ChunkWriter};
