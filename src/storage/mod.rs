//! In-process storage collaborators

pub mod memory;

pub use memory::{CommitRecord, InMemorySink, InMemoryTable, SourceRow};
