//! # Messaging Module
//!
//! Request/reply plumbing between the dispatcher and its workers. One
//! [`Transport`] trait with two variants: [`LocalTransport`] hands requests to an
//! in-process worker pool, [`RemoteTransport`] publishes them to a
//! [`MessageBroker`] (in-memory or pgmq) where [`RemoteWorker`]s compete for them.

pub mod broker;
pub mod local;
pub mod message;
pub mod pgmq;
pub mod remote;
pub mod transport;

pub use broker::{InMemoryBroker, MessageBroker};
pub use local::LocalTransport;
pub use message::{BrokerMessage, CompletionReport, ReportOutcome, WorkRequest};
pub use pgmq::PgmqBroker;
pub use remote::{RemoteTransport, RemoteWorker};
pub use transport::Transport;
