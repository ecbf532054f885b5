//! # Dispatch Error Types
//!
//! Structured error taxonomy for partitioning, worker execution and dispatch,
//! built on thiserror rather than `Box<dyn Error>` plumbing.
//!
//! Only [`DispatchError::InvalidArgument`] and [`DispatchError::StepTimeout`] are
//! ever returned from `Dispatcher::start`. Every other variant is unit-level: it is
//! folded into the failing unit's completion report and surfaces through the
//! step outcome's failed-unit set.

use crate::execution::UnitId;
use thiserror::Error;

/// Comprehensive dispatch error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Mapping error at key {key:?}: {message}")]
    MappingError { key: Option<i64>, message: String },

    #[error("Processing error: {message}")]
    ProcessingError { message: String },

    #[error("Writer failure: {message}")]
    WriterFailure { message: String },

    #[error("Step timed out after {timeout_ms}ms with {} non-terminal units", .pending_units.len())]
    StepTimeout {
        timeout_ms: u64,
        pending_units: Vec<UnitId>,
    },

    #[error("Transport failure: {operation}: {message}")]
    TransportFailure { operation: String, message: String },

    #[error("Invalid state transition from {from} on {event}")]
    StateTransition { from: String, event: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Database error: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl DispatchError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a row mapping error, optionally tagged with the offending key
    pub fn mapping(key: Option<i64>, message: impl Into<String>) -> Self {
        Self::MappingError {
            key,
            message: message.into(),
        }
    }

    /// Create an item processing error
    pub fn processing(message: impl Into<String>) -> Self {
        Self::ProcessingError {
            message: message.into(),
        }
    }

    /// Create a chunk writer failure
    pub fn writer(message: impl Into<String>) -> Self {
        Self::WriterFailure {
            message: message.into(),
        }
    }

    /// Create a transport failure
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a database error
    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Stable category name used in completion reports and events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::MappingError { .. } => "mapping_error",
            Self::ProcessingError { .. } => "processing_error",
            Self::WriterFailure { .. } => "writer_failure",
            Self::StepTimeout { .. } => "step_timeout",
            Self::TransportFailure { .. } => "transport_failure",
            Self::StateTransition { .. } => "state_transition",
            Self::Configuration { .. } => "configuration",
            Self::Database { .. } => "database",
            Self::Serialization { .. } => "serialization",
        }
    }

    /// Whether this error fails a single unit rather than the whole step call
    pub fn is_unit_level(&self) -> bool {
        !matches!(
            self,
            Self::InvalidArgument { .. } | Self::StepTimeout { .. } | Self::Configuration { .. }
        )
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization(error.to_string())
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(error: sqlx::Error) -> Self {
        Self::database("query", error.to_string())
    }
}

impl From<config::ConfigError> for DispatchError {
    fn from(error: config::ConfigError) -> Self {
        Self::configuration("config_loader", error.to_string())
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
