//! # Dispatch Constants
//!
//! Header names carried on broker envelopes, lifecycle event names, and the
//! defaults that [`crate::config::DispatchConfig`] falls back to.

/// Envelope headers set on every request and reply
pub mod headers {
    pub const UNIT_ID: &str = "unit_id";
    pub const ATTEMPT: &str = "attempt";
    pub const REPLY_TO: &str = "reply_to";
    pub const STEP_NAME: &str = "step_name";
    pub const CORRELATION_ID: &str = "correlation_id";
}

/// Lifecycle events published by the dispatcher
pub mod events {
    pub const UNIT_COMPLETED: &str = "unit.completed";
    pub const UNIT_FAILED: &str = "unit.failed";

    pub const STEP_COMPLETED: &str = "step.completed";
    pub const STEP_FAILED: &str = "step.failed";
    pub const STEP_CANCELLED: &str = "step.cancelled";
    pub const STEP_TIMED_OUT: &str = "step.timed_out";
}

pub mod defaults {
    pub const STEP_NAME: &str = "partitioned_step";
    pub const GRID_SIZE: u32 = 4;
    pub const CHUNK_SIZE: usize = 1000;
    pub const LOCAL_WORKERS: usize = 4;
    pub const STEP_TIMEOUT_MS: u64 = 300_000;
    pub const REPLY_POLL_INTERVAL_MS: u64 = 250;
    pub const REQUEST_QUEUE: &str = "dispatch_requests";
    pub const REPLY_QUEUE: &str = "dispatch_replies";
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
    pub const QUEUE_CAPACITY: usize = 256;
}
