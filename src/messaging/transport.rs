use super::message::{CompletionReport, WorkRequest};
use crate::error::DispatchResult;
use async_trait::async_trait;
use std::time::Duration;

/// Request/reply channel between a dispatcher and its workers.
///
/// Delivery is at-least-once: a request may reach a worker twice and a reply may
/// arrive twice or out of order. The dispatcher compensates; implementations only
/// need to guarantee each request goes to one worker (competing consumers).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand a request to exactly one worker
    async fn send_request(&self, request: WorkRequest) -> DispatchResult<()>;

    /// Wait up to `wait` for the next reply; `Ok(None)` when none arrived.
    ///
    /// The dispatcher always awaits the call to completion, so an implementation may
    /// acknowledge a reply with the broker before returning it.
    async fn next_reply(&self, wait: Duration) -> DispatchResult<Option<CompletionReport>>;

    /// Upper bound on useful in-flight units, `None` when the transport buffers freely
    fn max_concurrency(&self) -> Option<usize> {
        None
    }

    fn name(&self) -> &'static str;
}
