//! # Remote Dispatch
//!
//! Broker-backed request/reply queues. The dispatcher side ([`RemoteTransport`])
//! publishes one request per unit and consumes replies from its own reply queue;
//! the worker side ([`RemoteWorker`]) competes for requests and publishes one reply
//! per request it executes.

use super::broker::MessageBroker;
use super::message::{BrokerMessage, CompletionReport, WorkRequest};
use super::transport::Transport;
use crate::constants::headers;
use crate::error::DispatchResult;
use crate::worker::UnitExecutor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Dispatcher-side transport over a [`MessageBroker`]
pub struct RemoteTransport {
    broker: Arc<dyn MessageBroker>,
    request_queue: String,
    reply_queue: String,
}

impl RemoteTransport {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        request_queue: impl Into<String>,
        reply_queue: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            request_queue: request_queue.into(),
            reply_queue: reply_queue.into(),
        }
    }

    /// Declare the request and reply queues
    pub async fn initialize(&self) -> DispatchResult<()> {
        self.broker.ensure_queue(&self.request_queue).await?;
        self.broker.ensure_queue(&self.reply_queue).await?;
        info!(
            provider = self.broker.provider_name(),
            request_queue = %self.request_queue,
            reply_queue = %self.reply_queue,
            "Remote transport initialized"
        );
        Ok(())
    }

    pub fn request_queue(&self) -> &str {
        &self.request_queue
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn send_request(&self, request: WorkRequest) -> DispatchResult<()> {
        let message = BrokerMessage::from_request(&request, &self.reply_queue)?;
        let message_id = self.broker.publish(&self.request_queue, message).await?;
        debug!(
            unit_id = %request.unit_id,
            attempt = request.attempt,
            message_id = message_id,
            queue = %self.request_queue,
            "Published work request"
        );
        Ok(())
    }

    async fn next_reply(&self, wait: Duration) -> DispatchResult<Option<CompletionReport>> {
        let mut messages = self.broker.consume(&self.reply_queue, 1, wait).await?;
        match messages.pop() {
            Some(message) => message.into_report().map(Some),
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Worker-side loop: consume requests, execute, publish replies
pub struct RemoteWorker {
    broker: Arc<dyn MessageBroker>,
    executor: Arc<dyn UnitExecutor>,
    request_queue: String,
    default_reply_queue: String,
    poll_wait: Duration,
    worker_id: String,
}

impl RemoteWorker {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        executor: Arc<dyn UnitExecutor>,
        request_queue: impl Into<String>,
        default_reply_queue: impl Into<String>,
    ) -> Self {
        Self {
            broker,
            executor,
            request_queue: request_queue.into(),
            default_reply_queue: default_reply_queue.into(),
            poll_wait: Duration::from_millis(100),
            worker_id: format!("remote-worker-{}", uuid::Uuid::new_v4()),
        }
    }

    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Run until `shutdown` turns true; returns the number of requests handled.
    ///
    /// A redelivered request is simply executed again: the chunk writer's upsert
    /// semantics and the dispatcher's duplicate-reply handling absorb the repeat.
    /// Broker errors are logged and retried after `poll_wait`; they never end the
    /// loop.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> DispatchResult<u64> {
        info!(
            worker_id = %self.worker_id,
            queue = %self.request_queue,
            "Remote worker listening for requests"
        );
        let mut handled = 0u64;

        // Consumes run to completion so a request taken off the queue is never dropped
        while !*shutdown.borrow() && shutdown.has_changed().is_ok() {
            let messages = match self.broker.consume(&self.request_queue, 1, self.poll_wait).await {
                Ok(messages) => messages,
                Err(error) => {
                    warn!(
                        worker_id = %self.worker_id,
                        queue = %self.request_queue,
                        error = %error,
                        "Failed to consume requests; backing off"
                    );
                    tokio::time::sleep(self.poll_wait).await;
                    continue;
                }
            };

            for message in messages {
                let reply_queue = message
                    .header(headers::REPLY_TO)
                    .unwrap_or(self.default_reply_queue.as_str())
                    .to_string();
                let request = match message.into_request() {
                    Ok(request) => request,
                    Err(error) => {
                        warn!(worker_id = %self.worker_id, error = %error, "Discarding undecodable request");
                        continue;
                    }
                };

                let report = self.executor.execute(&request).await.with_worker_id(&self.worker_id);
                self.publish_reply(&reply_queue, &report, &shutdown).await;
                handled += 1;
            }
        }

        info!(worker_id = %self.worker_id, handled = handled, "Remote worker stopped");
        Ok(handled)
    }

    /// Publish a reply, retrying failed publishes until one succeeds or shutdown
    async fn publish_reply(
        &self,
        reply_queue: &str,
        report: &CompletionReport,
        shutdown: &watch::Receiver<bool>,
    ) {
        let reply = match BrokerMessage::from_report(report) {
            Ok(reply) => reply,
            Err(error) => {
                error!(unit_id = %report.unit_id, error = %error, "Could not encode reply");
                return;
            }
        };

        let mut attempt = 1u32;
        loop {
            match self.broker.publish(reply_queue, reply.clone()).await {
                Ok(_) => return,
                Err(error) if *shutdown.borrow() => {
                    error!(
                        worker_id = %self.worker_id,
                        unit_id = %report.unit_id,
                        error = %error,
                        "Dropping reply at shutdown"
                    );
                    return;
                }
                Err(error) => {
                    warn!(
                        worker_id = %self.worker_id,
                        unit_id = %report.unit_id,
                        queue = reply_queue,
                        attempt = attempt,
                        error = %error,
                        "Failed to publish reply; retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.poll_wait).await;
                }
            }
        }
    }

    /// Run on a background task
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<DispatchResult<u64>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
