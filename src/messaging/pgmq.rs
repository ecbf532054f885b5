//! # PostgreSQL Message Queue Broker
//!
//! [`MessageBroker`] over pgmq, calling its SQL functions through a shared sqlx
//! pool. Messages are read with a visibility timeout and deleted straight away, so
//! a consumer that crashes between read and delete gets the message redelivered
//! once the timeout lapses.

use super::broker::MessageBroker;
use super::message::BrokerMessage;
use crate::error::{DispatchError, DispatchResult};
use crate::validation::validate_identifier;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PgmqBroker {
    pool: PgPool,
    visibility_timeout_seconds: i32,
    poll_interval_ms: i32,
}

impl PgmqBroker {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            visibility_timeout_seconds: 30,
            poll_interval_ms: 100,
        }
    }

    pub fn with_visibility_timeout(mut self, seconds: i32) -> Self {
        self.visibility_timeout_seconds = seconds.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().clamp(1, i32::MAX as u128) as i32;
        self
    }

    fn queue_error(queue: &str, operation: &str, error: sqlx::Error) -> DispatchError {
        DispatchError::transport(format!("{operation} {queue}"), error.to_string())
    }
}

#[async_trait]
impl MessageBroker for PgmqBroker {
    async fn ensure_queue(&self, queue: &str) -> DispatchResult<()> {
        validate_identifier(queue, "queue")?;
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::queue_error(queue, "create", e))?;
        info!(queue = queue, "pgmq queue ready");
        Ok(())
    }

    async fn publish(&self, queue: &str, message: BrokerMessage) -> DispatchResult<i64> {
        let body = serde_json::to_value(&message)?;
        let row = sqlx::query("SELECT * FROM pgmq.send($1, $2)")
            .bind(queue)
            .bind(body)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Self::queue_error(queue, "send", e))?;

        let message_id: i64 = row
            .try_get(0)
            .map_err(|e| Self::queue_error(queue, "send", e))?;
        debug!(queue = queue, message_id = message_id, "Sent pgmq message");
        Ok(message_id)
    }

    async fn consume(
        &self,
        queue: &str,
        max_messages: usize,
        wait: Duration,
    ) -> DispatchResult<Vec<BrokerMessage>> {
        let max_poll_seconds = wait.as_secs().clamp(1, i32::MAX as u64) as i32;
        let rows = sqlx::query(
            "SELECT msg_id, message FROM pgmq.read_with_poll($1, $2, $3, $4, $5)",
        )
        .bind(queue)
        .bind(self.visibility_timeout_seconds)
        .bind(max_messages.min(i32::MAX as usize) as i32)
        .bind(max_poll_seconds)
        .bind(self.poll_interval_ms)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::queue_error(queue, "read", e))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let message_id: i64 = row
                .try_get("msg_id")
                .map_err(|e| Self::queue_error(queue, "read", e))?;
            let body: Value = row
                .try_get("message")
                .map_err(|e| Self::queue_error(queue, "read", e))?;

            sqlx::query("SELECT pgmq.delete($1, $2)")
                .bind(queue)
                .bind(message_id)
                .execute(&self.pool)
                .await
                .map_err(|e| Self::queue_error(queue, "delete", e))?;

            let mut message: BrokerMessage = serde_json::from_value(body)?;
            message.message_id = Some(message_id);
            messages.push(message);
        }

        if !messages.is_empty() {
            debug!(queue = queue, count = messages.len(), "Consumed pgmq messages");
        }
        Ok(messages)
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
