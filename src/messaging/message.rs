//! # Dispatch Message Structures
//!
//! Request and reply payloads exchanged between the dispatcher and workers, and the
//! broker envelope that carries them over request/reply queues. The `(unit_id,
//! attempt)` pair travels both in the payload and in the envelope headers so replies
//! can be matched without decoding the body.

use crate::constants::headers;
use crate::error::{DispatchError, DispatchResult};
use crate::execution::UnitId;
use crate::partition::PartitionKeyRange;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Assignment of one key range to one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRequest {
    pub unit_id: UnitId,
    pub attempt: u32,
    pub step_name: String,
    pub range: PartitionKeyRange,
    /// When the dispatcher handed the request to the transport
    pub dispatched_at: chrono::DateTime<chrono::Utc>,
    /// Correlation ID for tracing a unit across processes
    pub correlation_id: Uuid,
}

impl WorkRequest {
    pub fn new(
        unit_id: UnitId,
        attempt: u32,
        step_name: impl Into<String>,
        range: PartitionKeyRange,
    ) -> Self {
        Self {
            unit_id,
            attempt,
            step_name: step_name.into(),
            range,
            dispatched_at: chrono::Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Message age in milliseconds
    pub fn age_ms(&self) -> u64 {
        chrono::Utc::now()
            .signed_duration_since(self.dispatched_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

/// Outcome reported by a worker for one unit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportOutcome {
    Success,
    Failure,
}

/// The single reply a worker emits per unit attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub unit_id: UnitId,
    pub attempt: u32,
    pub outcome: ReportOutcome,
    /// Items committed by the writer during this attempt
    pub items_processed: i64,
    pub error: Option<String>,
    /// Category from [`DispatchError::kind`] when the attempt failed
    pub error_kind: Option<String>,
    pub worker_id: Option<String>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

impl CompletionReport {
    pub fn success(request: &WorkRequest, items_processed: i64) -> Self {
        Self {
            unit_id: request.unit_id,
            attempt: request.attempt,
            outcome: ReportOutcome::Success,
            items_processed,
            error: None,
            error_kind: None,
            worker_id: None,
            completed_at: chrono::Utc::now(),
        }
    }

    pub fn failure(request: &WorkRequest, items_processed: i64, error: &DispatchError) -> Self {
        Self {
            unit_id: request.unit_id,
            attempt: request.attempt,
            outcome: ReportOutcome::Failure,
            items_processed,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
            worker_id: None,
            completed_at: chrono::Utc::now(),
        }
    }

    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ReportOutcome::Success
    }
}

/// Broker envelope: string headers plus a JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerMessage {
    /// Broker-assigned id, absent until published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<i64>,
    pub headers: HashMap<String, String>,
    pub payload: Value,
}

impl BrokerMessage {
    pub fn new(headers: HashMap<String, String>, payload: Value) -> Self {
        Self {
            message_id: None,
            headers,
            payload,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Encode a request, routing its reply to `reply_queue`
    pub fn from_request(request: &WorkRequest, reply_queue: &str) -> DispatchResult<Self> {
        let mut headers = Self::unit_headers(&request.unit_id, request.attempt);
        headers.insert(headers::REPLY_TO.to_string(), reply_queue.to_string());
        headers.insert(headers::STEP_NAME.to_string(), request.step_name.clone());
        headers.insert(
            headers::CORRELATION_ID.to_string(),
            request.correlation_id.to_string(),
        );
        Ok(Self::new(headers, serde_json::to_value(request)?))
    }

    pub fn from_report(report: &CompletionReport) -> DispatchResult<Self> {
        let headers = Self::unit_headers(&report.unit_id, report.attempt);
        Ok(Self::new(headers, serde_json::to_value(report)?))
    }

    pub fn into_request(self) -> DispatchResult<WorkRequest> {
        let request: WorkRequest = serde_json::from_value(self.payload.clone())?;
        self.verify_unit_headers(&request.unit_id, request.attempt)?;
        Ok(request)
    }

    pub fn into_report(self) -> DispatchResult<CompletionReport> {
        let report: CompletionReport = serde_json::from_value(self.payload.clone())?;
        self.verify_unit_headers(&report.unit_id, report.attempt)?;
        Ok(report)
    }

    fn unit_headers(unit_id: &UnitId, attempt: u32) -> HashMap<String, String> {
        HashMap::from([
            (headers::UNIT_ID.to_string(), unit_id.to_string()),
            (headers::ATTEMPT.to_string(), attempt.to_string()),
        ])
    }

    /// Headers must agree with the payload they describe
    fn verify_unit_headers(&self, unit_id: &UnitId, attempt: u32) -> DispatchResult<()> {
        let header_unit = self.header(headers::UNIT_ID);
        let header_attempt = self.header(headers::ATTEMPT);
        let expected_unit = unit_id.to_string();
        let expected_attempt = attempt.to_string();

        if header_unit != Some(expected_unit.as_str())
            || header_attempt != Some(expected_attempt.as_str())
        {
            return Err(DispatchError::serialization(format!(
                "message headers ({header_unit:?}, {header_attempt:?}) do not match payload ({expected_unit}, {expected_attempt})"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> WorkRequest {
        WorkRequest::new(
            UnitId::new(),
            2,
            "remote_step",
            PartitionKeyRange::new(1000, 2000, "partition1").unwrap(),
        )
    }

    #[test]
    fn test_request_envelope_carries_matching_headers() {
        let request = request();
        let message = BrokerMessage::from_request(&request, "replies").unwrap();

        assert_eq!(
            message.header(headers::UNIT_ID),
            Some(request.unit_id.to_string().as_str())
        );
        assert_eq!(message.header(headers::ATTEMPT), Some("2"));
        assert_eq!(message.header(headers::REPLY_TO), Some("replies"));
        assert_eq!(message.into_request().unwrap(), request);
    }

    #[test]
    fn test_mismatched_headers_rejected() {
        let request = request();
        let report = CompletionReport::success(&request, 1000);
        let mut message = BrokerMessage::from_report(&report).unwrap();
        message
            .headers
            .insert(headers::ATTEMPT.to_string(), "3".to_string());

        assert!(matches!(
            message.into_report(),
            Err(DispatchError::Serialization { .. })
        ));
    }

    #[test]
    fn test_failure_report_records_error_kind() {
        let request = request();
        let error = DispatchError::mapping(Some(1500), "bad birthdate");
        let report = CompletionReport::failure(&request, 0, &error);

        assert!(!report.is_success());
        assert_eq!(report.error_kind.as_deref(), Some("mapping_error"));
        assert!(report.error.unwrap().contains("1500"));
    }
}
