use crate::error::DispatchResult;
use crate::messaging::{CompletionReport, WorkRequest};
use crate::partition::PartitionKeyRange;
use crate::state_machine::{determine_target_state, UnitEvent, WorkUnitState};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of one work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(Uuid);

impl UnitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UnitId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Dispatcher-owned record of one range assignment
#[derive(Debug, Clone)]
pub struct WorkUnit {
    id: UnitId,
    range: PartitionKeyRange,
    state: WorkUnitState,
    attempt: u32,
    items_processed: i64,
    error: Option<String>,
    error_kind: Option<String>,
    worker_id: Option<String>,
    dispatched_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl WorkUnit {
    pub fn new(range: PartitionKeyRange, attempt: u32) -> Self {
        Self {
            id: UnitId::new(),
            range,
            state: WorkUnitState::Pending,
            attempt: attempt.max(1),
            items_processed: 0,
            error: None,
            error_kind: None,
            worker_id: None,
            dispatched_at: None,
            finished_at: None,
        }
    }

    /// Apply an event through the transition table
    pub fn apply(&mut self, event: UnitEvent) -> DispatchResult<WorkUnitState> {
        let target = determine_target_state(self.state, &event)?;
        let now = chrono::Utc::now();

        match event {
            UnitEvent::Dispatch => {
                self.dispatched_at = Some(now);
            }
            UnitEvent::Complete { items_processed } => {
                self.items_processed = items_processed;
                self.finished_at = Some(now);
            }
            UnitEvent::Fail(message) => {
                self.error = Some(message);
                self.finished_at = Some(now);
            }
        }

        self.state = target;
        Ok(target)
    }

    /// Carry reply details that the transition event does not hold
    pub(crate) fn record_report(&mut self, report: &CompletionReport) {
        self.items_processed = report.items_processed;
        self.error_kind = report.error_kind.clone();
        self.worker_id = report.worker_id.clone();
    }

    pub(crate) fn set_error_kind(&mut self, kind: &str) {
        self.error_kind = Some(kind.to_string());
    }

    pub fn to_request(&self, step_name: &str) -> WorkRequest {
        WorkRequest::new(self.id, self.attempt, step_name, self.range.clone())
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn range(&self) -> &PartitionKeyRange {
        &self.range
    }

    pub fn state(&self) -> WorkUnitState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn items_processed(&self) -> i64 {
        self.items_processed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<&str> {
        self.error_kind.as_deref()
    }

    pub fn worker_id(&self) -> Option<&str> {
        self.worker_id.as_deref()
    }

    /// Time between dispatch and terminal report
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.dispatched_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_milliseconds()),
            _ => None,
        }
    }
}
