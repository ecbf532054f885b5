use super::outcome::StepOutcome;
use super::work_unit::{UnitId, WorkUnit};
use crate::error::{DispatchError, DispatchResult};
use crate::messaging::{CompletionReport, WorkRequest};
use crate::partition::PartitionKeyRange;
use crate::state_machine::{UnitEvent, WorkUnitState};
use std::collections::HashMap;
use uuid::Uuid;

/// What happened to a reply handed to [`UnitTracker::on_reply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// The unit moved to this terminal state
    Applied(WorkUnitState),
    /// The unit was already terminal for this attempt
    Duplicate,
    /// The reply belongs to an attempt other than the current one
    StaleAttempt { current: u32 },
    /// No unit with this id belongs to the step
    Unknown,
    /// The unit has not been dispatched
    NotDispatched,
}

/// Owns the work units of one step execution.
///
/// Only the dispatcher's control loop mutates the tracker, so replies are applied
/// one at a time and a unit's state is never written concurrently.
#[derive(Debug)]
pub struct UnitTracker {
    step_name: String,
    execution_id: Uuid,
    units: HashMap<UnitId, WorkUnit>,
    order: Vec<UnitId>,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl UnitTracker {
    pub fn new(step_name: impl Into<String>, execution_id: Uuid) -> Self {
        Self {
            step_name: step_name.into(),
            execution_id,
            units: HashMap::new(),
            order: Vec::new(),
            started_at: chrono::Utc::now(),
        }
    }

    pub fn register(&mut self, range: PartitionKeyRange, attempt: u32) -> UnitId {
        let unit = WorkUnit::new(range, attempt);
        let id = unit.id();
        self.order.push(id);
        self.units.insert(id, unit);
        id
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &UnitId) -> Option<&WorkUnit> {
        self.units.get(id)
    }

    /// Units in registration order
    pub fn units(&self) -> impl Iterator<Item = &WorkUnit> + '_ {
        self.order.iter().filter_map(|id| self.units.get(id))
    }

    pub fn next_pending(&self) -> Option<UnitId> {
        self.units()
            .find(|u| u.state() == WorkUnitState::Pending)
            .map(WorkUnit::id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.units().filter(|u| u.state().is_active()).count()
    }

    pub fn all_terminal(&self) -> bool {
        self.units().all(|u| u.state().is_terminal())
    }

    pub fn non_terminal_ids(&self) -> Vec<UnitId> {
        self.units()
            .filter(|u| !u.state().is_terminal())
            .map(WorkUnit::id)
            .collect()
    }

    /// Move a pending unit in flight and build its request
    pub fn mark_in_flight(&mut self, id: &UnitId) -> DispatchResult<WorkRequest> {
        let Self {
            units, step_name, ..
        } = self;
        let unit = units
            .get_mut(id)
            .ok_or_else(|| DispatchError::invalid_argument(format!("unknown work unit {id}")))?;
        unit.apply(UnitEvent::Dispatch)?;
        Ok(unit.to_request(step_name))
    }

    /// Fail a unit whose request never reached a worker
    pub fn fail_unit(&mut self, id: &UnitId, error: &DispatchError) -> DispatchResult<WorkUnitState> {
        let unit = self.unit_mut(id)?;
        let state = unit.apply(UnitEvent::fail_with_error(error.to_string()))?;
        unit.set_error_kind(error.kind());
        Ok(state)
    }

    /// Apply a worker reply.
    ///
    /// Idempotent per `(unit_id, attempt)`: only the first reply for the current
    /// attempt of an in-flight unit changes anything.
    pub fn on_reply(&mut self, report: &CompletionReport) -> ReplyDisposition {
        let Some(unit) = self.units.get_mut(&report.unit_id) else {
            return ReplyDisposition::Unknown;
        };

        if report.attempt != unit.attempt() {
            return ReplyDisposition::StaleAttempt {
                current: unit.attempt(),
            };
        }

        match unit.state() {
            WorkUnitState::InFlight => {}
            state if state.is_terminal() => return ReplyDisposition::Duplicate,
            _ => return ReplyDisposition::NotDispatched,
        }

        let event = if report.is_success() {
            UnitEvent::Complete {
                items_processed: report.items_processed,
            }
        } else {
            UnitEvent::fail_with_error(
                report
                    .error
                    .clone()
                    .unwrap_or_else(|| "worker reported failure".to_string()),
            )
        };

        match unit.apply(event) {
            Ok(state) => {
                unit.record_report(report);
                ReplyDisposition::Applied(state)
            }
            Err(_) => ReplyDisposition::NotDispatched,
        }
    }

    pub fn outcome(&self, cancelled: bool) -> StepOutcome {
        StepOutcome::aggregate(
            self.step_name.clone(),
            self.execution_id,
            self.units(),
            cancelled,
            self.started_at,
        )
    }

    fn unit_mut(&mut self, id: &UnitId) -> DispatchResult<&mut WorkUnit> {
        self.units
            .get_mut(id)
            .ok_or_else(|| DispatchError::invalid_argument(format!("unknown work unit {id}")))
    }
}
