use super::outcome::StepOutcome;
use crate::error::{DispatchError, DispatchResult};
use crate::partition::PartitionKeyRange;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A range scheduled for dispatch together with the attempt it will run as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRange {
    pub range: PartitionKeyRange,
    pub attempt: u32,
}

/// Input and result of one step execution.
///
/// Serializable so a caller can persist it between a failed run and its replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionContext {
    step_name: String,
    execution_id: Uuid,
    scheduled: Vec<ScheduledRange>,
    outcome: Option<StepOutcome>,
}

impl StepExecutionContext {
    pub fn new(step_name: impl Into<String>, ranges: Vec<PartitionKeyRange>) -> Self {
        Self {
            step_name: step_name.into(),
            execution_id: Uuid::new_v4(),
            scheduled: ranges
                .into_iter()
                .map(|range| ScheduledRange { range, attempt: 1 })
                .collect(),
            outcome: None,
        }
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn scheduled(&self) -> &[ScheduledRange] {
        &self.scheduled
    }

    pub fn ranges(&self) -> Vec<PartitionKeyRange> {
        self.scheduled.iter().map(|s| s.range.clone()).collect()
    }

    pub fn outcome(&self) -> Option<&StepOutcome> {
        self.outcome.as_ref()
    }

    pub fn into_outcome(self) -> Option<StepOutcome> {
        self.outcome
    }

    /// Attempt number scheduled for the range with these bounds
    pub fn attempt_for(&self, range: &PartitionKeyRange) -> Option<u32> {
        self.scheduled
            .iter()
            .find(|s| s.range.same_bounds(range))
            .map(|s| s.attempt)
    }

    /// Smallest and largest key covered by the scheduled ranges
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let lower = self.scheduled.iter().map(|s| s.range.lower_bound()).min()?;
        let upper = self.scheduled.iter().map(|s| s.range.last_key()).max()?;
        Some((lower, upper))
    }

    pub(crate) fn with_outcome(mut self, outcome: StepOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Context replaying every range that did not complete, each with its
    /// attempt counter advanced.
    pub fn for_retry(&self) -> DispatchResult<StepExecutionContext> {
        let outcome = self.outcome.as_ref().ok_or_else(|| {
            DispatchError::invalid_argument(format!(
                "step {} has not finished; nothing to retry",
                self.step_name
            ))
        })?;

        let scheduled = outcome
            .unfinished_ranges()
            .into_iter()
            .map(|range| {
                let attempt = self.attempt_for(&range).unwrap_or(1) + 1;
                ScheduledRange { range, attempt }
            })
            .collect();

        Ok(Self {
            step_name: self.step_name.clone(),
            execution_id: Uuid::new_v4(),
            scheduled,
            outcome: None,
        })
    }
}
