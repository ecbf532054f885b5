//! Aggregated result of one partitioned step.
//!
//! A [`StepOutcome`] is assembled once every unit is terminal (or the step was
//! cancelled). It keeps a per-unit summary so that failed ranges can be replayed
//! and the retry's outcome folded back into the original with [`StepOutcome::merge`].

use super::work_unit::{UnitId, WorkUnit};
use crate::partition::PartitionKeyRange;
use crate::state_machine::WorkUnitState;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Every unit completed
    Completed,
    /// At least one unit failed
    Failed,
    /// Stopped before every unit finished
    Cancelled,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Final view of one unit inside an outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit_id: UnitId,
    pub range: PartitionKeyRange,
    pub attempt: u32,
    pub state: WorkUnitState,
    pub items_processed: i64,
    pub worker_id: Option<String>,
}

impl From<&WorkUnit> for UnitSummary {
    fn from(unit: &WorkUnit) -> Self {
        Self {
            unit_id: unit.id(),
            range: unit.range().clone(),
            attempt: unit.attempt(),
            state: unit.state(),
            items_processed: unit.items_processed(),
            worker_id: unit.worker_id().map(str::to_string),
        }
    }
}

/// A unit that ended in `Failed`, with the range needed to replay it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedUnit {
    pub unit_id: UnitId,
    pub range: PartitionKeyRange,
    pub attempt: u32,
    pub error: String,
    pub error_kind: Option<String>,
}

impl FailedUnit {
    pub(crate) fn from_unit(unit: &WorkUnit) -> Self {
        Self {
            unit_id: unit.id(),
            range: unit.range().clone(),
            attempt: unit.attempt(),
            error: unit
                .error()
                .unwrap_or("unit failed without an error message")
                .to_string(),
            error_kind: unit.error_kind().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_name: String,
    pub execution_id: Uuid,
    pub status: StepStatus,
    pub units: Vec<UnitSummary>,
    pub failed_units: Vec<FailedUnit>,
    /// Items committed across all units
    pub items_processed: i64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl StepOutcome {
    /// Build an outcome from the final unit snapshot
    pub fn aggregate<'a>(
        step_name: impl Into<String>,
        execution_id: Uuid,
        units: impl IntoIterator<Item = &'a WorkUnit>,
        cancelled: bool,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let mut summaries = Vec::new();
        let mut failed_units = Vec::new();

        for unit in units {
            if unit.state() == WorkUnitState::Failed {
                failed_units.push(FailedUnit::from_unit(unit));
            }
            summaries.push(UnitSummary::from(unit));
        }

        let status = Self::derive_status(&summaries, cancelled);
        let items_processed = summaries.iter().map(|u| u.items_processed).sum();

        Self {
            step_name: step_name.into(),
            execution_id,
            status,
            units: summaries,
            failed_units,
            items_processed,
            started_at,
            finished_at: chrono::Utc::now(),
        }
    }

    /// A stopped step is `Cancelled` whatever its in-flight units later report
    fn derive_status(units: &[UnitSummary], cancelled: bool) -> StepStatus {
        if cancelled && !units.is_empty() {
            StepStatus::Cancelled
        } else if units.iter().all(|u| u.state == WorkUnitState::Completed) {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == StepStatus::Cancelled
    }

    /// Ranges of units that ended in `Failed`
    pub fn failed_ranges(&self) -> Vec<PartitionKeyRange> {
        self.failed_units.iter().map(|f| f.range.clone()).collect()
    }

    /// Ranges of every unit that did not complete, including those a
    /// cancellation left pending
    pub fn unfinished_ranges(&self) -> Vec<PartitionKeyRange> {
        self.units
            .iter()
            .filter(|u| u.state != WorkUnitState::Completed)
            .map(|u| u.range.clone())
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.state == WorkUnitState::Completed)
            .count()
    }

    pub fn duration_ms(&self) -> i64 {
        self.finished_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// Fold a replay of some of this outcome's ranges back into it.
    ///
    /// Units from `retry` replace the units with the same bounds; the status and
    /// totals are recomputed from the merged unit list.
    pub fn merge(self, retry: StepOutcome) -> StepOutcome {
        let mut units = self.units;
        let mut failed_units = self.failed_units;
        failed_units.extend(retry.failed_units);

        for replayed in retry.units {
            match units
                .iter_mut()
                .find(|u| u.range.same_bounds(&replayed.range))
            {
                Some(slot) => *slot = replayed,
                None => units.push(replayed),
            }
        }

        failed_units.retain(|failed| {
            units
                .iter()
                .any(|u| u.unit_id == failed.unit_id && u.state == WorkUnitState::Failed)
        });

        // Every range completed across both runs is a completed step
        let status = if units.iter().all(|u| u.state == WorkUnitState::Completed) {
            StepStatus::Completed
        } else if retry.status == StepStatus::Cancelled {
            StepStatus::Cancelled
        } else {
            StepStatus::Failed
        };
        let items_processed = units.iter().map(|u| u.items_processed).sum();

        StepOutcome {
            step_name: self.step_name,
            execution_id: self.execution_id,
            status,
            units,
            failed_units,
            items_processed,
            started_at: self.started_at,
            finished_at: retry.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::UnitEvent;

    fn finished(lower: i64, upper: i64, label: &str, attempt: u32, ok: bool) -> WorkUnit {
        let mut unit = WorkUnit::new(PartitionKeyRange::new(lower, upper, label).unwrap(), attempt);
        unit.apply(UnitEvent::Dispatch).unwrap();
        if ok {
            unit.apply(UnitEvent::Complete {
                items_processed: upper - lower,
            })
            .unwrap();
        } else {
            unit.apply(UnitEvent::fail_with_error("mapping failed")).unwrap();
        }
        unit
    }

    fn outcome(units: &[WorkUnit], cancelled: bool) -> StepOutcome {
        StepOutcome::aggregate("load", Uuid::new_v4(), units, cancelled, chrono::Utc::now())
    }

    #[test]
    fn test_aggregate_all_completed() {
        let units = vec![finished(0, 10, "p0", 1, true), finished(10, 20, "p1", 1, true)];
        let outcome = outcome(&units, false);

        assert!(outcome.is_completed());
        assert_eq!(outcome.items_processed, 20);
        assert!(outcome.failed_units.is_empty());
    }

    #[test]
    fn test_aggregate_reports_failed_ranges() {
        let units = vec![finished(0, 10, "p0", 1, true), finished(10, 20, "p1", 1, false)];
        let outcome = outcome(&units, false);

        assert!(outcome.is_failed());
        let failed = outcome.failed_ranges();
        assert_eq!(failed.len(), 1);
        assert_eq!((failed[0].lower_bound(), failed[0].upper_bound()), (10, 20));
        assert_eq!(outcome.failed_units[0].error, "mapping failed");
    }

    #[test]
    fn test_cancelled_keeps_pending_ranges_replayable() {
        let pending = WorkUnit::new(PartitionKeyRange::new(10, 20, "p1").unwrap(), 1);
        let units = vec![finished(0, 10, "p0", 1, true), pending];
        let outcome = outcome(&units, true);

        assert!(outcome.is_cancelled());
        assert!(outcome.failed_ranges().is_empty());
        assert_eq!(outcome.unfinished_ranges().len(), 1);
    }

    #[test]
    fn test_stop_with_every_unit_finished_is_still_cancelled() {
        let units = vec![finished(0, 10, "p0", 1, true), finished(10, 20, "p1", 1, true)];
        let outcome = outcome(&units, true);

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.completed_count(), 2);
        assert!(outcome.unfinished_ranges().is_empty());
    }

    #[test]
    fn test_stop_on_empty_step_completes() {
        assert!(outcome(&[], true).is_completed());
    }

    #[test]
    fn test_merge_of_cancelled_step_completes_once_every_range_did() {
        let pending = WorkUnit::new(PartitionKeyRange::new(10, 20, "p1").unwrap(), 1);
        let original = outcome(&[finished(0, 10, "p0", 1, true), pending], true);
        let retry = outcome(&[finished(10, 20, "p1", 2, true)], false);

        let merged = original.merge(retry);
        assert!(merged.is_completed());
        assert_eq!(merged.items_processed, 20);
    }

    #[test]
    fn test_merge_replaces_replayed_units() {
        let original = outcome(
            &[finished(0, 10, "p0", 1, true), finished(10, 20, "p1", 1, false)],
            false,
        );
        let retry = outcome(&[finished(10, 20, "p1", 2, true)], false);

        let merged = original.merge(retry);
        assert!(merged.is_completed());
        assert_eq!(merged.units.len(), 2);
        assert_eq!(merged.items_processed, 20);
        assert!(merged.failed_units.is_empty());
        assert_eq!(merged.units[1].attempt, 2);
    }

    #[test]
    fn test_merge_keeps_failure_when_retry_fails() {
        let original = outcome(
            &[finished(0, 10, "p0", 1, true), finished(10, 20, "p1", 1, false)],
            false,
        );
        let retry = outcome(&[finished(10, 20, "p1", 2, false)], false);

        let merged = original.merge(retry);
        assert!(merged.is_failed());
        assert_eq!(merged.failed_units.len(), 1);
        assert_eq!(merged.failed_units[0].attempt, 2);
    }
}
