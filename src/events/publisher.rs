use crate::constants::events;
use crate::execution::{StepOutcome, StepStatus, UnitId, WorkUnit};
use crate::partition::PartitionKeyRange;
use crate::state_machine::WorkUnitState;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lifecycle events raised by the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DispatchEvent {
    /// A unit reached `Completed` or `Failed`
    UnitTerminal {
        step_name: String,
        unit_id: UnitId,
        attempt: u32,
        range: PartitionKeyRange,
        state: WorkUnitState,
        items_processed: i64,
        error: Option<String>,
    },
    /// The step outcome was finalized
    StepFinished {
        step_name: String,
        execution_id: Uuid,
        status: StepStatus,
        unit_count: usize,
        items_processed: i64,
        failed_units: Vec<UnitId>,
    },
    /// The step deadline passed with units still outstanding
    StepTimedOut {
        step_name: String,
        execution_id: Uuid,
        pending_units: Vec<UnitId>,
    },
}

impl DispatchEvent {
    pub fn unit_terminal(step_name: &str, unit: &WorkUnit) -> Self {
        Self::UnitTerminal {
            step_name: step_name.to_string(),
            unit_id: unit.id(),
            attempt: unit.attempt(),
            range: unit.range().clone(),
            state: unit.state(),
            items_processed: unit.items_processed(),
            error: unit.error().map(str::to_string),
        }
    }

    pub fn step_finished(outcome: &StepOutcome) -> Self {
        Self::StepFinished {
            step_name: outcome.step_name.clone(),
            execution_id: outcome.execution_id,
            status: outcome.status,
            unit_count: outcome.units.len(),
            items_processed: outcome.items_processed,
            failed_units: outcome.failed_units.iter().map(|f| f.unit_id).collect(),
        }
    }

    /// Event name as published to subscribers
    pub fn name(&self) -> &'static str {
        match self {
            Self::UnitTerminal { state, .. } => match state {
                WorkUnitState::Completed => events::UNIT_COMPLETED,
                _ => events::UNIT_FAILED,
            },
            Self::StepFinished { status, .. } => match status {
                StepStatus::Completed => events::STEP_COMPLETED,
                StepStatus::Failed => events::STEP_FAILED,
                StepStatus::Cancelled => events::STEP_CANCELLED,
            },
            Self::StepTimedOut { .. } => events::STEP_TIMED_OUT,
        }
    }
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: &'static str,
    pub event: DispatchEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

/// Broadcast publisher for dispatch lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: DispatchEvent) -> usize {
        let published = PublishedEvent {
            name: event.name(),
            event,
            published_at: chrono::Utc::now(),
        };

        // No subscribers is not an error for lifecycle events
        self.sender.send(published).unwrap_or(0)
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::UnitEvent;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let publisher = EventPublisher::new(8);
        let event = DispatchEvent::StepTimedOut {
            step_name: "load".to_string(),
            execution_id: Uuid::new_v4(),
            pending_units: vec![],
        };
        assert_eq!(publisher.publish(event), 0);
    }

    #[tokio::test]
    async fn test_unit_event_names_follow_state() {
        let publisher = EventPublisher::new(8);
        let mut receiver = publisher.subscribe();

        let mut unit = WorkUnit::new(PartitionKeyRange::new(0, 10, "partition0").unwrap(), 1);
        unit.apply(UnitEvent::Dispatch).unwrap();
        unit.apply(UnitEvent::fail_with_error("writer down")).unwrap();

        assert_eq!(publisher.publish(DispatchEvent::unit_terminal("load", &unit)), 1);
        let received = receiver.recv().await.unwrap();
        assert_eq!(received.name, events::UNIT_FAILED);
        assert!(matches!(
            received.event,
            DispatchEvent::UnitTerminal { state: WorkUnitState::Failed, .. }
        ));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = DispatchEvent::StepTimedOut {
            step_name: "load".to_string(),
            execution_id: Uuid::nil(),
            pending_units: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "StepTimedOut");
        assert_eq!(json["data"]["step_name"], "load");
    }
}
