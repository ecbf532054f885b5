use super::events::UnitEvent;
use super::states::WorkUnitState;
use crate::error::{DispatchError, DispatchResult};

/// Transition table for work units.
///
/// `Completed` and `Failed` are final for a unit. A failed range is retried as a new
/// unit with the next attempt number, never by resetting the old one.
pub fn determine_target_state(
    current_state: WorkUnitState,
    event: &UnitEvent,
) -> DispatchResult<WorkUnitState> {
    let target = match (current_state, event) {
        (WorkUnitState::Pending, UnitEvent::Dispatch) => WorkUnitState::InFlight,

        (WorkUnitState::InFlight, UnitEvent::Complete { .. }) => WorkUnitState::Completed,

        (WorkUnitState::InFlight, UnitEvent::Fail(_)) => WorkUnitState::Failed,
        // Dispatch itself failed before the request left
        (WorkUnitState::Pending, UnitEvent::Fail(_)) => WorkUnitState::Failed,

        (from_state, _) => {
            return Err(DispatchError::StateTransition {
                from: from_state.to_string(),
                event: event.event_type().to_string(),
            })
        }
    };

    Ok(target)
}
