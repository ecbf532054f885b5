// Work unit state machine
//
// Pending -> InFlight -> {Completed | Failed}. A retry is a new unit for the same
// range with the next attempt number. Transitions are applied only by the
// dispatcher's control task.

pub mod events;
pub mod states;
pub mod unit_state_machine;

pub use events::UnitEvent;
pub use states::WorkUnitState;
pub use unit_state_machine::determine_target_state;
