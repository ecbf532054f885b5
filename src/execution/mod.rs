//! # Step Execution
//!
//! Work units, their tracker, the dispatcher control loop and the aggregated
//! step outcome.

pub mod context;
pub mod dispatcher;
pub mod outcome;
pub mod tracker;
pub mod work_unit;

pub use context::{ScheduledRange, StepExecutionContext};
pub use dispatcher::{Dispatcher, DispatcherBuilder, StopHandle};
pub use outcome::{FailedUnit, StepOutcome, StepStatus, UnitSummary};
pub use tracker::{ReplyDisposition, UnitTracker};
pub use work_unit::{UnitId, WorkUnit};
