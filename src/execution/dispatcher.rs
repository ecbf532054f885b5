//! # Dispatcher
//!
//! Coordinates one partitioned step: registers a unit per range, hands units to the
//! transport without exceeding the in-flight limit, and consumes replies until every
//! unit is terminal, the step is stopped, or the deadline passes.
//!
//! A single control loop owns the [`UnitTracker`], so replies are applied one at a
//! time and unit state has exactly one writer.

use super::context::StepExecutionContext;
use super::outcome::StepOutcome;
use super::tracker::{ReplyDisposition, UnitTracker};
use super::work_unit::UnitId;
use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::events::{DispatchEvent, EventPublisher};
use crate::logging::{log_step_operation, log_unit_operation};
use crate::messaging::{CompletionReport, Transport};
use crate::partition::{ensure_disjoint, PartitionKeyRange, RangePartitioner};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Requests that the running step stop dispatching.
///
/// Units already in flight run to completion; their replies are still recorded but
/// the outcome is `Cancelled`.
#[derive(Debug, Clone)]
pub struct StopHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.signal.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.signal.borrow()
    }
}

/// Explicit construction of a [`Dispatcher`]
pub struct DispatcherBuilder {
    config: DispatchConfig,
    transport: Option<Arc<dyn Transport>>,
    events: Option<EventPublisher>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            transport: None,
            events: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn event_publisher(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> DispatchResult<Dispatcher> {
        self.config.validate()?;
        let transport = self
            .transport
            .ok_or_else(|| DispatchError::configuration("transport", "no transport configured"))?;
        let events = self
            .events
            .unwrap_or_else(|| EventPublisher::new(self.config.event_channel_capacity));
        let (stop_tx, _) = watch::channel(false);

        Ok(Dispatcher {
            config: self.config,
            partitioner: RangePartitioner,
            transport,
            events,
            stop_signal: Arc::new(stop_tx),
            run_lock: Mutex::new(()),
        })
    }
}

pub struct Dispatcher {
    config: DispatchConfig,
    partitioner: RangePartitioner,
    transport: Arc<dyn Transport>,
    events: EventPublisher,
    stop_signal: Arc<watch::Sender<bool>>,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("step_name", &self.config.step_name)
            .field("transport", &self.transport.name())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, transport: Arc<dyn Transport>) -> DispatchResult<Self> {
        DispatcherBuilder::new(config).transport(transport).build()
    }

    pub fn builder(config: DispatchConfig) -> DispatcherBuilder {
        DispatcherBuilder::new(config)
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            signal: Arc::clone(&self.stop_signal),
        }
    }

    /// Split `[min, max]` into the configured number of partitions
    pub fn partition(&self, min: i64, max: i64) -> DispatchResult<Vec<PartitionKeyRange>> {
        let grid_size = i32::try_from(self.config.grid_size).map_err(|_| {
            DispatchError::invalid_argument(format!("grid size {} too large", self.config.grid_size))
        })?;
        self.partitioner.partition(min, max, grid_size)
    }

    /// Dispatch one unit per range and wait for the aggregated outcome.
    ///
    /// Raises only `InvalidArgument` (overlapping ranges) and `StepTimeout`; unit
    /// failures are reported inside the outcome.
    pub async fn start(&self, ranges: Vec<PartitionKeyRange>) -> DispatchResult<StepOutcome> {
        let context = StepExecutionContext::new(self.config.step_name.clone(), ranges);
        self.run_step(&context).await
    }

    /// Partition `[min, max]` by the configured grid size and run the step
    pub async fn start_bounded(&self, min: i64, max: i64) -> DispatchResult<StepOutcome> {
        let ranges = self.partition(min, max)?;
        self.start(ranges).await
    }

    /// Run the ranges scheduled in `context` and return it carrying the outcome
    pub async fn execute(
        &self,
        context: StepExecutionContext,
    ) -> DispatchResult<StepExecutionContext> {
        let outcome = self.run_step(&context).await?;
        Ok(context.with_outcome(outcome))
    }

    fn in_flight_limit(&self) -> Option<usize> {
        match (self.config.max_in_flight, self.transport.max_concurrency()) {
            (Some(configured), Some(transport)) => Some(configured.min(transport)),
            (configured, transport) => configured.or(transport),
        }
    }

    async fn run_step(&self, context: &StepExecutionContext) -> DispatchResult<StepOutcome> {
        ensure_disjoint(&context.ranges())?;

        // One step at a time per dispatcher; the stop signal is shared
        let _running = self.run_lock.lock().await;

        let mut tracker = UnitTracker::new(context.step_name(), context.execution_id());
        for scheduled in context.scheduled() {
            tracker.register(scheduled.range.clone(), scheduled.attempt);
        }

        self.stop_signal.send_replace(false);
        let mut stop_rx = self.stop_signal.subscribe();
        let limit = self.in_flight_limit();
        let timeout = self.config.step_timeout();
        let poll_interval = self.config.reply_poll_interval();
        let deadline = Instant::now() + timeout;
        let mut cancelled = false;

        log_step_operation(
            "start",
            tracker.step_name(),
            tracker.len(),
            "started",
            Some(&format!(
                "transport={} max_in_flight={limit:?}",
                self.transport.name()
            )),
        );

        loop {
            if !cancelled && *stop_rx.borrow_and_update() {
                cancelled = self.on_stop(&tracker);
            }
            if !cancelled && !self.dispatch_ready(&mut tracker, limit, deadline).await {
                return Err(self.timed_out(&tracker, timeout));
            }

            if tracker.all_terminal() || (cancelled && tracker.in_flight_count() == 0) {
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                if cancelled {
                    warn!(
                        step_name = %tracker.step_name(),
                        in_flight = tracker.in_flight_count(),
                        "Stopped step reached its deadline with units still in flight"
                    );
                    break;
                }
                return Err(self.timed_out(&tracker, timeout));
            }
            let wait = poll_interval.min(deadline - now);

            // Polls always run to completion; the stop signal is checked between them
            match self.transport.next_reply(wait).await {
                Ok(Some(report)) => self.on_reply(&mut tracker, report),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        step_name = %tracker.step_name(),
                        error = %error,
                        "Failed to receive reply"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let outcome = tracker.outcome(cancelled);
        self.events.publish(DispatchEvent::step_finished(&outcome));
        log_step_operation(
            "finish",
            &outcome.step_name,
            outcome.units.len(),
            &outcome.status.to_string(),
            Some(&format!(
                "items_processed={} failed_units={} duration_ms={}",
                outcome.items_processed,
                outcome.failed_units.len(),
                outcome.duration_ms()
            )),
        );
        Ok(outcome)
    }

    /// Send pending units until the in-flight limit is reached.
    ///
    /// Returns `false` when a send was still blocked at the deadline.
    async fn dispatch_ready(
        &self,
        tracker: &mut UnitTracker,
        limit: Option<usize>,
        deadline: Instant,
    ) -> bool {
        while limit.map_or(true, |max| tracker.in_flight_count() < max) {
            let Some(unit_id) = tracker.next_pending() else {
                return true;
            };

            let request = match tracker.mark_in_flight(&unit_id) {
                Ok(request) => request,
                Err(error) => {
                    error!(unit_id = %unit_id, error = %error, "Could not dispatch pending unit");
                    return true;
                }
            };
            let range = request.range.clone();

            let sent = tokio::time::timeout_at(deadline, self.transport.send_request(request)).await;
            match sent {
                Ok(Ok(())) => {
                    log_unit_operation("dispatch", &unit_id, &range, "in_flight", None, None);
                }
                Ok(Err(error)) => {
                    warn!(unit_id = %unit_id, range = %range, error = %error, "Request was not delivered");
                    if tracker.fail_unit(&unit_id, &error).is_ok() {
                        self.publish_unit_event(tracker, &unit_id);
                    }
                }
                Err(_) => {
                    warn!(unit_id = %unit_id, range = %range, "Request still blocked at the step deadline");
                    return false;
                }
            }
        }
        true
    }

    fn on_reply(&self, tracker: &mut UnitTracker, report: CompletionReport) {
        match tracker.on_reply(&report) {
            ReplyDisposition::Applied(state) => {
                if let Some(unit) = tracker.get(&report.unit_id) {
                    log_unit_operation(
                        "reply",
                        &report.unit_id,
                        unit.range(),
                        &state.to_string(),
                        unit.duration_ms().and_then(|ms| u64::try_from(ms).ok()),
                        report.error.as_deref(),
                    );
                }
                self.publish_unit_event(tracker, &report.unit_id);
            }
            ReplyDisposition::Duplicate => {
                debug!(unit_id = %report.unit_id, attempt = report.attempt, "Ignoring duplicate reply");
            }
            ReplyDisposition::StaleAttempt { current } => {
                debug!(
                    unit_id = %report.unit_id,
                    attempt = report.attempt,
                    current_attempt = current,
                    "Ignoring reply for a previous attempt"
                );
            }
            ReplyDisposition::Unknown => {
                warn!(unit_id = %report.unit_id, "Ignoring reply for a unit outside this step");
            }
            ReplyDisposition::NotDispatched => {
                warn!(unit_id = %report.unit_id, "Ignoring reply for a unit that was never dispatched");
            }
        }
    }

    fn on_stop(&self, tracker: &UnitTracker) -> bool {
        info!(
            step_name = %tracker.step_name(),
            in_flight = tracker.in_flight_count(),
            pending = tracker.non_terminal_ids().len() - tracker.in_flight_count(),
            "Stop requested; no further units will be dispatched"
        );
        true
    }

    fn timed_out(&self, tracker: &UnitTracker, timeout: Duration) -> DispatchError {
        let pending_units: Vec<UnitId> = tracker.non_terminal_ids();
        error!(
            step_name = %tracker.step_name(),
            timeout_ms = timeout.as_millis() as u64,
            pending = pending_units.len(),
            "Step timed out"
        );
        self.events.publish(DispatchEvent::StepTimedOut {
            step_name: tracker.step_name().to_string(),
            execution_id: tracker.execution_id(),
            pending_units: pending_units.clone(),
        });

        DispatchError::StepTimeout {
            timeout_ms: timeout.as_millis() as u64,
            pending_units,
        }
    }

    fn publish_unit_event(&self, tracker: &UnitTracker, unit_id: &UnitId) {
        if let Some(unit) = tracker.get(unit_id) {
            self.events
                .publish(DispatchEvent::unit_terminal(tracker.step_name(), unit));
        }
    }
}
