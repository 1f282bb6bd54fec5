//! Observer event emission.

use keyflow_protocol::{
    CoreEvent, FlowId, RunId, RunStatus, SkipReason, StepResult, Trigger,
    ipc::{EventTx, event_channel},
};
use tracing::{info, trace, warn};

/// Fire-and-forget sender for [`CoreEvent`]s.
///
/// Sending never blocks and never fails the caller; a closed observer channel
/// only produces a trace line.
#[derive(Clone, Debug)]
pub struct EventSink {
    /// Observer channel.
    tx: EventTx,
}

impl EventSink {
    /// Create a sink from an event channel.
    pub fn new(tx: EventTx) -> Self {
        Self { tx }
    }

    /// A sink with no observer.
    pub fn detached() -> Self {
        let (tx, _rx) = event_channel();
        Self { tx }
    }

    /// Send, ignoring a gone observer.
    fn emit(&self, event: CoreEvent) {
        if self.tx.send(event).is_err() {
            trace!("event_observer_closed");
        }
    }

    /// A run was created.
    pub(crate) fn run_started(&self, run_id: RunId, flow_id: FlowId, trigger: Trigger) {
        info!(run_id = %run_id, flow = %flow_id, trigger = %trigger, "run_started");
        self.emit(CoreEvent::RunStarted {
            run_id,
            flow_id,
            trigger,
        });
    }

    /// A step is about to run.
    pub(crate) fn step_started(&self, run_id: RunId, index: usize, action: &str) {
        trace!(run_id = %run_id, index, action, "step_started");
        self.emit(CoreEvent::StepStarted {
            run_id,
            index,
            action: action.to_string(),
        });
    }

    /// A step finished.
    pub(crate) fn step_completed(&self, run_id: RunId, index: usize, result: StepResult) {
        self.emit(CoreEvent::StepCompleted {
            run_id,
            index,
            result,
        });
    }

    /// A run reached a terminal state.
    pub(crate) fn run_finished(&self, run_id: RunId, status: RunStatus) {
        info!(run_id = %run_id, status = %status, "run_finished");
        self.emit(CoreEvent::RunFinished { run_id, status });
    }

    /// The first stop request for a run.
    pub(crate) fn stop_requested(&self, run_id: RunId) {
        info!(run_id = %run_id, "stop_requested");
        self.emit(CoreEvent::StopRequested { run_id });
    }

    /// A request was dropped.
    pub(crate) fn trigger_skipped(&self, source: Trigger, flow_id: FlowId, reason: SkipReason) {
        warn!(flow = %flow_id, source = %source, reason = %reason, "trigger_skipped");
        self.emit(CoreEvent::TriggerSkipped {
            source,
            flow_id,
            reason,
        });
    }

    /// A hotkey registration was refused.
    pub(crate) fn hotkey_conflict(&self, combo: String, existing_flow_id: Option<FlowId>) {
        warn!(combo = %combo, existing = ?existing_flow_id, "hotkey_conflict");
        self.emit(CoreEvent::HotkeyConflict {
            combo,
            existing_flow_id,
        });
    }

    /// A schedule could not be armed.
    pub(crate) fn schedule_rejected(&self, flow_id: FlowId, reason: String) {
        warn!(flow = %flow_id, reason = %reason, "schedule_rejected");
        self.emit(CoreEvent::ScheduleRejected { flow_id, reason });
    }
}
