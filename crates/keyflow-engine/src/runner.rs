//! Run state machine: drives one flow snapshot through the action capability.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use chrono::Local;
use crossbeam_channel::RecvTimeoutError;
use keyflow_config::{Action, Flow};
use keyflow_protocol::{RunId, RunStatus, StepResult, Trigger};
use tracing::{debug, trace, warn};

use crate::{
    action::{ActionCapability, ActionError, StepContext},
    notification::EventSink,
    runlog::{FailureDetail, Run, RunLog, StepLog},
    stop::StopController,
};

/// Actions slower than this are reported.
const SLOW_ACTION_WARN_MS: u128 = 2_000;

/// Lifecycle of a run. `Idle` has no representation: a run that exists has
/// already left it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Executing steps.
    Running,
    /// All steps succeeded; sealing the log.
    Completing,
    /// A stop was observed at a step boundary.
    Stopping,
    /// A step failed.
    Failing,
    /// Terminal.
    Completed,
    /// Terminal.
    Stopped,
    /// Terminal.
    Failed,
}

impl RunPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Running, Self::Completing | Self::Stopping | Self::Failing)
                | (Self::Completing, Self::Completed)
                | (Self::Stopping, Self::Stopped)
                | (Self::Failing, Self::Failed)
        )
    }

    /// True for the three final phases.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }

    /// The terminal phase reached from a winding-down phase.
    fn settle(self) -> Self {
        match self {
            Self::Running | Self::Completing => Self::Completed,
            Self::Stopping => Self::Stopped,
            Self::Failing => Self::Failed,
            terminal => terminal,
        }
    }

    /// Status for terminal phases.
    fn status(self) -> Option<RunStatus> {
        match self {
            Self::Completed => Some(RunStatus::Completed),
            Self::Stopped => Some(RunStatus::Stopped),
            Self::Failed => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// Timing knobs for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Sleep before the first step of hotkey-started runs.
    pub hotkey_release_delay: Duration,
    /// Upper bound on a single action call; `None` waits indefinitely. A
    /// `wait` step gets its own duration on top of this.
    pub action_timeout: Option<Duration>,
}

/// Executes flows step by step. One machine is shared by every run; all
/// per-run state lives on the worker's stack.
pub struct RunStateMachine {
    /// Action backend.
    capability: Arc<dyn ActionCapability>,
    /// Event sink.
    events: EventSink,
    /// Tunables.
    options: RunOptions,
}

impl RunStateMachine {
    /// Create a machine over `capability`.
    pub fn new(capability: Arc<dyn ActionCapability>, events: EventSink, options: RunOptions) -> Self {
        Self {
            capability,
            events,
            options,
        }
    }

    /// Run `flow` to a terminal state. Blocking; call from a worker thread.
    ///
    /// `stop` is polled before every step. The action in flight when a stop
    /// arrives always completes and is logged; later steps are omitted from
    /// the log rather than recorded as skipped.
    pub fn run(&self, flow: Arc<Flow>, trigger: Trigger, run_id: RunId, stop: &StopController) -> Run {
        let hotkey = trigger.is_hotkey();
        let mut log = RunLog::open(run_id, &flow, trigger);
        let mut phase = RunPhase::Running;
        let mut failure = None;

        if hotkey && !self.options.hotkey_release_delay.is_zero() {
            trace!(run_id = %run_id, "hotkey_release_delay");
            thread::sleep(self.options.hotkey_release_delay);
        }

        for (index, step) in flow.steps.iter().enumerate() {
            if stop.should_stop() {
                debug!(run_id = %run_id, index, "stop_observed");
                phase = advance(phase, RunPhase::Stopping);
                break;
            }
            let kind = step.action.kind();
            self.events.step_started(run_id, index, kind.as_str());
            let ctx = StepContext {
                flow_id: flow.id.clone(),
                step_index: index,
                require_window_focus: flow.requires_focus(index),
            };

            let started_at = Local::now();
            let clock = Instant::now();
            let outcome = self.invoke(&step.action, &ctx);
            let elapsed = clock.elapsed();
            let finished_at = Local::now();
            if elapsed.as_millis() > SLOW_ACTION_WARN_MS && !matches!(step.action, Action::Wait(_)) {
                warn!(run_id = %run_id, index, action = %kind, ?elapsed, "slow_action");
            }

            let result = if outcome.is_ok() {
                StepResult::Success
            } else {
                StepResult::Failure
            };
            log.append(StepLog {
                index,
                step_id: step.id.clone(),
                action: kind,
                started_at,
                finished_at,
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                result,
                params: step.action.summary(),
                error: outcome.as_ref().err().cloned(),
            });
            self.events.step_completed(run_id, index, result);

            if let Err(error) = outcome {
                warn!(run_id = %run_id, index, action = %kind, %error, "step_failed");
                failure = Some(FailureDetail {
                    step_index: index,
                    error,
                });
                phase = advance(phase, RunPhase::Failing);
                break;
            }
        }

        if phase == RunPhase::Running {
            phase = advance(phase, RunPhase::Completing);
        }
        let terminal = advance(phase, phase.settle());
        let status = terminal.status().unwrap_or(RunStatus::Failed);
        log.seal(status, failure)
    }

    /// Call the capability, applying the timeout when one is set.
    fn invoke(&self, action: &Action, ctx: &StepContext) -> Result<(), ActionError> {
        let Some(limit) = self.options.action_timeout else {
            return execute_guarded(self.capability.as_ref(), action, ctx);
        };
        // A wait is allowed its own duration on top of the call budget.
        let deadline = match action {
            Action::Wait(p) => limit.saturating_add(Duration::from_millis(p.ms)),
            _ => limit,
        };
        let (tx, rx) = crossbeam_channel::bounded(1);
        let capability = self.capability.clone();
        let action = action.clone();
        let call_ctx = ctx.clone();
        let spawned = thread::Builder::new()
            .name("keyflow-action".into())
            .spawn(move || {
                tx.send(execute_guarded(capability.as_ref(), &action, &call_ctx))
                    .ok();
            });
        if let Err(e) = spawned {
            return Err(ActionError::Unavailable {
                reason: e.to_string(),
            });
        }
        match rx.recv_timeout(deadline) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                // The helper thread is abandoned; its result is dropped if it ever returns.
                Err(ActionError::Timeout {
                    ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(ActionError::Failed {
                reason: "action thread exited without a result".into(),
            }),
        }
    }
}

/// Run one capability call, turning a panic into a step failure.
fn execute_guarded(
    capability: &dyn ActionCapability,
    action: &Action,
    ctx: &StepContext,
) -> Result<(), ActionError> {
    panic::catch_unwind(AssertUnwindSafe(|| capability.execute(action, ctx))).unwrap_or_else(
        |payload| {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".into());
            Err(ActionError::Failed {
                reason: format!("action panicked: {reason}"),
            })
        },
    )
}

/// Move to `to`, checking the transition in debug builds.
fn advance(from: RunPhase, to: RunPhase) -> RunPhase {
    debug_assert!(
        from.can_transition_to(to),
        "illegal run transition {from:?} -> {to:?}"
    );
    trace!(?from, ?to, "run_phase");
    to
}
