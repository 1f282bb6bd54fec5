//! Shared identifiers, trigger sources and the observer event stream.
//!
//! Everything in this crate is plain data. The engine produces [`CoreEvent`]s
//! on an [`ipc::EventTx`]; UIs, tray icons and the CLI consume them.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a flow definition in the configuration store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    /// Construct a flow id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FlowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of one run of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Allocate a fresh random run id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to correlate log lines.
        let s = self.0.simple().to_string();
        f.write_str(&s[..8])
    }
}

/// Kind of a time-based schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// Same time of day, every day (`"HH:MM"`).
    Daily,
    /// Same time of day on selected weekdays (`"mon,wed@HH:MM"`).
    Weekly,
    /// Standard five-field cron expression.
    Cron,
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Cron => "cron",
        })
    }
}

/// The source that requested a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Started from the UI or CLI.
    Manual,
    /// Started by a global hotkey; `combo` is the canonical chord string.
    Hotkey {
        /// Canonical chord, e.g. `"ctrl+alt+1"`.
        combo: String,
    },
    /// Started by the scheduler.
    Schedule {
        /// Schedule kind.
        kind: ScheduleKind,
        /// Expression as written in the flow definition.
        spec: String,
    },
}

impl Trigger {
    /// True for hotkey-started runs.
    pub fn is_hotkey(&self) -> bool {
        matches!(self, Self::Hotkey { .. })
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("manual"),
            Self::Hotkey { combo } => write!(f, "hotkey({combo})"),
            Self::Schedule { kind, spec } => write!(f, "{kind}({spec})"),
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every step succeeded.
    Completed,
    /// A stop was requested and observed at a step boundary.
    Stopped,
    /// A step's action failed.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        })
    }
}

/// Result of one logged step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    /// The action reported success.
    Success,
    /// The action reported a failure.
    Failure,
    /// The step was not executed.
    Skipped,
}

/// Why a run request produced no run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another run was active.
    Busy,
    /// The requested flow is not in the configuration store.
    UnknownFlow,
    /// The requested flow has no steps.
    EmptyFlow,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Busy => "busy",
            Self::UnknownFlow => "unknown flow",
            Self::EmptyFlow => "flow has no steps",
        })
    }
}

/// Events emitted by the engine for any observer.
///
/// Delivery is fire-and-forget: the engine never waits for a consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoreEvent {
    /// A run was created and its worker started.
    RunStarted {
        /// Run id.
        run_id: RunId,
        /// Flow being executed.
        flow_id: FlowId,
        /// Requesting source.
        trigger: Trigger,
    },
    /// A step is about to invoke its action.
    StepStarted {
        /// Run id.
        run_id: RunId,
        /// Zero-based step index.
        index: usize,
        /// Action kind name, e.g. `"key_press"`.
        action: String,
    },
    /// A step finished and was logged.
    StepCompleted {
        /// Run id.
        run_id: RunId,
        /// Zero-based step index.
        index: usize,
        /// Logged result.
        result: StepResult,
    },
    /// A run reached its terminal state and was recorded.
    RunFinished {
        /// Run id.
        run_id: RunId,
        /// Terminal status.
        status: RunStatus,
    },
    /// A stop was requested for the active run.
    StopRequested {
        /// Run id.
        run_id: RunId,
    },
    /// A run request was dropped without creating a run.
    TriggerSkipped {
        /// Requesting source.
        source: Trigger,
        /// Flow that was requested.
        flow_id: FlowId,
        /// Why it was dropped.
        reason: SkipReason,
    },
    /// A hotkey registration was rejected.
    HotkeyConflict {
        /// Canonical chord that was requested.
        combo: String,
        /// Flow that already owns the chord; `None` when the chord is the
        /// reserved emergency-stop chord.
        existing_flow_id: Option<FlowId>,
    },
    /// A schedule could not be armed.
    ScheduleRejected {
        /// Flow whose schedule was rejected.
        flow_id: FlowId,
        /// Parse error text.
        reason: String,
    },
}

/// Channel helpers for the event stream.
pub mod ipc {
    use tokio::sync::mpsc;

    use super::CoreEvent;

    /// Tokio unbounded sender for core events.
    pub type EventTx = mpsc::UnboundedSender<CoreEvent>;
    /// Tokio unbounded receiver for core events.
    pub type EventRx = mpsc::UnboundedReceiver<CoreEvent>;

    /// Create a standard unbounded event channel (sender, receiver).
    pub fn event_channel() -> (EventTx, EventRx) {
        mpsc::unbounded_channel::<CoreEvent>()
    }
}
