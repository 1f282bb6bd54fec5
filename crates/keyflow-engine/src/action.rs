//! The Action Capability boundary.
//!
//! The engine never performs input itself. Every step is handed to an
//! [`ActionCapability`] supplied by the host, which matches on the closed
//! [`Action`] enum and reports success or an [`ActionError`].

use std::{thread, time::Duration};

use keyflow_config::Action;
use keyflow_protocol::FlowId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Per-step context passed alongside the action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    /// Flow the step belongs to.
    pub flow_id: FlowId,
    /// Zero-based step index.
    pub step_index: usize,
    /// Whether the target window must hold focus while the action runs.
    pub require_window_focus: bool,
}

/// Why an action failed. Serialized into step logs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionError {
    /// The backend reported a failure.
    #[error("action failed: {reason}")]
    Failed {
        /// Backend message.
        reason: String,
    },
    /// Focus was required but the target window lost it.
    #[error("target window is not focused")]
    WindowNotFocused,
    /// No window matched a focus request.
    #[error("no window title contains {title:?}")]
    WindowNotFound {
        /// Requested title fragment.
        title: String,
    },
    /// The action did not return within the configured timeout.
    #[error("action timed out after {ms}ms")]
    Timeout {
        /// Timeout that expired.
        ms: u64,
    },
    /// The capability cannot perform this kind of action here.
    #[error("action unavailable: {reason}")]
    Unavailable {
        /// Explanation.
        reason: String,
    },
}

/// Host-supplied executor for step actions.
///
/// `execute` is called on the run's worker thread and may block; it must
/// return within bounded time unless the engine is configured with an action
/// timeout.
pub trait ActionCapability: Send + Sync {
    /// Perform `action` and report the outcome.
    fn execute(&self, action: &Action, ctx: &StepContext) -> Result<(), ActionError>;
}

/// Dry-run capability: logs each action and honours `wait` durations.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingActions;

impl ActionCapability for LoggingActions {
    fn execute(&self, action: &Action, ctx: &StepContext) -> Result<(), ActionError> {
        match action {
            Action::Wait(p) => thread::sleep(Duration::from_millis(p.ms)),
            Action::TypeText(p) => info!(
                flow = %ctx.flow_id,
                index = ctx.step_index,
                mode = ?p.mode,
                chars = p.text.chars().count(),
                "dry_run_type_text"
            ),
            Action::KeyPress(p) => {
                info!(flow = %ctx.flow_id, index = ctx.step_index, key = %p.key.to_spec(), "dry_run_key_press")
            }
            Action::Hotkey(p) => {
                info!(flow = %ctx.flow_id, index = ctx.step_index, keys = %p.keys, "dry_run_hotkey")
            }
            Action::Click(p) => info!(
                flow = %ctx.flow_id,
                index = ctx.step_index,
                x = p.x,
                y = p.y,
                button = ?p.button,
                clicks = p.clicks,
                "dry_run_click"
            ),
            Action::Scroll(p) => info!(
                flow = %ctx.flow_id,
                index = ctx.step_index,
                delta = p.delta,
                x = ?p.x,
                y = ?p.y,
                "dry_run_scroll"
            ),
            Action::FocusWindow(p) => info!(
                flow = %ctx.flow_id,
                index = ctx.step_index,
                title = %p.title_contains,
                "dry_run_focus_window"
            ),
        }
        Ok(())
    }
}
