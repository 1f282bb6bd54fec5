//! Flow and step definitions.

use std::{collections::HashSet, fmt};

use keyflow_keycode::Chord;
use keyflow_protocol::{FlowId, ScheduleKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Action, ActionKind, Error};

/// Identifier of a step within its flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Construct a step id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hotkey binding of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HotkeySpec {
    /// Chord that starts the flow.
    pub keys: Chord,
}

/// Schedule binding of a flow. The expression is parsed by the engine's
/// scheduler when the schedule is armed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSpec {
    /// Schedule kind.
    #[serde(rename = "type")]
    pub kind: ScheduleKind,
    /// `"HH:MM"`, `"mon,wed@HH:MM"` or a five-field cron expression.
    pub expression: String,
}

/// One step of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Step identifier, unique within the flow.
    pub id: StepId,
    /// What the step does.
    pub action: Action,
    /// Overrides the flow-level focus requirement when set.
    pub require_window_focus: Option<bool>,
}

impl Step {
    /// A step with no focus override.
    pub fn new(id: impl Into<String>, action: Action) -> Self {
        Self {
            id: StepId::new(id),
            action,
            require_window_focus: None,
        }
    }
}

/// A named, ordered sequence of steps plus its optional triggers.
///
/// Flows are shared with the engine as `Arc<Flow>` snapshots and are never
/// mutated in place; an edit produces a new `Flow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "RawFlow")]
pub struct Flow {
    /// Flow identifier.
    pub id: FlowId,
    /// Display name.
    pub name: String,
    /// Steps in execution order.
    pub steps: Vec<Step>,
    /// Optional global hotkey.
    pub hotkey: Option<HotkeySpec>,
    /// Optional schedule.
    pub schedule: Option<ScheduleSpec>,
    /// Default focus requirement for steps without an override.
    pub require_window_focus: bool,
}

impl Flow {
    /// Build a flow from actions; step ids are `"<flow-id>-<n>"`.
    pub fn new(id: impl Into<FlowId>, name: impl Into<String>, actions: Vec<Action>) -> Self {
        let id = id.into();
        let steps = actions
            .into_iter()
            .enumerate()
            .map(|(i, a)| Step {
                id: default_step_id(&id, i),
                action: a,
                require_window_focus: None,
            })
            .collect();
        Self {
            id,
            name: name.into(),
            steps,
            hotkey: None,
            schedule: None,
            require_window_focus: false,
        }
    }

    /// Attach a hotkey binding.
    pub fn with_hotkey(mut self, keys: Chord) -> Self {
        self.hotkey = Some(HotkeySpec { keys });
        self
    }

    /// Attach a schedule binding.
    pub fn with_schedule(mut self, kind: ScheduleKind, expression: impl Into<String>) -> Self {
        self.schedule = Some(ScheduleSpec {
            kind,
            expression: expression.into(),
        });
        self
    }

    /// A flow can run only when it has at least one step.
    pub fn is_runnable(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Effective focus requirement for the step at `index`.
    pub fn requires_focus(&self, index: usize) -> bool {
        self.steps
            .get(index)
            .and_then(|s| s.require_window_focus)
            .unwrap_or(self.require_window_focus)
    }

    /// Validate an on-disk flow.
    pub(crate) fn from_raw(raw: RawFlow) -> Result<Self, Error> {
        let flow_name = raw.id.to_string();
        if raw.id.as_str().trim().is_empty() {
            return Err(Error::validation(None, "flow id is empty"));
        }
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(raw.steps.len());
        for (index, rs) in raw.steps.into_iter().enumerate() {
            let action = Action::from_parts(rs.action, rs.params).map_err(|m| {
                Error::validation(Some(&flow_name), format!("step {}: {m}", index + 1))
            })?;
            let id = rs
                .id
                .map(StepId::new)
                .unwrap_or_else(|| default_step_id(&raw.id, index));
            if !seen.insert(id.clone()) {
                return Err(Error::validation(
                    Some(&flow_name),
                    format!("duplicate step id {id}"),
                ));
            }
            steps.push(Step {
                id,
                action,
                require_window_focus: rs.require_window_focus,
            });
        }
        let name = if raw.name.trim().is_empty() {
            flow_name
        } else {
            raw.name
        };
        Ok(Self {
            id: raw.id,
            name,
            steps,
            hotkey: raw.hotkey,
            schedule: raw.schedule,
            require_window_focus: raw.require_window_focus,
        })
    }
}

/// One-based step id used when the file gives none.
fn default_step_id(flow: &FlowId, index: usize) -> StepId {
    StepId::new(format!("{flow}-{}", index + 1))
}

/// On-disk shape of a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawStep {
    /// Step id; defaulted when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    /// Action kind.
    action: ActionKind,
    /// Kind-specific parameters.
    #[serde(default)]
    params: Value,
    /// Focus override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    require_window_focus: Option<bool>,
}

/// On-disk shape of a flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawFlow {
    /// Flow id.
    id: FlowId,
    /// Display name; defaults to the id.
    #[serde(default)]
    name: String,
    /// Ordered steps.
    #[serde(default)]
    steps: Vec<RawStep>,
    /// Optional hotkey trigger.
    #[serde(default)]
    hotkey: Option<HotkeySpec>,
    /// Optional schedule trigger.
    #[serde(default)]
    schedule: Option<ScheduleSpec>,
    /// Flow-wide focus default.
    #[serde(default)]
    require_window_focus: bool,
}

impl From<Flow> for RawFlow {
    fn from(f: Flow) -> Self {
        Self {
            id: f.id,
            name: f.name,
            steps: f
                .steps
                .into_iter()
                .map(|s| RawStep {
                    id: Some(s.id.0),
                    action: s.action.kind(),
                    params: s.action.params(),
                    require_window_focus: s.require_window_focus,
                })
                .collect(),
            hotkey: f.hotkey,
            schedule: f.schedule,
            require_window_focus: f.require_window_focus,
        }
    }
}

#[cfg(test)]
mod tests {
    use keyflow_keycode::Key;

    use super::*;
    use crate::{KeyPressParams, WaitParams};

    fn sample() -> Flow {
        Flow::new(
            "greet",
            "Greet",
            vec![
                Action::Wait(WaitParams { ms: 10 }),
                Action::KeyPress(KeyPressParams { key: Key::A }),
            ],
        )
    }

    #[test]
    fn default_step_ids_are_one_based() {
        let f = sample();
        assert_eq!(f.steps[0].id.as_str(), "greet-1");
        assert_eq!(f.steps[1].id.as_str(), "greet-2");
        assert!(f.is_runnable());
        assert!(!Flow::new("empty", "Empty", vec![]).is_runnable());
    }

    #[test]
    fn focus_override_wins_over_flow_default() {
        let mut f = sample();
        f.require_window_focus = true;
        f.steps[1].require_window_focus = Some(false);
        assert!(f.requires_focus(0));
        assert!(!f.requires_focus(1));
    }

    #[test]
    fn serializes_in_file_shape() {
        let f = sample().with_schedule(ScheduleKind::Daily, "09:00");
        let v = serde_json::to_value(&f).expect("serialize");
        assert_eq!(v["steps"][0]["action"], "wait");
        assert_eq!(v["steps"][0]["params"]["ms"], 10);
        assert_eq!(v["steps"][1]["params"]["key"], "a");
        assert_eq!(v["schedule"]["type"], "daily");
    }
}
