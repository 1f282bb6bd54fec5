//! The closed set of step actions and their validated parameter records.
//!
//! Flow files carry actions as `{"action": "<kind>", "params": {...}}`; the
//! pair is decoded into a typed [`Action`] here so that nothing downstream
//! ever sees an unvalidated parameter.

use std::fmt;

use keyflow_keycode::{Chord, Key};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

/// Discriminant of an [`Action`], as written in flow files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Type a string.
    TypeText,
    /// Press and release a single key.
    KeyPress,
    /// Press a key chord.
    Hotkey,
    /// Click the mouse at a position.
    Click,
    /// Scroll the mouse wheel.
    Scroll,
    /// Sleep for a duration.
    Wait,
    /// Bring a window to the foreground.
    FocusWindow,
}

impl ActionKind {
    /// Snake-case name used in flow files and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeText => "type_text",
            Self::KeyPress => "key_press",
            Self::Hotkey => "hotkey",
            Self::Click => "click",
            Self::Scroll => "scroll",
            Self::Wait => "wait",
            Self::FocusWindow => "focus_window",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How text is entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeMode {
    /// Emit one keystroke per character.
    #[default]
    KeyIn,
    /// Place the text on the clipboard and paste it.
    Paste,
}

/// Mouse button for clicks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    /// Primary button.
    #[default]
    Left,
    /// Secondary button.
    Right,
    /// Wheel button.
    Middle,
}

/// Parameters for [`Action::TypeText`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeTextParams {
    /// Text to enter. Never written to run logs.
    pub text: String,
    /// Entry mode.
    #[serde(default)]
    pub mode: TypeMode,
    /// Delay between keystrokes in `key_in` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
}

/// Parameters for [`Action::KeyPress`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyPressParams {
    /// Key to press.
    pub key: Key,
}

/// Parameters for [`Action::Hotkey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HotkeyParams {
    /// Chord to press, as `"ctrl+c"` or `["ctrl", "c"]`.
    pub keys: Chord,
}

/// Parameters for [`Action::Click`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClickParams {
    /// Screen x coordinate.
    pub x: i32,
    /// Screen y coordinate.
    pub y: i32,
    /// Button to click.
    #[serde(default)]
    pub button: MouseButton,
    /// Number of clicks.
    #[serde(default = "one")]
    pub clicks: u32,
}

/// Default click count.
fn one() -> u32 {
    1
}

/// Parameters for [`Action::Scroll`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrollParams {
    /// Wheel delta; positive scrolls up.
    pub delta: i32,
    /// Optional x coordinate to scroll at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// Optional y coordinate to scroll at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
}

/// Parameters for [`Action::Wait`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitParams {
    /// Minimum time to suspend the worker, in milliseconds.
    pub ms: u64,
}

/// Parameters for [`Action::FocusWindow`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FocusWindowParams {
    /// Case-insensitive substring of the window title to focus.
    pub title_contains: String,
}

/// One step's action with its validated parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Type a string.
    TypeText(TypeTextParams),
    /// Press and release a single key.
    KeyPress(KeyPressParams),
    /// Press a key chord.
    Hotkey(HotkeyParams),
    /// Click the mouse.
    Click(ClickParams),
    /// Scroll the mouse wheel.
    Scroll(ScrollParams),
    /// Sleep.
    Wait(WaitParams),
    /// Focus a window.
    FocusWindow(FocusWindowParams),
}

/// Decode a kind-specific parameter record.
fn decode<T: DeserializeOwned>(kind: ActionKind, params: Value) -> Result<T, String> {
    serde_json::from_value(params).map_err(|e| format!("invalid {kind} params: {e}"))
}

impl Action {
    /// The action's kind.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::TypeText(_) => ActionKind::TypeText,
            Self::KeyPress(_) => ActionKind::KeyPress,
            Self::Hotkey(_) => ActionKind::Hotkey,
            Self::Click(_) => ActionKind::Click,
            Self::Scroll(_) => ActionKind::Scroll,
            Self::Wait(_) => ActionKind::Wait,
            Self::FocusWindow(_) => ActionKind::FocusWindow,
        }
    }

    /// Decode and validate a `(kind, params)` pair from a flow file.
    ///
    /// A missing (`null`) params value is treated as an empty object so that
    /// defaulted fields still apply.
    pub fn from_parts(kind: ActionKind, params: Value) -> Result<Self, String> {
        let params = if params.is_null() { json!({}) } else { params };
        let action = match kind {
            ActionKind::TypeText => Self::TypeText(decode(kind, params)?),
            ActionKind::KeyPress => Self::KeyPress(decode(kind, params)?),
            ActionKind::Hotkey => Self::Hotkey(decode(kind, params)?),
            ActionKind::Click => Self::Click(decode(kind, params)?),
            ActionKind::Scroll => Self::Scroll(decode(kind, params)?),
            ActionKind::Wait => Self::Wait(decode(kind, params)?),
            ActionKind::FocusWindow => Self::FocusWindow(decode(kind, params)?),
        };
        action.validate()?;
        Ok(action)
    }

    /// Check value constraints that the types alone do not express.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::TypeText(p) if p.text.is_empty() => Err("type_text: text is empty".into()),
            Self::Click(p) if p.clicks == 0 => Err("click: clicks must be at least 1".into()),
            Self::Scroll(p) if p.delta == 0 => Err("scroll: delta must be non-zero".into()),
            Self::FocusWindow(p) if p.title_contains.trim().is_empty() => {
                Err("focus_window: title_contains is empty".into())
            }
            _ => Ok(()),
        }
    }

    /// Full parameter object, as it would be written back to a flow file.
    pub fn params(&self) -> Value {
        let v = match self {
            Self::TypeText(p) => serde_json::to_value(p),
            Self::KeyPress(p) => serde_json::to_value(p),
            Self::Hotkey(p) => serde_json::to_value(p),
            Self::Click(p) => serde_json::to_value(p),
            Self::Scroll(p) => serde_json::to_value(p),
            Self::Wait(p) => serde_json::to_value(p),
            Self::FocusWindow(p) => serde_json::to_value(p),
        };
        v.unwrap_or(Value::Null)
    }

    /// Parameter summary for run logs. Typed text is reduced to its length.
    pub fn summary(&self) -> Value {
        match self {
            Self::TypeText(p) => json!({
                "mode": p.mode,
                "length": p.text.chars().count(),
                "interval_ms": p.interval_ms,
            }),
            other => other.params(),
        }
    }
}

#[cfg(test)]
mod tests {
    use keyflow_keycode::Modifier;

    use super::*;

    #[test]
    fn decodes_each_kind_with_defaults() {
        let a = Action::from_parts(ActionKind::Click, json!({"x": 10, "y": 20})).expect("click");
        assert_eq!(
            a,
            Action::Click(ClickParams {
                x: 10,
                y: 20,
                button: MouseButton::Left,
                clicks: 1
            })
        );

        let a = Action::from_parts(ActionKind::Hotkey, json!({"keys": ["ctrl", "v"]}))
            .expect("hotkey");
        let Action::Hotkey(HotkeyParams { keys }) = a else {
            panic!("expected hotkey");
        };
        assert!(keys.modifiers.contains(&Modifier::Control));
        assert_eq!(keys.key, Key::V);

        let a = Action::from_parts(ActionKind::KeyPress, json!({"key": "enter"})).expect("key");
        assert_eq!(a.kind(), ActionKind::KeyPress);

        let a = Action::from_parts(ActionKind::TypeText, json!({"text": "hi", "mode": "paste"}))
            .expect("type");
        assert_eq!(a.kind().to_string(), "type_text");
    }

    #[test]
    fn rejects_bad_params() {
        let cases = [
            (ActionKind::Wait, Value::Null),
            (ActionKind::Wait, json!({"ms": -1})),
            (ActionKind::KeyPress, json!({"key": "hyper"})),
            (ActionKind::TypeText, json!({"text": ""})),
            (ActionKind::Click, json!({"x": 1, "y": 1, "clicks": 0})),
            (ActionKind::Scroll, json!({"delta": 0})),
            (ActionKind::FocusWindow, json!({"title_contains": "  "})),
            (ActionKind::Wait, json!({"ms": 5, "extra": true})),
        ];
        for (kind, params) in cases {
            assert!(
                Action::from_parts(kind, params.clone()).is_err(),
                "{kind} accepted {params}"
            );
        }
    }

    #[test]
    fn summary_redacts_typed_text() {
        let a = Action::from_parts(
            ActionKind::TypeText,
            json!({"text": "hunter2", "interval_ms": 20}),
        )
        .expect("type");
        let s = a.summary();
        assert_eq!(s["length"], 7);
        assert_eq!(s["mode"], "key_in");
        assert!(!s.to_string().contains("hunter2"));
        // The full params still carry the text for the capability.
        assert_eq!(a.params()["text"], "hunter2");
    }
}
