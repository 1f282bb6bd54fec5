//! Runtime settings.

use std::path::PathBuf;

use keyflow_keycode::{Chord, Key, Modifier};
use serde::{Deserialize, Serialize};

/// Default run archive path.
pub(crate) const LOG_PATH: &str = "data/runs.jsonl";
/// Default delay before a hotkey-triggered run starts.
pub(crate) const HOTKEY_TRIGGER_DELAY_MS: u64 = 500;
/// Default scheduler tick.
pub(crate) const SCHEDULER_TICK_MS: u64 = 1000;
/// Default number of runs kept in memory.
pub(crate) const HISTORY_LIMIT: usize = 200;

/// Serde default for `log_path`.
fn default_log_path() -> PathBuf {
    PathBuf::from(LOG_PATH)
}
/// Serde default for `emergency_hotkey`: ctrl+alt+esc.
fn default_emergency_hotkey() -> Chord {
    let mut chord = Chord::key(Key::Escape);
    chord.modifiers.insert(Modifier::Control);
    chord.modifiers.insert(Modifier::Alt);
    chord
}
/// Serde default.
const fn default_hotkey_trigger_delay_ms() -> u64 {
    HOTKEY_TRIGGER_DELAY_MS
}
/// Serde default.
const fn default_scheduler_tick_ms() -> u64 {
    SCHEDULER_TICK_MS
}
/// Serde default.
const fn default_history_limit() -> usize {
    HISTORY_LIMIT
}

/// Engine-wide settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// JSONL file finished runs are appended to.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Reserved chord that stops the active run.
    #[serde(default = "default_emergency_hotkey")]
    pub emergency_hotkey: Chord,
    /// Delay before the first step of a hotkey-triggered run, so the user
    /// can release the chord.
    #[serde(default = "default_hotkey_trigger_delay_ms")]
    pub hotkey_trigger_delay_ms: u64,
    /// Scheduler evaluation interval.
    #[serde(default = "default_scheduler_tick_ms")]
    pub scheduler_tick_ms: u64,
    /// Optional per-action timeout.
    #[serde(default)]
    pub action_timeout_ms: Option<u64>,
    /// Finished runs and skipped-trigger notes kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            emergency_hotkey: default_emergency_hotkey(),
            hotkey_trigger_delay_ms: HOTKEY_TRIGGER_DELAY_MS,
            scheduler_tick_ms: SCHEDULER_TICK_MS,
            action_timeout_ms: None,
            history_limit: HISTORY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ron_uses_defaults() {
        let s: Settings = ron::from_str("()").expect("parse");
        assert_eq!(s, Settings::default());
        assert_eq!(s.emergency_hotkey.to_string_canonical(), "ctrl+alt+esc");
    }

    #[test]
    fn partial_override() {
        let s: Settings =
            ron::from_str(r#"(emergency_hotkey: "ctrl+shift+f12", history_limit: 5)"#)
                .expect("parse");
        assert_eq!(s.history_limit, 5);
        assert_eq!(s.emergency_hotkey.to_string_canonical(), "ctrl+shift+f12");
        assert_eq!(s.scheduler_tick_ms, SCHEDULER_TICK_MS);
    }
}
