//! Flow definitions, action parameter records, settings and loaders.
//!
//! This crate is the configuration-store side of keyflow: it parses and
//! validates flow files, and exposes them to the engine through the
//! [`FlowStore`] trait as immutable `Arc<Flow>` snapshots.

use std::{
    env,
    path::{Path, PathBuf},
};

mod action;
mod error;
mod flow;
mod loader;
mod settings;
mod store;

pub use action::{
    Action, ActionKind, ClickParams, FocusWindowParams, HotkeyParams, KeyPressParams,
    MouseButton, ScrollParams, TypeMode, TypeTextParams, WaitParams,
};
pub use error::Error;
pub use flow::{Flow, HotkeySpec, ScheduleSpec, Step, StepId};
pub use keyflow_protocol::{FlowId, ScheduleKind};
pub use loader::{FlowFile, Format, load_flows, load_settings, parse_flows};
pub use settings::Settings;
pub use store::{FlowStore, MemoryStore, TriggerBinding};

/// Directory holding the user's keyflow files (`~/.keyflow`).
pub fn default_config_dir() -> PathBuf {
    let mut p = PathBuf::from(env::var_os("HOME").unwrap_or_default());
    p.push(".keyflow");
    p
}

/// Resolve the flows file: `explicit` when given, else `~/.keyflow/flows.json`.
pub fn resolve_flows_path(explicit: Option<&Path>) -> Result<PathBuf, Error> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let preferred = default_config_dir().join("flows.json");
    if preferred.exists() {
        return Ok(preferred);
    }
    Err(Error::Read {
        path: Some(preferred),
        message: "No flows file found. Create ~/.keyflow/flows.json or pass --flows".to_string(),
    })
}

/// Resolve the settings file: `explicit` when given, else `~/.keyflow/settings.ron`
/// if it exists. `None` means "use defaults".
pub fn resolve_settings_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let preferred = default_config_dir().join("settings.ron");
    preferred.exists().then_some(preferred)
}
