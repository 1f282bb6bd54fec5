//! Engine error type.

use std::{io, result::Result as StdResult};

use keyflow_protocol::FlowId;
use thiserror::Error;

use crate::hotkeys::HotkeyConflict;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the keyflow engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A hotkey registration was rejected.
    #[error(transparent)]
    HotkeyConflict(#[from] HotkeyConflict),

    /// Another run is active; the request was dropped.
    #[error("a run is already active")]
    Busy,

    /// The requested flow does not exist.
    #[error("unknown flow: {0}")]
    UnknownFlow(FlowId),

    /// The requested flow has no steps.
    #[error("flow {0} has no steps")]
    EmptyFlow(FlowId),

    /// Errors originating from the hotkey backend.
    #[error("Hotkey backend error: {0}")]
    Hotkey(String),

    /// The dispatcher is no longer accepting requests.
    #[error("engine channel closed")]
    ChannelClosed,

    /// I/O failure while writing or reading the run archive.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A run record could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
