//! Error handling for the keyflow binary.

use std::{io, result, time::Duration};

use thiserror::Error;

/// Convenient result type for keyflow commands.
pub type Result<T> = result::Result<T, Error>;

/// Errors that end a keyflow command.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Flow or settings file problems.
    #[error("{}", .0.pretty())]
    Config(#[from] keyflow_config::Error),
    /// Errors surfaced by the engine.
    #[error("{0}")]
    Engine(#[from] keyflow_engine::Error),
    /// Output encoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// `check` found problems.
    #[error("{0} problem(s) found")]
    CheckFailed(usize),
    /// The run did not finish in time.
    #[error("run did not finish within {0:?}")]
    Timeout(Duration),
    /// A command-line value could not be parsed.
    #[error("{0}")]
    Usage(String),
}
