//! Error types for flow and settings loading and validation.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Errors produced while loading, parsing, or validating configuration.
pub enum Error {
    #[error("{message}")]
    /// I/O or filesystem read error.
    Read {
        /// Optional path associated with the read error.
        path: Option<PathBuf>,
        /// Human-readable error message.
        message: String,
    },
    #[error("{message}")]
    /// Syntax or shape error reported by the JSON/RON deserializer.
    Parse {
        /// Optional path associated with the parse error.
        path: Option<PathBuf>,
        /// Human-readable error message.
        message: String,
    },
    #[error("{message}")]
    /// A structurally valid file whose content breaks a rule.
    Validation {
        /// Optional path associated with the validation error.
        path: Option<PathBuf>,
        /// Flow the problem was found in, when known.
        flow: Option<String>,
        /// Human-readable error message.
        message: String,
    },
}

impl Error {
    /// Render a human-friendly error message including the file path when available.
    pub fn pretty(&self) -> String {
        match self {
            Self::Read { path, message } => match path {
                Some(p) => format!("Read error at {}: {}", p.display(), message),
                None => format!("Read error: {}", message),
            },
            Self::Parse { path, message } => match path {
                Some(p) => format!("Parse error in {}: {}", p.display(), message),
                None => format!("Parse error: {}", message),
            },
            Self::Validation {
                path,
                flow,
                message,
            } => {
                let mut out = String::from("Invalid configuration");
                if let Some(p) = path {
                    out.push_str(&format!(" in {}", p.display()));
                }
                if let Some(f) = flow {
                    out.push_str(&format!(" (flow {f})"));
                }
                out.push_str(": ");
                out.push_str(message);
                out
            }
        }
    }

    /// Attach a path to an error that was produced without one.
    pub fn with_path(self, p: PathBuf) -> Self {
        match self {
            Self::Read { path: None, message } => Self::Read {
                path: Some(p),
                message,
            },
            Self::Parse { path: None, message } => Self::Parse {
                path: Some(p),
                message,
            },
            Self::Validation {
                path: None,
                flow,
                message,
            } => Self::Validation {
                path: Some(p),
                flow,
                message,
            },
            other => other,
        }
    }

    /// A validation error, optionally scoped to a flow.
    pub(crate) fn validation(flow: Option<&str>, message: impl Into<String>) -> Self {
        Self::Validation {
            path: None,
            flow: flow.map(str::to_string),
            message: message.into(),
        }
    }
}
