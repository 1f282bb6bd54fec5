//! Loading of flows and settings shared by every command.

use std::{path::PathBuf, sync::Arc};

use keyflow_config::{MemoryStore, Settings, load_flows, load_settings};
use tracing::debug;

use crate::{cli::Cli, error::Result};

/// Flows and settings resolved from the command line.
pub struct Context {
    /// Flow file that was loaded.
    pub flows_path: PathBuf,
    /// Effective settings.
    pub settings: Settings,
    /// Loaded flows.
    pub store: Arc<MemoryStore>,
}

impl Context {
    /// Resolve paths, then load and validate both files.
    pub fn load(cli: &Cli) -> Result<Self> {
        let flows_path = keyflow_config::resolve_flows_path(cli.flows.as_deref())?;
        let settings_path = keyflow_config::resolve_settings_path(cli.settings.as_deref());
        let settings = load_settings(settings_path.as_deref())?;
        let file = load_flows(&flows_path)?;
        debug!(
            flows = %flows_path.display(),
            settings = ?settings_path,
            count = file.flows.len(),
            "context_loaded"
        );
        Ok(Self {
            flows_path,
            settings,
            store: Arc::new(MemoryStore::from(file)),
        })
    }
}
