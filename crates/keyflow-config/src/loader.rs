//! Parse and load flow files and settings.

use std::{collections::HashSet, ffi::OsStr, fs, path::Path};

use serde::Deserialize;
use tracing::debug;

use crate::{Error, Flow, Settings, flow::RawFlow};

/// File formats a flow or settings file can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.json`
    Json,
    /// `.ron`
    Ron,
}

impl Format {
    /// Pick a format from the file extension; anything other than `.ron` is JSON.
    pub fn from_path(path: &Path) -> Self {
        if path.extension() == Some(OsStr::new("ron")) {
            Self::Ron
        } else {
            Self::Json
        }
    }
}

/// A parsed and validated flow file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFile {
    /// Flows in file order.
    pub flows: Vec<Flow>,
}

/// On-disk shape of a flow file.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFlowFile {
    /// Flows in file order.
    #[serde(default)]
    flows: Vec<RawFlow>,
}

/// Deserialize `text` in `format`.
fn decode<T: for<'de> Deserialize<'de>>(text: &str, format: Format) -> Result<T, Error> {
    let parsed = match format {
        Format::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
        Format::Ron => ron::from_str(text).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| Error::Parse {
        path: None,
        message,
    })
}

/// Parse flow-file text and validate every flow.
pub fn parse_flows(text: &str, format: Format) -> Result<FlowFile, Error> {
    let raw: RawFlowFile = decode(text, format)?;
    let mut seen = HashSet::new();
    let mut flows = Vec::with_capacity(raw.flows.len());
    for rf in raw.flows {
        let flow = Flow::from_raw(rf)?;
        if !seen.insert(flow.id.clone()) {
            return Err(Error::validation(
                Some(flow.id.as_str()),
                "duplicate flow id",
            ));
        }
        flows.push(flow);
    }
    Ok(FlowFile { flows })
}

/// Read a whole file.
fn read(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path).map_err(|e| Error::Read {
        path: Some(path.to_path_buf()),
        message: e.to_string(),
    })
}

/// Load flows from `path`, choosing JSON or RON by extension.
pub fn load_flows(path: &Path) -> Result<FlowFile, Error> {
    let text = read(path)?;
    let file = parse_flows(&text, Format::from_path(path)).map_err(|e| e.with_path(path.to_path_buf()))?;
    debug!(path = %path.display(), flows = file.flows.len(), "loaded flows");
    Ok(file)
}

/// Load settings from `path`, or defaults when `path` is `None`.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, Error> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = read(path)?;
    decode(&text, Format::from_path(path)).map_err(|e| e.with_path(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ron_flow_file() {
        let text = r#"(flows: [(id: "a", name: "A", steps: [(action: wait, params: {"ms": 5})])])"#;
        let file = parse_flows(text, Format::Ron).expect("parse");
        assert_eq!(file.flows.len(), 1);
        assert_eq!(file.flows[0].steps[0].id.as_str(), "a-1");
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(Format::from_path(Path::new("x.ron")), Format::Ron);
        assert_eq!(Format::from_path(Path::new("x.json")), Format::Json);
        assert_eq!(Format::from_path(Path::new("x")), Format::Json);
    }
}
