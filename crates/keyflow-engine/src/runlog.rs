//! Run records and their append-only archive.
//!
//! A [`RunLog`] is the mutable builder the worker appends to while a run is
//! in progress. Sealing it yields a [`Run`], which has no mutators: once a
//! run is terminal its record is fixed.

use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use keyflow_config::{ActionKind, Flow, StepId};
use keyflow_protocol::{FlowId, RunId, RunStatus, StepResult, Trigger};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Result, action::ActionError};

/// Identity of the flow snapshot a run executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRef {
    /// Flow id.
    pub id: FlowId,
    /// Flow name at run start.
    pub name: String,
    /// Number of steps in the snapshot.
    pub step_count: usize,
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    /// Zero-based step index.
    pub index: usize,
    /// Step id.
    pub step_id: StepId,
    /// Action kind.
    pub action: ActionKind,
    /// When the action was invoked.
    pub started_at: DateTime<Local>,
    /// When the action returned.
    pub finished_at: DateTime<Local>,
    /// Wall time spent in the action.
    pub duration_ms: u64,
    /// Outcome.
    pub result: StepResult,
    /// Parameter summary with typed text redacted.
    pub params: Value,
    /// Failure detail when `result` is `Failure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionError>,
}

/// The step that ended a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Index of the failing step.
    pub step_index: usize,
    /// What went wrong.
    pub error: ActionError,
}

/// The immutable record of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Run id.
    id: RunId,
    /// Flow the run came from.
    flow: FlowRef,
    /// What started it.
    trigger: Trigger,
    /// Start time.
    started_at: DateTime<Local>,
    /// End time.
    finished_at: DateTime<Local>,
    /// Terminal status.
    status: RunStatus,
    /// Logged steps in order.
    steps: Vec<StepLog>,
    /// Failing step, for failed runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<FailureDetail>,
}

impl Run {
    /// Run id.
    pub fn id(&self) -> RunId {
        self.id
    }

    /// The executed flow.
    pub fn flow(&self) -> &FlowRef {
        &self.flow
    }

    /// What started the run.
    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    /// Start timestamp.
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// End timestamp.
    pub fn finished_at(&self) -> DateTime<Local> {
        self.finished_at
    }

    /// Terminal status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Logged steps in execution order.
    pub fn steps(&self) -> &[StepLog] {
        &self.steps
    }

    /// Failing step, for failed runs.
    pub fn failure(&self) -> Option<&FailureDetail> {
        self.failure.as_ref()
    }
}

/// In-progress run record, owned by the worker.
#[derive(Debug)]
pub struct RunLog {
    /// Run id.
    id: RunId,
    /// Flow summary.
    flow: FlowRef,
    /// What started it.
    trigger: Trigger,
    /// Start time.
    started_at: DateTime<Local>,
    /// Steps logged so far.
    steps: Vec<StepLog>,
}

impl RunLog {
    /// Open a log for `flow`, stamping the start time.
    pub fn open(id: RunId, flow: &Flow, trigger: Trigger) -> Self {
        Self {
            id,
            flow: FlowRef {
                id: flow.id.clone(),
                name: flow.name.clone(),
                step_count: flow.steps.len(),
            },
            trigger,
            started_at: Local::now(),
            steps: Vec::with_capacity(flow.steps.len()),
        }
    }

    /// Append a step entry.
    pub fn append(&mut self, entry: StepLog) {
        debug_assert!(self.steps.len() < self.flow.step_count);
        self.steps.push(entry);
    }

    /// Number of entries so far.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when no step was logged.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Close the log with its terminal status.
    pub fn seal(self, status: RunStatus, failure: Option<FailureDetail>) -> Run {
        Run {
            id: self.id,
            flow: self.flow,
            trigger: self.trigger,
            started_at: self.started_at,
            finished_at: Local::now(),
            status,
            steps: self.steps,
            failure,
        }
    }
}

/// Append-only persistence for finished runs.
pub trait RunArchive: Send + Sync {
    /// Persist one terminal run.
    fn append(&self, run: &Run) -> Result<()>;
}

/// Archive writing one JSON object per line.
#[derive(Debug)]
pub struct JsonlArchive {
    /// Target file.
    path: PathBuf,
    /// Serializes appends.
    lock: Mutex<()>,
}

impl JsonlArchive {
    /// Archive at `path`; parent directories are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Archive file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every run from a JSONL archive. A missing file is an empty archive.
    pub fn read_all(path: &Path) -> Result<Vec<Run>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(path)?);
        let mut runs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            runs.push(serde_json::from_str(&line)?);
        }
        Ok(runs)
    }
}

impl RunArchive for JsonlArchive {
    fn append(&self, run: &Run) -> Result<()> {
        let mut line = serde_json::to_string(run)?;
        line.push('\n');
        let _guard = self.lock.lock();
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        debug!(run_id = %run.id, path = %self.path.display(), "run_archived");
        Ok(())
    }
}
