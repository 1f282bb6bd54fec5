//! Run dispatcher: the single consumer of run requests.
//!
//! The dispatcher is the only place the one-active-run rule is enforced. It
//! accepts a request only while idle, hands the flow snapshot to a blocking
//! worker, and frees itself when the worker reports the finished run.
//! Requests that arrive while busy are rejected immediately, never queued.

use std::{
    collections::VecDeque,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use chrono::{DateTime, Local};
use keyflow_config::FlowStore;
use keyflow_protocol::{FlowId, RunId, RunStatus, SkipReason, Trigger};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    task::{self, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    Error, Result,
    notification::EventSink,
    runlog::{Run, RunArchive},
    runner::RunStateMachine,
    stop::StopController,
};

/// A request to start a flow.
#[derive(Debug)]
pub struct RunRequest {
    /// Flow to run.
    pub flow_id: FlowId,
    /// Requesting source.
    pub trigger: Trigger,
    /// Optional reply slot for the dispatch outcome.
    pub reply: Option<oneshot::Sender<DispatchOutcome>>,
}

/// What the dispatcher did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A run was created.
    Started(RunId),
    /// No run was created.
    Rejected(SkipReason),
}

/// Cloneable producer side of the run-request channel.
#[derive(Debug, Clone)]
pub struct RunRequests {
    /// Request sender.
    tx: mpsc::UnboundedSender<RunRequest>,
}

impl RunRequests {
    /// Create the channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue a request without waiting for the outcome. Never blocks.
    pub fn submit(&self, flow_id: FlowId, trigger: Trigger) -> Result<()> {
        self.tx
            .send(RunRequest {
                flow_id,
                trigger,
                reply: None,
            })
            .map_err(|_| Error::ChannelClosed)
    }

    /// Enqueue a request and wait for the dispatcher's decision.
    pub async fn request(&self, flow_id: FlowId, trigger: Trigger) -> Result<DispatchOutcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RunRequest {
                flow_id,
                trigger,
                reply: Some(reply),
            })
            .map_err(|_| Error::ChannelClosed)?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }
}

/// The run currently owned by a worker.
#[derive(Debug, Clone)]
struct ActiveEntry {
    /// Id of the active run.
    run_id: RunId,
    /// Flow it was started from.
    flow_id: FlowId,
    /// Stop flag shared with the worker.
    stop: StopController,
}

/// Slot holding the active run's stop controller. Stop sources reach the
/// worker through here without going through the request channel.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    /// The active run, if any.
    slot: Arc<Mutex<Option<ActiveEntry>>>,
    /// Event sink for stop notifications.
    events: EventSink,
}

impl ActiveRun {
    /// An empty slot.
    pub fn new(events: EventSink) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            events,
        }
    }

    /// Request a stop of the active run. No-op when idle.
    pub fn request_stop(&self) -> Option<RunId> {
        let entry = self.slot.lock().clone()?;
        if entry.stop.request_stop() {
            self.events.stop_requested(entry.run_id);
        }
        Some(entry.run_id)
    }

    /// The active run, if any.
    pub fn current(&self) -> Option<(RunId, FlowId)> {
        self.slot
            .lock()
            .as_ref()
            .map(|e| (e.run_id, e.flow_id.clone()))
    }

    /// Whether a run is active.
    pub fn is_busy(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Claim the slot.
    fn set(&self, entry: ActiveEntry) {
        *self.slot.lock() = Some(entry);
    }

    /// Free the slot.
    fn clear(&self) {
        *self.slot.lock() = None;
    }
}

/// A dropped run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTrigger {
    /// Requesting source.
    pub source: Trigger,
    /// Flow that was requested.
    pub flow_id: FlowId,
    /// When the request was dropped.
    pub at: DateTime<Local>,
    /// Why.
    pub reason: SkipReason,
}

/// Storage behind [`History`].
#[derive(Debug)]
struct Ledger {
    /// Finished runs, oldest first.
    runs: VecDeque<Run>,
    /// Skipped-trigger notes, oldest first.
    skipped: VecDeque<SkippedTrigger>,
    /// Capacity of each queue.
    limit: usize,
}

/// Bounded in-memory history of finished runs and skipped triggers.
#[derive(Debug, Clone)]
pub struct History {
    /// Shared ledger.
    inner: Arc<Mutex<Ledger>>,
}

impl History {
    /// Keep at most `limit` entries of each kind.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Ledger {
                runs: VecDeque::new(),
                skipped: VecDeque::new(),
                limit: limit.max(1),
            })),
        }
    }

    /// Record a finished run, evicting the oldest.
    fn push_run(&self, run: Run) {
        let mut l = self.inner.lock();
        if l.runs.len() == l.limit {
            l.runs.pop_front();
        }
        l.runs.push_back(run);
    }

    /// Record a skipped trigger, evicting the oldest.
    fn push_skipped(&self, note: SkippedTrigger) {
        let mut l = self.inner.lock();
        if l.skipped.len() == l.limit {
            l.skipped.pop_front();
        }
        l.skipped.push_back(note);
    }

    /// Finished runs, oldest first.
    pub fn runs(&self) -> Vec<Run> {
        self.inner.lock().runs.iter().cloned().collect()
    }

    /// Skipped-trigger notes, oldest first.
    pub fn skipped(&self) -> Vec<SkippedTrigger> {
        self.inner.lock().skipped.iter().cloned().collect()
    }

    /// Look up a finished run.
    pub fn find(&self, run_id: RunId) -> Option<Run> {
        self.inner
            .lock()
            .runs
            .iter()
            .rev()
            .find(|r| r.id() == run_id)
            .cloned()
    }
}

/// Message from a worker back to the dispatch loop.
#[derive(Debug)]
enum WorkerDone {
    /// The run reached a terminal state.
    Finished(Run),
    /// The worker died before producing a run.
    Crashed(RunId),
}

/// The request consumer.
pub struct Dispatcher {
    /// Flow snapshots.
    store: Arc<dyn FlowStore>,
    /// Shared run state machine.
    machine: Arc<RunStateMachine>,
    /// Optional persistent archive.
    archive: Option<Arc<dyn RunArchive>>,
    /// Active-run slot.
    active: ActiveRun,
    /// In-memory history.
    history: History,
    /// Event sink.
    events: EventSink,
}

impl Dispatcher {
    /// Assemble a dispatcher.
    pub fn new(
        store: Arc<dyn FlowStore>,
        machine: Arc<RunStateMachine>,
        archive: Option<Arc<dyn RunArchive>>,
        active: ActiveRun,
        history: History,
        events: EventSink,
    ) -> Self {
        Self {
            store,
            machine,
            archive,
            active,
            history,
            events,
        }
    }

    /// Spawn the dispatch loop. On cancellation an active run is asked to
    /// stop and awaited before the loop exits.
    pub fn spawn(
        self,
        requests: mpsc::UnboundedReceiver<RunRequest>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run_loop(requests, cancel))
    }

    /// Consume requests and worker reports until cancelled.
    async fn run_loop(
        self,
        mut requests: mpsc::UnboundedReceiver<RunRequest>,
        cancel: CancellationToken,
    ) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<WorkerDone>();
        debug!("dispatcher_start");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(done) = done_rx.recv() => self.finish(done),
                req = requests.recv() => match req {
                    Some(req) => self.handle(req, &done_tx),
                    None => break,
                },
            }
        }
        if self.active.request_stop().is_some()
            && let Some(done) = done_rx.recv().await
        {
            self.finish(done);
        }
        debug!("dispatcher_stop");
    }

    /// Accept or reject one request.
    fn handle(&self, req: RunRequest, done_tx: &mpsc::UnboundedSender<WorkerDone>) {
        let RunRequest {
            flow_id,
            trigger,
            reply,
        } = req;
        let outcome = if self.active.is_busy() {
            DispatchOutcome::Rejected(SkipReason::Busy)
        } else {
            match self.store.load_flow(&flow_id) {
                None => DispatchOutcome::Rejected(SkipReason::UnknownFlow),
                Some(flow) if !flow.is_runnable() => DispatchOutcome::Rejected(SkipReason::EmptyFlow),
                Some(flow) => {
                    let run_id = RunId::new();
                    let stop = StopController::new();
                    self.active.set(ActiveEntry {
                        run_id,
                        flow_id: flow_id.clone(),
                        stop: stop.clone(),
                    });
                    self.events.run_started(run_id, flow_id.clone(), trigger.clone());
                    let machine = self.machine.clone();
                    let archive = self.archive.clone();
                    let trigger = trigger.clone();
                    let worker = task::spawn_blocking(move || {
                        let run = machine.run(flow, trigger, run_id, &stop);
                        if let Some(archive) = archive {
                            archive_run(archive.as_ref(), &run);
                        }
                        run
                    });
                    let done = done_tx.clone();
                    tokio::spawn(async move {
                        let msg = match worker.await {
                            Ok(run) => WorkerDone::Finished(run),
                            Err(e) => {
                                error!(run_id = %run_id, error = %e, "run_worker_crashed");
                                WorkerDone::Crashed(run_id)
                            }
                        };
                        done.send(msg).ok();
                    });
                    DispatchOutcome::Started(run_id)
                }
            }
        };
        if let DispatchOutcome::Rejected(reason) = outcome {
            self.history.push_skipped(SkippedTrigger {
                source: trigger.clone(),
                flow_id: flow_id.clone(),
                at: Local::now(),
                reason,
            });
            self.events.trigger_skipped(trigger, flow_id, reason);
        }
        if let Some(reply) = reply {
            reply.send(outcome).ok();
        }
    }

    /// Record a worker report and free the slot.
    fn finish(&self, done: WorkerDone) {
        self.active.clear();
        match done {
            WorkerDone::Finished(run) => {
                let (run_id, status) = (run.id(), run.status());
                info!(run_id = %run_id, flow = %run.flow().id, steps = run.steps().len(), status = %status, "run_recorded");
                self.history.push_run(run);
                self.events.run_finished(run_id, status);
            }
            WorkerDone::Crashed(run_id) => {
                self.events.run_finished(run_id, RunStatus::Failed);
            }
        }
    }
}

/// Append `run` to the archive. A failing or panicking archive is logged and
/// never costs the in-memory record.
fn archive_run(archive: &dyn RunArchive, run: &Run) {
    match panic::catch_unwind(AssertUnwindSafe(|| archive.append(run))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(run_id = %run.id(), error = %e, "run_archive_failed"),
        Err(_) => error!(run_id = %run.id(), "run_archive_panicked"),
    }
}
