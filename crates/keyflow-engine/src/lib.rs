//! keyflow engine
//!
//! The engine coordinates flow runs started from three independent sources:
//! manual requests, global hotkeys and the scheduler. It guarantees at most
//! one active run, supports cooperative stops (including a reserved
//! emergency-stop chord), and records every run as an immutable [`Run`].
//!
//! - [`Engine`]: the facade you build with [`EngineBuilder`] and drive
//! - [`ActionCapability`]: the host-supplied executor for step actions
//! - [`TriggerManager`]: hotkey registry plus scheduler
//! - [`Dispatcher`] and [`RunStateMachine`]: the run core, usable on their own
use std::{sync::Arc, time::Duration};

mod action;
mod cron;
mod deps;
mod dispatcher;
mod error;
mod hotkeys;
mod notification;
mod runlog;
mod runner;
mod schedule;
mod scheduler;
mod stop;
mod ticker;
mod trigger;

pub mod test_support;

use keyflow_config::{FlowStore, Settings};
use keyflow_keycode::Chord;
use keyflow_protocol::{FlowId, RunId, SkipReason, Trigger, ipc::EventTx};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use action::{ActionCapability, ActionError, LoggingActions, StepContext};
pub use cron::CronExpr;
pub use deps::{HotkeyApi, HotkeyEvents, MockHotkeyApi};
pub use dispatcher::{
    ActiveRun, DispatchOutcome, Dispatcher, History, RunRequest, RunRequests, SkippedTrigger,
};
pub use error::{Error, Result};
pub use hotkeys::{Binding, HotkeyConflict, HotkeyRegistry};
pub use notification::EventSink;
pub use runlog::{FailureDetail, FlowRef, JsonlArchive, Run, RunArchive, RunLog, StepLog};
pub use runner::{RunOptions, RunPhase, RunStateMachine};
pub use schedule::{Schedule, ScheduleParseError};
pub use scheduler::{Clock, LocalClock, ManualClock, Scheduler};
pub use stop::StopController;
pub use trigger::{LoadReport, TriggerManager};

/// Engine tuning, usually derived from [`Settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reserved chord that stops the active run.
    pub emergency_hotkey: Chord,
    /// Delay before the first step of hotkey-started runs.
    pub hotkey_release_delay: Duration,
    /// Scheduler evaluation interval.
    pub scheduler_tick: Duration,
    /// Optional per-action timeout.
    pub action_timeout: Option<Duration>,
    /// Finished runs and skipped notes kept in memory.
    pub history_limit: usize,
}

impl From<&Settings> for EngineConfig {
    fn from(s: &Settings) -> Self {
        Self {
            emergency_hotkey: s.emergency_hotkey.clone(),
            hotkey_release_delay: Duration::from_millis(s.hotkey_trigger_delay_ms),
            scheduler_tick: Duration::from_millis(s.scheduler_tick_ms.max(1)),
            action_timeout: s.action_timeout_ms.map(Duration::from_millis),
            history_limit: s.history_limit,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    /// Flow store.
    store: Arc<dyn FlowStore>,
    /// Action backend.
    capability: Arc<dyn ActionCapability>,
    /// Tunables.
    config: EngineConfig,
    /// Hotkey backend; a mock when unset.
    hotkeys: Option<(Arc<dyn HotkeyApi>, HotkeyEvents)>,
    /// Optional archive.
    archive: Option<Arc<dyn RunArchive>>,
    /// Time source for schedules.
    clock: Arc<dyn Clock>,
    /// Observer channel.
    events: Option<EventTx>,
}

impl EngineBuilder {
    /// Start from the two required collaborators.
    pub fn new(store: Arc<dyn FlowStore>, capability: Arc<dyn ActionCapability>) -> Self {
        Self {
            store,
            capability,
            config: EngineConfig::default(),
            hotkeys: None,
            archive: None,
            clock: Arc::new(LocalClock),
            events: None,
        }
    }

    /// Override the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a hotkey backend and the event stream it reports presses on.
    pub fn hotkeys(mut self, api: Arc<dyn HotkeyApi>, events: HotkeyEvents) -> Self {
        self.hotkeys = Some((api, events));
        self
    }

    /// Persist finished runs.
    pub fn archive(mut self, archive: Arc<dyn RunArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Replace the scheduler clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Deliver [`CoreEvent`](keyflow_protocol::CoreEvent)s to `tx`.
    pub fn events(mut self, tx: EventTx) -> Self {
        self.events = Some(tx);
        self
    }

    /// Spawn the dispatcher and trigger tasks. Must be called inside a tokio
    /// runtime.
    pub fn start(self) -> Result<Engine> {
        let events = self.events.map_or_else(EventSink::detached, EventSink::new);
        let (api, hotkey_events) = match self.hotkeys {
            Some(pair) => pair,
            None => {
                let (api, rx) = MockHotkeyApi::new();
                (Arc::new(api) as Arc<dyn HotkeyApi>, rx)
            }
        };
        let (requests, request_rx) = RunRequests::channel();
        let active = ActiveRun::new(events.clone());
        let history = History::new(self.config.history_limit);
        let machine = Arc::new(RunStateMachine::new(
            self.capability,
            events.clone(),
            RunOptions {
                hotkey_release_delay: self.config.hotkey_release_delay,
                action_timeout: self.config.action_timeout,
            },
        ));

        let triggers = TriggerManager::new(
            api,
            requests.clone(),
            active.clone(),
            events.clone(),
            self.clock,
        );
        triggers.reserve_emergency_stop(&self.config.emergency_hotkey)?;
        let report = triggers.load_bindings(self.store.as_ref());
        if !report.is_clean() {
            warn!(
                conflicts = report.conflicts.len(),
                rejected = report.rejected.len(),
                "some triggers were not armed"
            );
        }

        let cancel = CancellationToken::new();
        let dispatcher = Dispatcher::new(
            self.store.clone(),
            machine,
            self.archive,
            active.clone(),
            history.clone(),
            events,
        )
        .spawn(request_rx, cancel.clone());
        triggers.start(hotkey_events, self.config.scheduler_tick);
        info!(
            emergency = %self.config.emergency_hotkey,
            tick_ms = self.config.scheduler_tick.as_millis(),
            "engine_started"
        );

        Ok(Engine {
            store: self.store,
            triggers,
            requests,
            active,
            history,
            cancel,
            dispatcher: Mutex::new(Some(dispatcher)),
            last_report: Mutex::new(report),
        })
    }
}

/// Running engine. Dropping it without [`shutdown`](Self::shutdown) leaves
/// the background tasks to end with the runtime.
pub struct Engine {
    /// Flow store, for trigger reloads.
    store: Arc<dyn FlowStore>,
    /// Hotkeys and schedules.
    triggers: TriggerManager,
    /// Run-request producer.
    requests: RunRequests,
    /// Active-run slot.
    active: ActiveRun,
    /// Finished runs and skipped triggers.
    history: History,
    /// Cancels the dispatcher.
    cancel: CancellationToken,
    /// Dispatcher task.
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    /// Outcome of the last trigger load.
    last_report: Mutex<LoadReport>,
}

impl Engine {
    /// Request a manual run and wait for the dispatch decision.
    pub async fn run_manual(&self, flow_id: impl Into<FlowId>) -> Result<RunId> {
        let flow_id = flow_id.into();
        match self.requests.request(flow_id.clone(), Trigger::Manual).await? {
            DispatchOutcome::Started(run_id) => Ok(run_id),
            DispatchOutcome::Rejected(SkipReason::Busy) => Err(Error::Busy),
            DispatchOutcome::Rejected(SkipReason::UnknownFlow) => Err(Error::UnknownFlow(flow_id)),
            DispatchOutcome::Rejected(SkipReason::EmptyFlow) => Err(Error::EmptyFlow(flow_id)),
        }
    }

    /// Producer handle for custom request sources.
    pub fn requests(&self) -> RunRequests {
        self.requests.clone()
    }

    /// Stop the active run at its next step boundary. Bypasses the request
    /// channel; a no-op when idle.
    pub fn emergency_stop(&self) -> Option<RunId> {
        let stopped = self.active.request_stop();
        if let Some(run_id) = stopped {
            warn!(run_id = %run_id, "emergency_stop");
        }
        stopped
    }

    /// The active run, if any.
    pub fn active_run(&self) -> Option<(RunId, FlowId)> {
        self.active.current()
    }

    /// Finished runs, oldest first.
    pub fn history(&self) -> Vec<Run> {
        self.history.runs()
    }

    /// Look up a finished run by id.
    pub fn finished_run(&self, run_id: RunId) -> Option<Run> {
        self.history.find(run_id)
    }

    /// Dropped requests, oldest first.
    pub fn skipped(&self) -> Vec<SkippedTrigger> {
        self.history.skipped()
    }

    /// Hotkeys and schedules.
    pub fn triggers(&self) -> &TriggerManager {
        &self.triggers
    }

    /// Trigger report from the most recent load.
    pub fn load_report(&self) -> LoadReport {
        self.last_report.lock().clone()
    }

    /// Re-derive hotkeys and schedules from the store.
    pub fn reload_triggers(&self) -> LoadReport {
        let report = self.triggers.load_bindings(self.store.as_ref());
        *self.last_report.lock() = report.clone();
        report
    }

    /// Stop trigger sources, stop any active run and wait for the dispatcher.
    pub async fn shutdown(&self) {
        self.triggers.shutdown().await;
        self.cancel.cancel();
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            handle.await.ok();
        }
        debug!("engine_shutdown");
    }
}
