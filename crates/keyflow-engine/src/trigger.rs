//! Trigger manager: hotkey registry and scheduler feeding the request channel.
//!
//! The manager owns the hotkey listener task and the scheduler tick task.
//! Both only ever submit [`RunRequest`](crate::RunRequest)s; neither touches a
//! run directly. The emergency-stop chord is the one exception: it goes
//! straight to the active run's stop controller.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use chrono::NaiveDateTime;
use keyflow_config::{FlowStore, ScheduleSpec};
use keyflow_keycode::Chord;
use keyflow_protocol::{FlowId, Trigger};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    deps::{HotkeyApi, HotkeyEvents},
    dispatcher::{ActiveRun, RunRequests},
    hotkeys::{Binding, HotkeyConflict, HotkeyRegistry},
    notification::EventSink,
    schedule::ScheduleParseError,
    scheduler::{Clock, Scheduler},
    ticker::Ticker,
};

/// Outcome of deriving triggers from a flow store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    /// Bound hotkeys as (flow, canonical combo).
    pub hotkeys: Vec<(FlowId, String)>,
    /// Armed schedules as (flow, first fire time).
    pub schedules: Vec<(FlowId, NaiveDateTime)>,
    /// Rejected hotkeys as (flow that asked, conflict).
    pub conflicts: Vec<(FlowId, HotkeyConflict)>,
    /// Rejected schedules.
    pub rejected: Vec<(FlowId, ScheduleParseError)>,
}

impl LoadReport {
    /// True when every declared trigger was accepted.
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.rejected.is_empty()
    }
}

/// State shared by clones of [`TriggerManager`].
struct Inner {
    /// Hotkey bindings.
    registry: Mutex<HotkeyRegistry>,
    /// Armed schedules.
    scheduler: Mutex<Scheduler>,
    /// Run-request producer.
    requests: RunRequests,
    /// Active-run slot, for emergency stop.
    active: ActiveRun,
    /// Event sink.
    events: EventSink,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Scheduler tick task.
    ticker: Ticker,
    /// Hotkey listener task.
    listener: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

/// Owns hotkey bindings and schedules and turns them into run requests.
#[derive(Clone)]
pub struct TriggerManager {
    /// Shared state.
    inner: Arc<Inner>,
}

impl TriggerManager {
    /// Create a manager. Nothing is listened to until [`start`](Self::start).
    pub fn new(
        api: Arc<dyn HotkeyApi>,
        requests: RunRequests,
        active: ActiveRun,
        events: EventSink,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(HotkeyRegistry::new(api)),
                scheduler: Mutex::new(Scheduler::new()),
                requests,
                active,
                events,
                clock,
                ticker: Ticker::new(),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Reserve the emergency-stop chord.
    pub fn reserve_emergency_stop(&self, chord: &Chord) -> Result<(), HotkeyConflict> {
        let res = self.inner.registry.lock().reserve_emergency_stop(chord);
        if let Err(c) = &res {
            self.inner
                .events
                .hotkey_conflict(c.combo.clone(), c.existing_flow_id().cloned());
        }
        res
    }

    /// Bind a chord to a flow. Conflicts are reported as events too.
    pub fn bind_hotkey(&self, flow_id: &FlowId, chord: &Chord) -> Result<(), HotkeyConflict> {
        let res = self.inner.registry.lock().register(chord, flow_id);
        match &res {
            Ok(()) => debug!(flow = %flow_id, combo = %chord, "hotkey_bound"),
            Err(c) => self
                .inner
                .events
                .hotkey_conflict(c.combo.clone(), c.existing_flow_id().cloned()),
        }
        res
    }

    /// Remove a flow's hotkey.
    pub fn unbind_hotkey(&self, flow_id: &FlowId) -> bool {
        self.inner.registry.lock().unregister(flow_id)
    }

    /// Current hotkey bindings as sorted (combo, binding) pairs.
    pub fn hotkeys(&self) -> Vec<(String, Binding)> {
        self.inner.registry.lock().bindings_snapshot()
    }

    /// Arm a flow's schedule, returning its first fire time.
    pub fn arm_schedule(
        &self,
        flow_id: &FlowId,
        spec: &ScheduleSpec,
    ) -> Result<NaiveDateTime, ScheduleParseError> {
        let now = self.inner.clock.now();
        let res = self.inner.scheduler.lock().arm(flow_id, spec, now);
        if let Err(e) = &res {
            self.inner
                .events
                .schedule_rejected(flow_id.clone(), e.to_string());
        }
        res
    }

    /// Remove a flow's schedule.
    pub fn disarm_schedule(&self, flow_id: &FlowId) -> bool {
        self.inner.scheduler.lock().disarm(flow_id)
    }

    /// Next fire time of a flow's schedule.
    pub fn next_fire(&self, flow_id: &FlowId) -> Option<NaiveDateTime> {
        self.inner.scheduler.lock().next_fire(flow_id)
    }

    /// All armed schedules ordered by next fire time.
    pub fn upcoming(&self) -> Vec<(FlowId, NaiveDateTime)> {
        self.inner.scheduler.lock().upcoming()
    }

    /// Replace every flow hotkey and schedule with the ones `store` declares.
    /// The emergency-stop reservation is kept.
    pub fn load_bindings(&self, store: &dyn FlowStore) -> LoadReport {
        self.inner.registry.lock().clear_flows();
        self.inner.scheduler.lock().clear();
        let mut report = LoadReport::default();
        for binding in store.trigger_bindings() {
            if let Some(chord) = &binding.hotkey {
                match self.bind_hotkey(&binding.flow_id, chord) {
                    Ok(()) => report
                        .hotkeys
                        .push((binding.flow_id.clone(), chord.to_string_canonical())),
                    Err(c) => report.conflicts.push((binding.flow_id.clone(), c)),
                }
            }
            if let Some(spec) = &binding.schedule {
                match self.arm_schedule(&binding.flow_id, spec) {
                    Ok(next) => report.schedules.push((binding.flow_id.clone(), next)),
                    Err(e) => report.rejected.push((binding.flow_id.clone(), e)),
                }
            }
        }
        info!(
            hotkeys = report.hotkeys.len(),
            schedules = report.schedules.len(),
            conflicts = report.conflicts.len(),
            rejected = report.rejected.len(),
            "triggers_loaded"
        );
        report
    }

    /// Handle a press reported by the hotkey backend.
    pub fn on_hotkey(&self, id: u32) {
        let resolved = self.inner.registry.lock().resolve(id);
        match resolved {
            Some((Binding::EmergencyStop, _)) => match self.inner.active.request_stop() {
                Some(run_id) => warn!(run_id = %run_id, "emergency_stop"),
                None => debug!("emergency_stop_idle"),
            },
            Some((Binding::Flow(flow_id), chord)) => {
                let trigger = Trigger::Hotkey {
                    combo: chord.to_string_canonical(),
                };
                if self.inner.requests.submit(flow_id, trigger).is_err() {
                    debug!("hotkey_request_dropped_dispatcher_closed");
                }
            }
            None => trace!(id, "hotkey_unbound_id"),
        }
    }

    /// Evaluate schedules against the clock and submit a request for every
    /// flow that is due.
    pub fn tick_now(&self) -> usize {
        let now = self.inner.clock.now();
        let due = self.inner.scheduler.lock().tick(now);
        let n = due.len();
        for (flow_id, trigger) in due {
            debug!(flow = %flow_id, trigger = %trigger, "schedule_fired");
            if self.inner.requests.submit(flow_id, trigger).is_err() {
                debug!("schedule_request_dropped_dispatcher_closed");
            }
        }
        n
    }

    /// Start the hotkey listener and the scheduler tick. Must be called
    /// inside a tokio runtime.
    pub fn start(&self, mut hotkeys: HotkeyEvents, tick: Duration) {
        self.stop_listener();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let listener = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    id = hotkeys.recv() => {
                        let Some(id) = id else { break };
                        let Some(inner) = weak.upgrade() else { break };
                        Self { inner }.on_hotkey(id);
                    }
                }
            }
            trace!("hotkey_listener_stop");
        });
        *self.inner.listener.lock() = Some((token, listener));

        let weak = Arc::downgrade(&self.inner);
        self.inner.ticker.start(tick, tick, move || {
            if let Some(inner) = weak.upgrade() {
                Self { inner }.tick_now();
            }
        });
        debug!(tick_ms = tick.as_millis(), "triggers_started");
    }

    /// Cancel the listener and hand back its task.
    fn stop_listener(&self) -> Option<JoinHandle<()>> {
        let (token, handle) = self.inner.listener.lock().take()?;
        token.cancel();
        Some(handle)
    }

    /// Stop listening for hotkeys and schedule ticks.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.stop_listener() {
            handle.await.ok();
        }
        self.inner.ticker.shutdown().await;
    }
}
