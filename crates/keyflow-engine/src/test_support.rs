//! Test support utilities for keyflow-engine unit and integration tests.
//! These helpers are public so the `tests/` suite can share them.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};
use keyflow_config::{Action, ActionKind, Flow, KeyPressParams, MemoryStore, WaitParams};
use keyflow_keycode::Key;
use keyflow_protocol::{CoreEvent, FlowId, RunId, RunStatus, ipc::EventRx};
use parking_lot::Mutex;
use tokio::time;

use crate::action::{ActionCapability, ActionError, StepContext};

/// One recorded capability call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Flow of the step.
    pub flow_id: FlowId,
    /// Step index.
    pub index: usize,
    /// Action kind.
    pub kind: ActionKind,
    /// Focus requirement passed in the step context.
    pub require_window_focus: bool,
}

/// Worker-side half of a [`Gate`].
struct GateSlot {
    /// Signals that the step started.
    entered: Sender<()>,
    /// Released by the test.
    release: Receiver<()>,
}

/// Handle to a step held mid-flight by [`ScriptedActions::hold`].
pub struct Gate {
    /// Fires when the step starts.
    entered: Receiver<()>,
    /// Lets the step return.
    release: Sender<()>,
}

impl Gate {
    /// Block until the held step has started, up to `timeout_ms`.
    pub fn wait_entered(&self, timeout_ms: u64) -> bool {
        self.entered
            .recv_timeout(Duration::from_millis(timeout_ms))
            .is_ok()
    }

    /// Let the held step return.
    pub fn release(&self) {
        self.release.send(()).ok();
    }
}

/// Scripted capability: records calls, sleeps on `wait`, fails or panics at
/// chosen step indices, and can hold a step until released.
#[derive(Default)]
pub struct ScriptedActions {
    /// Recorded calls.
    calls: Mutex<Vec<Call>>,
    /// Scripted failures by step index.
    failures: Mutex<HashMap<usize, ActionError>>,
    /// Held steps by index.
    gates: Mutex<HashMap<usize, GateSlot>>,
    /// Extra latency by index.
    delays: Mutex<HashMap<usize, Duration>>,
    /// Step indices that panic.
    panics: Mutex<HashSet<usize>>,
}

impl ScriptedActions {
    /// A capability where every action succeeds.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the step at `index` fail with `error`.
    pub fn fail_at(&self, index: usize, error: ActionError) {
        self.failures.lock().insert(index, error);
    }

    /// Make the step at `index` panic inside the capability call.
    pub fn panic_at(&self, index: usize) {
        self.panics.lock().insert(index);
    }

    /// Make the step at `index` block for `delay` before returning.
    pub fn delay_at(&self, index: usize, delay: Duration) {
        self.delays.lock().insert(index, delay);
    }

    /// Hold the step at `index` until the returned gate is released.
    pub fn hold(&self, index: usize) -> Gate {
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        self.gates.lock().insert(
            index,
            GateSlot {
                entered: entered_tx,
                release: release_rx,
            },
        );
        Gate {
            entered: entered_rx,
            release: release_tx,
        }
    }

    /// Calls made so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Step indices called so far.
    pub fn called_indices(&self) -> Vec<usize> {
        self.calls.lock().iter().map(|c| c.index).collect()
    }
}

impl ActionCapability for ScriptedActions {
    fn execute(&self, action: &Action, ctx: &StepContext) -> Result<(), ActionError> {
        self.calls.lock().push(Call {
            flow_id: ctx.flow_id.clone(),
            index: ctx.step_index,
            kind: action.kind(),
            require_window_focus: ctx.require_window_focus,
        });
        let gate = self.gates.lock().remove(&ctx.step_index);
        if let Some(gate) = gate {
            gate.entered.send(()).ok();
            gate.release.recv().ok();
        }
        let delay = self.delays.lock().get(&ctx.step_index).copied();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        if let Action::Wait(p) = action {
            thread::sleep(Duration::from_millis(p.ms));
        }
        if self.panics.lock().contains(&ctx.step_index) {
            panic!("scripted panic at step {}", ctx.step_index);
        }
        match self.failures.lock().get(&ctx.step_index) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// The reference flow `[Wait(100), KeyPress(A), Wait(100)]`.
pub fn wait_press_wait(id: &str) -> Flow {
    Flow::new(
        id,
        id,
        vec![
            Action::Wait(WaitParams { ms: 100 }),
            Action::KeyPress(KeyPressParams { key: Key::A }),
            Action::Wait(WaitParams { ms: 100 }),
        ],
    )
}

/// A store holding `flows`.
pub fn store(flows: impl IntoIterator<Item = Flow>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::from_flows(flows))
}

/// Receive events until one satisfies `pred`, up to `timeout_ms`.
pub async fn recv_until<F>(rx: &mut EventRx, timeout_ms: u64, mut pred: F) -> Option<CoreEvent>
where
    F: FnMut(&CoreEvent) -> bool,
{
    time::timeout(Duration::from_millis(timeout_ms), async {
        while let Some(ev) = rx.recv().await {
            if pred(&ev) {
                return Some(ev);
            }
        }
        None
    })
    .await
    .unwrap_or(None)
}

/// Wait for `RunFinished` of `run_id` and return its status.
pub async fn wait_finished(rx: &mut EventRx, run_id: RunId, timeout_ms: u64) -> Option<RunStatus> {
    match recv_until(rx, timeout_ms, |ev| {
        matches!(ev, CoreEvent::RunFinished { run_id: id, .. } if *id == run_id)
    })
    .await
    {
        Some(CoreEvent::RunFinished { status, .. }) => Some(status),
        _ => None,
    }
}
