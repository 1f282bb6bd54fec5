//! Global hotkey registry: one binding per normalized chord.

use std::{collections::HashMap, fmt, sync::Arc};

use keyflow_keycode::Chord;
use keyflow_protocol::FlowId;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::deps::HotkeyApi;

/// What a registered chord does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The reserved emergency-stop chord.
    EmergencyStop,
    /// Starts a flow.
    Flow(FlowId),
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmergencyStop => f.write_str("emergency stop"),
            Self::Flow(id) => write!(f, "flow {id}"),
        }
    }
}

/// A registration collided with an existing binding; the existing binding is
/// left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("hotkey {combo} is already bound to {existing}")]
pub struct HotkeyConflict {
    /// Canonical chord string.
    pub combo: String,
    /// Current owner of the chord.
    pub existing: Binding,
}

impl HotkeyConflict {
    /// Owning flow, or `None` for the emergency-stop chord.
    pub fn existing_flow_id(&self) -> Option<&FlowId> {
        match &self.existing {
            Binding::Flow(id) => Some(id),
            Binding::EmergencyStop => None,
        }
    }
}

/// Maps canonical chord strings to bindings and backend registrations.
pub struct HotkeyRegistry {
    /// Registration backend.
    api: Arc<dyn HotkeyApi>,
    /// Registration id → canonical combo.
    id_map: HashMap<u32, String>,
    /// Registration id → chord, so presses resolve without reparsing.
    chord_map: HashMap<u32, Chord>,
    /// Canonical combo → registration id.
    inv_map: HashMap<String, u32>,
    /// Canonical combo → binding.
    bindings: HashMap<String, Binding>,
    /// Flow → its combo.
    by_flow: HashMap<FlowId, String>,
    /// Combo reserved for emergency stop.
    emergency: Option<String>,
}

impl HotkeyRegistry {
    /// An empty registry over `api`.
    pub fn new(api: Arc<dyn HotkeyApi>) -> Self {
        Self {
            api,
            id_map: HashMap::new(),
            chord_map: HashMap::new(),
            inv_map: HashMap::new(),
            bindings: HashMap::new(),
            by_flow: HashMap::new(),
            emergency: None,
        }
    }

    /// Register `chord` with the backend and record it.
    fn insert(&mut self, combo: String, chord: &Chord, binding: Binding) {
        let id = self.api.intercept(chord.clone());
        trace!(combo = %combo, id, binding = %binding, "hotkey_registered");
        self.id_map.insert(id, combo.clone());
        self.chord_map.insert(id, chord.clone());
        self.inv_map.insert(combo.clone(), id);
        self.bindings.insert(combo, binding);
    }

    /// Unregister `combo` and forget it.
    fn release(&mut self, combo: &str) {
        self.bindings.remove(combo);
        if let Some(id) = self.inv_map.remove(combo) {
            self.id_map.remove(&id);
            self.chord_map.remove(&id);
            if let Err(e) = self.api.unregister(id) {
                warn!(combo, id, error = %e, "hotkey_unregister_failed");
            }
            trace!(combo, id, "hotkey_released");
        }
    }

    /// Reserve the emergency-stop chord. Fails if a flow already owns it;
    /// replaces a previously reserved emergency chord.
    pub fn reserve_emergency_stop(&mut self, chord: &Chord) -> Result<(), HotkeyConflict> {
        let combo = chord.to_string_canonical();
        match self.bindings.get(&combo) {
            Some(Binding::EmergencyStop) => return Ok(()),
            Some(existing) => {
                return Err(HotkeyConflict {
                    combo,
                    existing: existing.clone(),
                });
            }
            None => {}
        }
        if let Some(old) = self.emergency.take() {
            self.release(&old);
        }
        debug!(combo = %combo, "emergency_stop_reserved");
        self.insert(combo.clone(), chord, Binding::EmergencyStop);
        self.emergency = Some(combo);
        Ok(())
    }

    /// Bind `chord` to `flow_id`.
    ///
    /// Binding the same chord to the same flow again is a no-op. A flow that
    /// already has a different chord releases it first. A chord owned by
    /// another flow or by the emergency stop is a conflict.
    pub fn register(&mut self, chord: &Chord, flow_id: &FlowId) -> Result<(), HotkeyConflict> {
        let combo = chord.to_string_canonical();
        match self.bindings.get(&combo) {
            Some(Binding::Flow(owner)) if owner == flow_id => return Ok(()),
            Some(existing) => {
                return Err(HotkeyConflict {
                    combo,
                    existing: existing.clone(),
                });
            }
            None => {}
        }
        self.unregister(flow_id);
        self.insert(combo.clone(), chord, Binding::Flow(flow_id.clone()));
        self.by_flow.insert(flow_id.clone(), combo);
        Ok(())
    }

    /// Remove a flow's binding. Returns whether it had one.
    pub fn unregister(&mut self, flow_id: &FlowId) -> bool {
        match self.by_flow.remove(flow_id) {
            Some(combo) => {
                self.release(&combo);
                true
            }
            None => false,
        }
    }

    /// Remove every flow binding, keeping the emergency stop.
    pub fn clear_flows(&mut self) {
        let combos: Vec<String> = self.by_flow.drain().map(|(_, c)| c).collect();
        for combo in combos {
            self.release(&combo);
        }
    }

    /// Resolve a backend registration id.
    pub fn resolve(&self, id: u32) -> Option<(Binding, Chord)> {
        let combo = self.id_map.get(&id)?;
        let binding = self.bindings.get(combo)?.clone();
        let chord = self.chord_map.get(&id)?.clone();
        Some((binding, chord))
    }

    /// Canonical combo bound to `flow_id`.
    pub fn combo_for(&self, flow_id: &FlowId) -> Option<&str> {
        self.by_flow.get(flow_id).map(String::as_str)
    }

    /// Current bindings as sorted (combo, binding) pairs.
    pub fn bindings_snapshot(&self) -> Vec<(String, Binding)> {
        let mut pairs: Vec<(String, Binding)> = self
            .bindings
            .iter()
            .map(|(c, b)| (c.clone(), b.clone()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
}
