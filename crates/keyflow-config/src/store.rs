//! Read access to flows for the engine.

use std::{collections::BTreeMap, sync::Arc};

use keyflow_keycode::Chord;
use keyflow_protocol::FlowId;
use parking_lot::RwLock;

use crate::{Flow, FlowFile, ScheduleSpec};

/// Trigger bindings declared by one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerBinding {
    /// Flow the bindings belong to.
    pub flow_id: FlowId,
    /// Optional hotkey.
    pub hotkey: Option<Chord>,
    /// Optional schedule.
    pub schedule: Option<ScheduleSpec>,
}

/// Source of flow definitions. Implementations hand out immutable snapshots;
/// a run keeps the `Arc<Flow>` it started with even if the store changes.
pub trait FlowStore: Send + Sync {
    /// Look up a flow by id.
    fn load_flow(&self, id: &FlowId) -> Option<Arc<Flow>>;

    /// All flows, ordered by id.
    fn flows(&self) -> Vec<Arc<Flow>>;

    /// Every flow that declares at least one trigger.
    fn trigger_bindings(&self) -> Vec<TriggerBinding> {
        self.flows()
            .iter()
            .filter(|f| f.hotkey.is_some() || f.schedule.is_some())
            .map(|f| TriggerBinding {
                flow_id: f.id.clone(),
                hotkey: f.hotkey.as_ref().map(|h| h.keys.clone()),
                schedule: f.schedule.clone(),
            })
            .collect()
    }
}

/// In-memory store keyed by flow id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Snapshots keyed by flow id.
    flows: RwLock<BTreeMap<FlowId, Arc<Flow>>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from flows; later duplicates replace earlier ones.
    pub fn from_flows(flows: impl IntoIterator<Item = Flow>) -> Self {
        let store = Self::new();
        for f in flows {
            store.upsert(f);
        }
        store
    }

    /// Insert or replace a flow, returning the previous snapshot.
    pub fn upsert(&self, flow: Flow) -> Option<Arc<Flow>> {
        self.flows.write().insert(flow.id.clone(), Arc::new(flow))
    }

    /// Remove a flow.
    pub fn remove(&self, id: &FlowId) -> Option<Arc<Flow>> {
        self.flows.write().remove(id)
    }

    /// Number of stored flows.
    pub fn len(&self) -> usize {
        self.flows.read().len()
    }

    /// True when no flows are stored.
    pub fn is_empty(&self) -> bool {
        self.flows.read().is_empty()
    }
}

impl From<FlowFile> for MemoryStore {
    fn from(file: FlowFile) -> Self {
        Self::from_flows(file.flows)
    }
}

impl FlowStore for MemoryStore {
    fn load_flow(&self, id: &FlowId) -> Option<Arc<Flow>> {
        self.flows.read().get(id).cloned()
    }

    fn flows(&self) -> Vec<Arc<Flow>> {
        self.flows.read().values().cloned().collect()
    }
}
