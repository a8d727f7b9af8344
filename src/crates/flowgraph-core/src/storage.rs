//! Per-run execution storage: socket values, variables, and executed marks,
//! with copy-on-write scoped overlays for parallel-foreach isolation.
//!
//! Storage is created fresh when a run begins and discarded when it ends.
//! Distinct `(node, socket)` keys may be mutated concurrently; the planner's
//! at-most-one-producer-per-input guarantee means same-key concurrent
//! writes would only arise from a graph-authoring error, so they are left
//! undefined rather than serialized.

use std::sync::Arc;

use dashmap::DashMap;

use crate::descriptor::NodeId;
use crate::event_bus::EventBus;
use crate::value::Value;

/// Keyed bag of socket values, run-scoped variables, and executed marks.
/// Child scopes (built by [`ExecutionStorage::scoped_child`]) read through
/// to their parent on miss and keep writes local, discarding them when the
/// scope ends.
pub struct ExecutionStorage {
    sockets: DashMap<(NodeId, String), Value>,
    variables: DashMap<String, Value>,
    executed: DashMap<NodeId, bool>,
    event_bus: Arc<EventBus>,
    parent: Option<Arc<ExecutionStorage>>,
}

impl ExecutionStorage {
    pub fn new(event_bus: Arc<EventBus>) -> Arc<Self> {
        Arc::new(Self {
            sockets: DashMap::new(),
            variables: DashMap::new(),
            executed: DashMap::new(),
            event_bus,
            parent: None,
        })
    }

    /// Build a child scope whose reads fall through to `parent` on miss and
    /// whose writes never escape the child. Used by parallel-foreach to
    /// isolate each iteration's body.
    pub fn scoped_child(parent: &Arc<ExecutionStorage>) -> Arc<Self> {
        Arc::new(Self {
            sockets: DashMap::new(),
            variables: DashMap::new(),
            executed: DashMap::new(),
            event_bus: parent.event_bus.clone(),
            parent: Some(parent.clone()),
        })
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn get_socket(&self, node: &NodeId, socket: &str) -> Option<Value> {
        let key = (node.clone(), socket.to_string());
        if let Some(v) = self.sockets.get(&key) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get_socket(node, socket))
    }

    pub fn set_socket(&self, node: &NodeId, socket: &str, value: Value) {
        self.sockets.insert((node.clone(), socket.to_string()), value);
    }

    /// Drop a cached socket value in this scope only, forcing the next
    /// lazy-resolution pass to pull it again. Used by condition-reread loop
    /// headers (While/Do While/Repeat Until) whose condition input must
    /// reflect side effects from the prior iteration's body, and by the
    /// runtime when resetting a node for re-invocation (loop-body iteration,
    /// stream emission) so it re-resolves rather than reading a stale input.
    pub fn clear_socket(&self, node: &NodeId, socket: &str) {
        self.sockets.remove(&(node.clone(), socket.to_string()));
    }

    pub fn is_executed(&self, node: &NodeId) -> bool {
        if self.executed.get(node).map(|v| *v).unwrap_or(false) {
            return true;
        }
        self.parent.as_ref().map(|p| p.is_executed(node)).unwrap_or(false)
    }

    pub fn mark_executed(&self, node: &NodeId) {
        self.executed.insert(node.clone(), true);
    }

    /// Clear executed marks for the given node ids, local to this scope
    /// only. Used at the start of each loop-body iteration, and before each
    /// streaming emission's downstream chain, so those nodes re-run; does
    /// not touch a parent scope's marks.
    pub fn clear_executed(&self, nodes: &[NodeId]) {
        for node in nodes {
            self.executed.remove(node);
        }
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        let key = name.to_lowercase();
        if let Some(v) = self.variables.get(&key) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.get_variable(name))
    }

    pub fn set_variable(&self, name: &str, value: Value) {
        self.variables.insert(name.to_lowercase(), value);
    }

    pub fn is_scoped(&self) -> bool {
        self.parent.is_some()
    }
}
