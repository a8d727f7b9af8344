//! Read-only graph authoring data: node and socket descriptors and
//! connections. These types are supplied by the host's node registry and
//! graph editor; the planner and runtime never mutate them during a run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A node's stable identity within one graph. Node ids are opaque strings;
/// the engine never parses them, only compares and orders them.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketSide {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketFlavor {
    Execution,
    Data,
}

/// A named port on a node. `type_name` is an opaque string the runtime
/// resolves to a concrete conversion behavior via a [`crate::socket_type::SocketTypeResolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketDescriptor {
    pub name: String,
    pub type_name: String,
    pub side: SocketSide,
    pub flavor: SocketFlavor,
    pub default: Option<Value>,
}

impl SocketDescriptor {
    pub fn input_data(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            side: SocketSide::Input,
            flavor: SocketFlavor::Data,
            default: None,
        }
    }

    pub fn output_data(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            side: SocketSide::Output,
            flavor: SocketFlavor::Data,
            default: None,
        }
    }

    pub fn input_exec(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: "exec".to_string(),
            side: SocketSide::Input,
            flavor: SocketFlavor::Execution,
            default: None,
        }
    }

    pub fn output_exec(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: "exec".to_string(),
            side: SocketSide::Output,
            flavor: SocketFlavor::Execution,
            default: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// The conventional name of a callable non-initiator's sole execution input.
pub const ENTER: &str = "Enter";
/// The conventional loop-header output that re-enters the loop body.
pub const LOOP_PATH: &str = "LoopPath";
/// The conventional loop-header output taken once iteration ends.
pub const EXIT: &str = "Exit";

/// A read-only record describing one graph vertex: its identity, the
/// operator implementation it binds to, and its socket schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: NodeId,
    pub definition_id: String,
    pub name: String,
    pub inputs: Vec<SocketDescriptor>,
    pub outputs: Vec<SocketDescriptor>,
    pub is_execution_initiator: bool,
    /// Set by the host's node registry; drives loop-header recognition
    /// without string-matching the operator name.
    pub is_loop_header: bool,
}

impl NodeDescriptor {
    pub fn is_callable(&self) -> bool {
        self.inputs.iter().any(|s| s.flavor == SocketFlavor::Execution)
            || self.outputs.iter().any(|s| s.flavor == SocketFlavor::Execution)
    }

    pub fn input(&self, name: &str) -> Option<&SocketDescriptor> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&SocketDescriptor> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn data_inputs(&self) -> impl Iterator<Item = &SocketDescriptor> {
        self.inputs.iter().filter(|s| s.flavor == SocketFlavor::Data)
    }

    pub fn exec_outputs(&self) -> impl Iterator<Item = &SocketDescriptor> {
        self.outputs.iter().filter(|s| s.flavor == SocketFlavor::Execution)
    }
}

/// A directed wire between two sockets on (possibly the same) nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub from_node: NodeId,
    pub from_socket: String,
    pub to_node: NodeId,
    pub to_socket: String,
    pub is_execution: bool,
}

impl Connection {
    pub fn new(
        from_node: impl Into<NodeId>,
        from_socket: impl Into<String>,
        to_node: impl Into<NodeId>,
        to_socket: impl Into<String>,
        is_execution: bool,
    ) -> Self {
        Self {
            from_node: from_node.into(),
            from_socket: from_socket.into(),
            to_node: to_node.into(),
            to_socket: to_socket.into(),
            is_execution,
        }
    }
}
