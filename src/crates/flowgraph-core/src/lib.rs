//! Planner and concurrent runtime for executing node-graph programs.
//!
//! A host supplies a graph (a slice of [`descriptor::NodeDescriptor`] plus
//! [`descriptor::Connection`]), an [`binding::OperatorRegistry`] resolving
//! each node to an implementation, and hands both to a [`runtime::Runtime`].
//! The runtime asks [`planner::Planner`] to turn the graph into a
//! [`plan::HierarchicalPlan`] once, then walks that plan to execute nodes,
//! resolving data inputs lazily and following execution signals as they
//! fire.

pub mod binding;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod event_bus;
pub mod gate;
pub mod plan;
pub mod planner;
pub mod runtime;
pub mod socket_type;
pub mod storage;
pub mod value;

pub use binding::{DeclaredOperator, InlineOperator, NodeBuilder, OperatorRegistry};
pub use context::{ExecutionContext, FeedbackKind, RuntimeCallbacks};
pub use descriptor::{Connection, NodeDescriptor, NodeId, SocketDescriptor, SocketFlavor, SocketSide};
pub use error::{FlowError, Result, Severity, ValidationMessage};
pub use event_bus::EventBus;
pub use gate::Gate;
pub use plan::{BranchStep, HierarchicalPlan, LayerStep, LoopStep, Step};
pub use planner::{PlanOutput, Planner};
pub use runtime::{Runtime, RuntimeEvent, RuntimeOptions};
pub use socket_type::{BuiltinSocketTypeResolver, SocketTypeResolver};
pub use storage::ExecutionStorage;
pub use value::Value;
