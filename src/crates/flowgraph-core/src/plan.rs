//! The planner's output: an ordered sequence of steps the runtime walks.
//!
//! The plan keeps cycles out of the graph it directly walks — every loop is
//! routed through a [`LoopStep`] with its own nested, strictly acyclic body
//! plan — so the runtime never has to reason about back-edges itself.

use crate::descriptor::NodeDescriptor;
use crate::descriptor::NodeId;

/// An ordered sequence of steps produced by [`crate::planner::Planner::plan`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HierarchicalPlan {
    pub steps: Vec<Step>,
}

impl HierarchicalPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Layer(LayerStep),
    Loop(LoopStep),
    /// Reserved for operators whose arms are statically known; the
    /// standard Branch operator uses execution signals instead and the
    /// planner never emits this variant for it.
    Branch(BranchStep),
}

/// A set of mutually independent nodes the runtime may fan out
/// concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerStep {
    pub nodes: Vec<NodeDescriptor>,
}

/// A loop header whose body is itself a plan, recursively layered over the
/// body's forward edges.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopStep {
    pub header: NodeDescriptor,
    pub loop_socket: String,
    pub exit_socket: String,
    pub body: HierarchicalPlan,
    pub body_node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchStep {
    pub condition_node: NodeId,
    pub arms: Vec<(String, HierarchicalPlan)>,
}
