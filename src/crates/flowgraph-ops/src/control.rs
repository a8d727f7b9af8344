//! Plain control-flow operators: conditional branching, fixed sequencing,
//! a boolean gate, a fire-once latch, and structured error handling.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use flowgraph_core::binding::{DeclaredOperator, NodeBuilder};
use flowgraph_core::context::{ExecutionContext, FeedbackKind};
use flowgraph_core::descriptor::SocketDescriptor;
use flowgraph_core::error::{FlowError, Result};
use flowgraph_core::value::Value;
use flowgraph_core::OperatorRegistry;

use crate::ids;

pub fn register(registry: &mut OperatorRegistry) {
    registry.register_declared(ids::BRANCH, "Branch", std::sync::Arc::new(Branch));
    registry.register_declared(ids::SEQUENCE, "Sequence", std::sync::Arc::new(Sequence));
    registry.register_declared(ids::GATE, "Gate", std::sync::Arc::new(GateOp));
    registry.register_declared(ids::ONCE, "Once", std::sync::Arc::new(Once));
    registry.register_declared(ids::TRY_CATCH, "Try/Catch", std::sync::Arc::new(TryCatch));
}

/// `Start`:exec, `Cond`:bool in; `True`/`False`:exec out. Triggers exactly
/// one of the two outputs depending on `Cond`.
pub struct Branch;

#[async_trait]
impl DeclaredOperator for Branch {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::BRANCH, "Branch")
            .input(SocketDescriptor::input_exec("Start"))
            .input(SocketDescriptor::input_data("Cond", "bool"))
            .output(SocketDescriptor::output_exec("True"))
            .output(SocketDescriptor::output_exec("False"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        if ctx.get_input_bool("Cond")? {
            ctx.trigger("True").await
        } else {
            ctx.trigger("False").await
        }
    }
}

/// Fires `Then 0` through `Then 3` in order, awaiting each chain fully
/// before moving to the next.
pub struct Sequence;

const SEQUENCE_OUTPUTS: usize = 4;

#[async_trait]
impl DeclaredOperator for Sequence {
    fn configure(&self, builder: &mut NodeBuilder) {
        let mut b = NodeBuilder::new(ids::SEQUENCE, "Sequence").input(SocketDescriptor::input_exec("Enter"));
        for i in 0..SEQUENCE_OUTPUTS {
            b = b.output(SocketDescriptor::output_exec(format!("Then {i}")));
        }
        *builder = b;
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        for i in 0..SEQUENCE_OUTPUTS {
            ctx.trigger(&format!("Then {i}")).await?;
        }
        Ok(())
    }
}

/// `Open`:bool in; `Continue`/`Closed`:exec out.
pub struct GateOp;

#[async_trait]
impl DeclaredOperator for GateOp {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::GATE, "Gate")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Open", "bool"))
            .output(SocketDescriptor::output_exec("Continue"))
            .output(SocketDescriptor::output_exec("Closed"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        if ctx.get_input_bool("Open")? {
            ctx.trigger("Continue").await
        } else {
            ctx.trigger("Closed").await
        }
    }
}

/// Fires `First` the first time this node id runs in a run, `Already Run`
/// every time after. State lives in node-private storage, not a global, so
/// it resets cleanly between runs.
pub struct Once;

#[async_trait]
impl DeclaredOperator for Once {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::ONCE, "Once")
            .input(SocketDescriptor::input_exec("Enter"))
            .output(SocketDescriptor::output_exec("First"))
            .output(SocketDescriptor::output_exec("Already Run"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let ran_before = ctx.get_state("__once_ran").and_then(|v| v.as_bool()).unwrap_or(false);
        ctx.set_state("__once_ran", Value::Bool(true));
        if ran_before {
            ctx.trigger("Already Run").await
        } else {
            ctx.trigger("First").await
        }
    }
}

/// `Try`/`Catch`/`Finally`:exec out, `Error`:string out. Runs `Try`; an
/// `OperatorFailure` anywhere in that chain is caught here and routed to
/// `Catch` with its message written to `Error`. `Finally` always runs
/// afterward. Cancellation is never caught — it propagates immediately.
pub struct TryCatch;

#[async_trait]
impl DeclaredOperator for TryCatch {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::TRY_CATCH, "Try/Catch")
            .input(SocketDescriptor::input_exec("Enter"))
            .output(SocketDescriptor::output_exec("Try"))
            .output(SocketDescriptor::output_exec("Catch"))
            .output(SocketDescriptor::output_exec("Finally"))
            .output(SocketDescriptor::output_data("Error", "string"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        match ctx.trigger("Try").await {
            Ok(()) => {}
            Err(FlowError::Canceled) => return Err(FlowError::Canceled),
            Err(other) => {
                let message = match &other {
                    FlowError::OperatorFailure { source, .. } => source.to_string(),
                    _ => other.to_string(),
                };
                ctx.set_output("Error", Value::String(message));
                ctx.emit_feedback(other.to_string(), FeedbackKind::Warn);
                ctx.trigger("Catch").await?;
            }
        }
        ctx.trigger("Finally").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::descriptor::{Connection, NodeDescriptor, NodeId, ENTER, EXIT};
    use flowgraph_core::{Runtime, RuntimeOptions};
    use std::sync::Arc;

    fn initiator(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: "start".into(),
            name: "Start".into(),
            inputs: vec![],
            outputs: vec![SocketDescriptor::output_exec(EXIT)],
            is_execution_initiator: true,
            is_loop_header: false,
        }
    }

    fn branch_node(id: &str, cond: bool) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: ids::BRANCH.into(),
            name: "Branch".into(),
            inputs: vec![
                SocketDescriptor::input_exec("Start"),
                SocketDescriptor::input_data("Cond", "bool").with_default(Value::Bool(cond)),
            ],
            outputs: vec![SocketDescriptor::output_exec("True"), SocketDescriptor::output_exec("False")],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    fn sink(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: "sink".into(),
            name: "Sink".into(),
            inputs: vec![SocketDescriptor::input_exec(ENTER)],
            outputs: vec![SocketDescriptor::output_exec(EXIT)],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    #[tokio::test]
    async fn branch_fires_exactly_one_side() {
        let nodes = vec![initiator("start"), branch_node("b", true), sink("t"), sink("f")];
        let connections = vec![
            Connection::new("start", EXIT, "b", "Start", true),
            Connection::new("b", "True", "t", ENTER, true),
            Connection::new("b", "False", "f", ENTER, true),
        ];

        let mut registry = OperatorRegistry::new();
        register(&mut registry);
        registry.register_inline("start", "Start", flowgraph_core::binding::InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));
        registry.register_inline("sink", "Sink", flowgraph_core::binding::InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();
        assert!(report.storage.is_executed(&NodeId::new("t")));
        assert!(!report.storage.is_executed(&NodeId::new("f")));
    }

    #[tokio::test]
    async fn sequence_fires_outputs_in_order() {
        let mut registry = OperatorRegistry::new();
        register(&mut registry);
        registry.register_inline("start", "Start", flowgraph_core::binding::InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));

        let mut nodes = vec![initiator("start")];
        let mut connections = vec![Connection::new("start", EXIT, "seq", "Enter", true)];
        nodes.push(NodeDescriptor {
            id: NodeId::new("seq"),
            definition_id: ids::SEQUENCE.into(),
            name: "Sequence".into(),
            inputs: vec![SocketDescriptor::input_exec("Enter")],
            outputs: (0..SEQUENCE_OUTPUTS).map(|i| SocketDescriptor::output_exec(format!("Then {i}"))).collect(),
            is_execution_initiator: false,
            is_loop_header: false,
        });
        for i in 0..SEQUENCE_OUTPUTS {
            let step_id = format!("step{i}");
            nodes.push(sink(&step_id));
            connections.push(Connection::new("seq", format!("Then {i}"), step_id, ENTER, true));
        }
        registry.register_inline("sink", "Sink", flowgraph_core::binding::InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                ctx.set_variable(&format!("ran_{}", ctx.node().id.as_str()), Value::Bool(true));
                ctx.trigger(EXIT).await
            })
        }));

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();
        for i in 0..SEQUENCE_OUTPUTS {
            assert_eq!(report.storage.get_variable(&format!("ran_step{i}")), Some(Value::Bool(true)));
        }
    }

    #[tokio::test]
    async fn once_fires_first_then_already_run() {
        let node = NodeDescriptor {
            id: NodeId::new("once"),
            definition_id: ids::ONCE.into(),
            name: "Once".into(),
            inputs: vec![SocketDescriptor::input_exec(ENTER)],
            outputs: vec![SocketDescriptor::output_exec("First"), SocketDescriptor::output_exec("Already Run")],
            is_execution_initiator: false,
            is_loop_header: false,
        };

        let mut registry = OperatorRegistry::new();
        register(&mut registry);
        let op = registry.resolve(ids::ONCE, "Once").unwrap();
        let storage = flowgraph_core::ExecutionStorage::new(flowgraph_core::EventBus::new());
        let mut ctx = ExecutionContext::new(&node, &storage, CancellationToken::new());
        // No runtime attached: trigger() fails, but we only assert the
        // once-latch's own state transition via get_state.
        let _ = op.execute(&mut ctx, &CancellationToken::new()).await;
        assert_eq!(ctx.get_state("__once_ran"), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn try_catch_routes_operator_failure_to_catch_and_always_runs_finally() {
        #[derive(Debug)]
        struct Boom;
        impl std::fmt::Display for Boom {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "boom")
            }
        }
        impl std::error::Error for Boom {}

        let nodes = vec![
            initiator("start"),
            NodeDescriptor {
                id: NodeId::new("tc"),
                definition_id: ids::TRY_CATCH.into(),
                name: "Try/Catch".into(),
                inputs: vec![SocketDescriptor::input_exec(ENTER)],
                outputs: vec![
                    SocketDescriptor::output_exec("Try"),
                    SocketDescriptor::output_exec("Catch"),
                    SocketDescriptor::output_exec("Finally"),
                    SocketDescriptor::output_data("Error", "string"),
                ],
                is_execution_initiator: false,
                is_loop_header: false,
            },
            sink("thrower"),
            sink("catch_sink"),
            sink("finally_sink"),
        ];
        let connections = vec![
            Connection::new("start", EXIT, "tc", ENTER, true),
            Connection::new("tc", "Try", "thrower", ENTER, true),
            Connection::new("tc", "Catch", "catch_sink", ENTER, true),
            Connection::new("tc", "Finally", "finally_sink", ENTER, true),
        ];

        let mut registry = OperatorRegistry::new();
        register(&mut registry);
        registry.register_inline("start", "Start", flowgraph_core::binding::InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));
        registry.register_inline(
            "sink",
            "Sink",
            flowgraph_core::binding::InlineOperator::new(|ctx, _c| {
                Box::pin(async move {
                    if ctx.node().id.as_str() == "thrower" {
                        return Err(FlowError::operator_failure(ctx.node().id.clone(), Boom));
                    }
                    ctx.set_variable(&format!("ran_{}", ctx.node().id.as_str()), Value::Bool(true));
                    Ok(())
                })
            }),
        );

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();
        assert_eq!(report.storage.get_socket(&NodeId::new("tc"), "Error"), Some(Value::String("boom".to_string())));
        assert_eq!(report.storage.get_variable("ran_catch_sink"), Some(Value::Bool(true)));
        assert_eq!(report.storage.get_variable("ran_finally_sink"), Some(Value::Bool(true)));
    }
}
