//! Custom-event fan-out: a "Trigger Event" operator that fires a named
//! event on the run's [`flowgraph_core::event_bus::EventBus`], and the
//! "Custom Event Listener" descriptor the runtime auto-subscribes at run
//! start (see `flowgraph_core::runtime::subscribe_event_listeners`). The
//! listener is never invoked through the plan — it has no execution
//! input, so it never appears in a layer — its `Exit`-path successors run
//! only when its subscribed event name is triggered.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use flowgraph_core::binding::{DeclaredOperator, NodeBuilder};
use flowgraph_core::context::ExecutionContext;
use flowgraph_core::descriptor::SocketDescriptor;
use flowgraph_core::error::Result;
use flowgraph_core::runtime::{CUSTOM_EVENT_LISTENER_DEFINITION_ID, EVENT_NAME_SOCKET};
use flowgraph_core::OperatorRegistry;

use crate::ids;

pub fn register(registry: &mut OperatorRegistry) {
    registry.register_declared(ids::TRIGGER_EVENT, "Trigger Event", std::sync::Arc::new(TriggerEvent));
    registry.register_declared(
        CUSTOM_EVENT_LISTENER_DEFINITION_ID,
        "Custom Event Listener",
        std::sync::Arc::new(CustomEventListener),
    );
}

/// `Enter`:exec, `EventName`:string in; `Exit`:exec out. Fans every handler
/// subscribed to `EventName` out concurrently and returns only once all of
/// them complete or the run's cancellation fires — the event bus's own
/// `trigger` contract, surfaced as an ordinary callable operator.
pub struct TriggerEvent;

#[async_trait]
impl DeclaredOperator for TriggerEvent {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::TRIGGER_EVENT, "Trigger Event")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("EventName", "string"))
            .output(SocketDescriptor::output_exec("Exit"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, cancel: &CancellationToken) -> Result<()> {
        let event_name = ctx.get_input_string("EventName")?;
        ctx.runtime_storage().event_bus().trigger(&event_name, cancel).await?;
        ctx.trigger("Exit").await
    }
}

/// No execution input, so the planner never schedules it: a node with this
/// definition id only runs through the event-bus subscription the runtime
/// installs for it at run start, not through the hierarchical plan. `execute`
/// exists only so the type satisfies `DeclaredOperator`; the runtime never
/// calls it, since nothing ever feeds this node's (nonexistent) execution
/// input.
pub struct CustomEventListener;

#[async_trait]
impl DeclaredOperator for CustomEventListener {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(CUSTOM_EVENT_LISTENER_DEFINITION_ID, "Custom Event Listener")
            .input(SocketDescriptor::input_data(EVENT_NAME_SOCKET, "string"))
            .output(SocketDescriptor::output_exec("Exit"));
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgraph_core::binding::InlineOperator;
    use flowgraph_core::descriptor::{Connection, NodeDescriptor, NodeId, ENTER, EXIT};
    use flowgraph_core::value::Value;
    use flowgraph_core::{Runtime, RuntimeOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};
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

    fn listener(id: &str, event_name: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: CUSTOM_EVENT_LISTENER_DEFINITION_ID.into(),
            name: "Custom Event Listener".into(),
            inputs: vec![SocketDescriptor::input_data(EVENT_NAME_SOCKET, "string")
                .with_default(Value::String(event_name.into()))],
            outputs: vec![SocketDescriptor::output_exec(EXIT)],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    fn trigger_node(id: &str, event_name: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: ids::TRIGGER_EVENT.into(),
            name: "Trigger Event".into(),
            inputs: vec![
                SocketDescriptor::input_exec(ENTER),
                SocketDescriptor::input_data("EventName", "string").with_default(Value::String(event_name.into())),
            ],
            outputs: vec![SocketDescriptor::output_exec(EXIT)],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    fn counting_sink(id: &str, counter: Arc<AtomicUsize>) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: format!("sink.{id}"),
            name: "Sink".into(),
            inputs: vec![SocketDescriptor::input_exec(ENTER)],
            outputs: vec![SocketDescriptor::output_exec(EXIT)],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    /// Scenario D: two listener chains subscribed to the same event both
    /// run, and the triggering node's own `Exit` only fires once both have
    /// completed.
    #[tokio::test]
    async fn trigger_event_fans_out_to_every_listener_and_awaits_completion() {
        let mut registry = OperatorRegistry::new();
        register(&mut registry);
        registry.register_inline("start", "Start", InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));

        let counter_a = Arc::new(AtomicUsize::new(0));
        let counter_b = Arc::new(AtomicUsize::new(0));
        registry.register_inline(
            "sink.sink_a",
            "Sink",
            InlineOperator::new({
                let counter_a = counter_a.clone();
                move |_ctx, _c| {
                    let counter_a = counter_a.clone();
                    Box::pin(async move {
                        counter_a.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }
            }),
        );
        registry.register_inline(
            "sink.sink_b",
            "Sink",
            InlineOperator::new({
                let counter_b = counter_b.clone();
                move |_ctx, _c| {
                    let counter_b = counter_b.clone();
                    Box::pin(async move {
                        counter_b.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }
            }),
        );

        let start = initiator("start");
        let fire = trigger_node("fire", "ping");
        let listener_a = listener("listener_a", "ping");
        let listener_b = listener("listener_b", "ping");
        let sink_a = counting_sink("sink_a", counter_a.clone());
        let sink_b = counting_sink("sink_b", counter_b.clone());

        let nodes = vec![start, fire, listener_a, listener_b, sink_a, sink_b];
        let connections = vec![
            Connection::new("start", EXIT, "fire", ENTER, true),
            Connection::new("listener_a", EXIT, "sink_a", ENTER, true),
            Connection::new("listener_b", EXIT, "sink_b", ENTER, true),
        ];

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();

        assert_eq!(counter_a.load(Ordering::SeqCst), 1);
        assert_eq!(counter_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn trigger_event_with_no_listeners_is_a_no_op() {
        let mut registry = OperatorRegistry::new();
        register(&mut registry);
        registry.register_inline("start", "Start", InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));

        let start = initiator("start");
        let fire = trigger_node("fire", "nobody-listening");
        let nodes = vec![start, fire];
        let connections = vec![Connection::new("start", EXIT, "fire", ENTER, true)];

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();
        assert!(report.storage.is_executed(&NodeId::new("fire")));
    }
}
