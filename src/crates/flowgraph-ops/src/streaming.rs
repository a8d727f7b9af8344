//! Streaming emission: a callable operator that emits a sequence of values
//! on a designated stream output, either driving each downstream chain to
//! completion before emitting the next (`Sequential`) or firing every
//! downstream chain off concurrently without waiting (`FireAndForget`),
//! then triggers `Completed`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use flowgraph_core::binding::{DeclaredOperator, NodeBuilder};
use flowgraph_core::context::ExecutionContext;
use flowgraph_core::descriptor::SocketDescriptor;
use flowgraph_core::error::{FlowError, Result};
use flowgraph_core::storage::ExecutionStorage;
use flowgraph_core::value::Value;
use flowgraph_core::OperatorRegistry;

use crate::ids;

pub fn register(registry: &mut OperatorRegistry) {
    registry.register_declared(ids::LIST_STREAM, "List Stream", Arc::new(ListStream));
}

/// `Items`:list, `Mode`:string (`"Sequential"` default, or `"FireAndForget"`)
/// in; `Item`:exec out per element (with companion `Value`:any and
/// `Index`:int data outputs populated immediately before the trigger),
/// `Completed`:exec out once every element has been emitted.
///
/// In `Sequential` mode each `Item` trigger is awaited to completion before
/// the next emission: items are delivered in FIFO order, a downstream
/// failure stops further emission and propagates out of this node, and
/// `Completed` only fires once the last item's downstream chain has itself
/// finished. In `FireAndForget` mode each emission runs in its own isolated
/// storage scope (mirroring Parallel For Each's per-iteration overlay,
/// since nothing else bounds concurrent writes to `Value`/`Index`) and
/// `Completed` fires as soon as every emission has been scheduled, without
/// waiting for any of them to finish.
pub struct ListStream;

#[async_trait]
impl DeclaredOperator for ListStream {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::LIST_STREAM, "List Stream")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Items", "list"))
            .input(
                SocketDescriptor::input_data("Mode", "string")
                    .with_default(Value::String("Sequential".to_string())),
            )
            .output(SocketDescriptor::output_exec("Item"))
            .output(SocketDescriptor::output_data("Value", "any"))
            .output(SocketDescriptor::output_data("Index", "int"))
            .output(SocketDescriptor::output_exec("Completed"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, cancel: &CancellationToken) -> Result<()> {
        let list = ctx.get_input_raw("Items")?;
        let items: Vec<Value> = list.as_list().map(|s| s.to_vec()).unwrap_or_default();
        let mode = ctx.get_input_string("Mode").unwrap_or_else(|_| "Sequential".to_string());

        if mode.eq_ignore_ascii_case("FireAndForget") {
            for (index, item) in items.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(FlowError::Canceled);
                }
                let child = ExecutionStorage::scoped_child(ctx.runtime_storage());
                child.set_socket(&ctx.node().id, "Value", item);
                child.set_socket(&ctx.node().id, "Index", Value::Int(index as i64));
                // Spawn and drop the handle: emission must return
                // immediately in this mode, so a slow consumer never
                // delays `Completed`.
                let _ = ctx.spawn_scoped_trigger("Item", child, None)?;
            }
        } else {
            for (index, item) in items.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    return Err(FlowError::Canceled);
                }
                ctx.set_output("Value", item.clone());
                ctx.set_output("Index", Value::Int(index as i64));
                ctx.emit("Item", item).await?;
            }
        }

        ctx.trigger("Completed").await
    }
}
