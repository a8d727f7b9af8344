//! Loop-header operators. Each owns its own iteration: the planner only
//! needs to know which node is a loop header (via
//! [`flowgraph_core::descriptor::NodeDescriptor::is_loop_header`]) and which
//! body nodes hang off its `LoopPath` output — the header's `execute` body
//! is what actually drives repeated triggers of that socket.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use flowgraph_core::binding::{DeclaredOperator, NodeBuilder};
use flowgraph_core::context::{ExecutionContext, FeedbackKind};
use flowgraph_core::descriptor::{SocketDescriptor, LOOP_PATH};
use flowgraph_core::error::{FlowError, Result};
use flowgraph_core::storage::ExecutionStorage;
use flowgraph_core::value::Value;
use flowgraph_core::OperatorRegistry;

use crate::ids;

pub fn register(registry: &mut OperatorRegistry) {
    registry.register_declared(ids::FOR_LOOP, "For Loop", Arc::new(ForLoop));
    registry.register_declared(ids::WHILE_LOOP, "While Loop", Arc::new(WhileLoop));
    registry.register_declared(ids::DO_WHILE_LOOP, "Do While Loop", Arc::new(DoWhileLoop));
    registry.register_declared(ids::REPEAT_UNTIL, "Repeat Until", Arc::new(RepeatUntil));
    registry.register_declared(ids::FOR_EACH, "For Each", Arc::new(ForEach));
    registry.register_declared(ids::PARALLEL_FOR_EACH, "Parallel For Each", Arc::new(ParallelForEach));
}

fn cap_exceeded_feedback(ctx: &ExecutionContext<'_>, header_name: &str, cap: usize) {
    ctx.emit_feedback(format!("{header_name} exceeded its iteration cap of {cap}"), FeedbackKind::Warn);
}

/// `LoopTimes`:int in; `LoopPath`:exec out per iteration with `Index`:int,
/// `Exit`:exec out once iteration ends.
pub struct ForLoop;

#[async_trait]
impl DeclaredOperator for ForLoop {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::FOR_LOOP, "For Loop")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("LoopTimes", "int"))
            .output(SocketDescriptor::output_exec(LOOP_PATH))
            .output(SocketDescriptor::output_data("Index", "int"))
            .output(SocketDescriptor::output_exec("Exit"))
            .loop_header();
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let times = ctx.get_input_int("LoopTimes")?.max(0) as usize;
        let cap = ctx.loop_iteration_cap();

        for i in 0..times {
            if ctx.cancel().is_cancelled() {
                return Err(FlowError::Canceled);
            }
            if i >= cap {
                cap_exceeded_feedback(ctx, "For Loop", cap);
                break;
            }
            ctx.set_output("Index", Value::Int(i as i64));
            ctx.trigger(LOOP_PATH).await?;
        }
        ctx.trigger("Exit").await
    }
}

/// `Cond`:bool in, re-read after every iteration; loops while true.
pub struct WhileLoop;

#[async_trait]
impl DeclaredOperator for WhileLoop {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::WHILE_LOOP, "While Loop")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Cond", "bool"))
            .output(SocketDescriptor::output_exec(LOOP_PATH))
            .output(SocketDescriptor::output_exec("Exit"))
            .loop_header();
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let cap = ctx.loop_iteration_cap();
        let mut cond = ctx.get_input_bool("Cond")?;
        let mut iterations = 0usize;

        while cond {
            if ctx.cancel().is_cancelled() {
                return Err(FlowError::Canceled);
            }
            if iterations >= cap {
                cap_exceeded_feedback(ctx, "While Loop", cap);
                break;
            }
            ctx.trigger(LOOP_PATH).await?;
            iterations += 1;
            cond = ctx.reread_input_bool("Cond").await?;
        }
        ctx.trigger("Exit").await
    }
}

/// `Cond`:bool in; body always runs once before the first check, then loops
/// while `Cond` stays true.
pub struct DoWhileLoop;

#[async_trait]
impl DeclaredOperator for DoWhileLoop {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::DO_WHILE_LOOP, "Do While Loop")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Cond", "bool"))
            .output(SocketDescriptor::output_exec(LOOP_PATH))
            .output(SocketDescriptor::output_exec("Exit"))
            .loop_header();
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let cap = ctx.loop_iteration_cap();
        let mut iterations = 0usize;

        loop {
            if ctx.cancel().is_cancelled() {
                return Err(FlowError::Canceled);
            }
            ctx.trigger(LOOP_PATH).await?;
            iterations += 1;
            let cond = ctx.reread_input_bool("Cond").await?;
            if !cond {
                break;
            }
            if iterations >= cap {
                cap_exceeded_feedback(ctx, "Do While Loop", cap);
                break;
            }
        }
        ctx.trigger("Exit").await
    }
}

/// `Cond`:bool in; body runs at least once, repeating until `Cond` becomes
/// true (the inverse continuation test of [`DoWhileLoop`]).
pub struct RepeatUntil;

#[async_trait]
impl DeclaredOperator for RepeatUntil {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::REPEAT_UNTIL, "Repeat Until")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Cond", "bool"))
            .output(SocketDescriptor::output_exec(LOOP_PATH))
            .output(SocketDescriptor::output_exec("Exit"))
            .loop_header();
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let cap = ctx.loop_iteration_cap();
        let mut iterations = 0usize;

        loop {
            if ctx.cancel().is_cancelled() {
                return Err(FlowError::Canceled);
            }
            ctx.trigger(LOOP_PATH).await?;
            iterations += 1;
            let done = ctx.reread_input_bool("Cond").await?;
            if done {
                break;
            }
            if iterations >= cap {
                cap_exceeded_feedback(ctx, "Repeat Until", cap);
                break;
            }
        }
        ctx.trigger("Exit").await
    }
}

/// `List`:list in; `LoopPath`:exec out per element with `Obj`:any,
/// `Index`:int, `Exit`:exec out once the list is exhausted. The list is
/// snapshotted at entry; mutations from inside the body do not affect the
/// remaining iterations.
pub struct ForEach;

#[async_trait]
impl DeclaredOperator for ForEach {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::FOR_EACH, "For Each")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("List", "list"))
            .output(SocketDescriptor::output_exec(LOOP_PATH))
            .output(SocketDescriptor::output_data("Obj", "any"))
            .output(SocketDescriptor::output_data("Index", "int"))
            .output(SocketDescriptor::output_exec("Exit"))
            .loop_header();
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let list = ctx.get_input_raw("List")?;
        let items: Vec<Value> = list.as_list().map(|s| s.to_vec()).unwrap_or_default();
        let cap = ctx.loop_iteration_cap();

        for (index, item) in items.into_iter().enumerate() {
            if ctx.cancel().is_cancelled() {
                return Err(FlowError::Canceled);
            }
            if index >= cap {
                cap_exceeded_feedback(ctx, "For Each", cap);
                break;
            }
            ctx.set_output("Obj", item);
            ctx.set_output("Index", Value::Int(index as i64));
            ctx.trigger(LOOP_PATH).await?;
        }
        ctx.trigger("Exit").await
    }
}

/// `List`:list, `MaxParallelism`:int in; runs each element's `LoopPath` body
/// concurrently in its own layered overlay scope ([`ExecutionStorage::scoped_child`]),
/// bounded to at most `MaxParallelism` bodies in flight, then fires `Exit`
/// once every iteration completes. A body failure is recorded but does not
/// cancel sibling iterations already in flight; the first one is
/// propagated once all have finished.
pub struct ParallelForEach;

#[async_trait]
impl DeclaredOperator for ParallelForEach {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::PARALLEL_FOR_EACH, "Parallel For Each")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("List", "list"))
            .input(SocketDescriptor::input_data("MaxParallelism", "int").with_default(Value::Int(0)))
            .output(SocketDescriptor::output_exec(LOOP_PATH))
            .output(SocketDescriptor::output_data("Item", "any"))
            .output(SocketDescriptor::output_data("Index", "int"))
            .output(SocketDescriptor::output_exec("Exit"))
            .loop_header();
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let list = ctx.get_input_raw("List")?;
        let items: Vec<Value> = list.as_list().map(|s| s.to_vec()).unwrap_or_default();
        if items.is_empty() {
            return ctx.trigger("Exit").await;
        }

        let requested = ctx.get_input_int("MaxParallelism").unwrap_or(0);
        let max_parallelism = if requested > 0 { requested as usize } else { items.len() };
        let semaphore = Arc::new(Semaphore::new(max_parallelism));

        let mut handles = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            if ctx.cancel().is_cancelled() {
                return Err(FlowError::Canceled);
            }
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| FlowError::Canceled)?;

            let child = ExecutionStorage::scoped_child(ctx.runtime_storage());
            child.set_socket(&ctx.node().id, "Item", item);
            child.set_socket(&ctx.node().id, "Index", Value::Int(index as i64));

            handles.push(ctx.spawn_scoped_trigger(LOOP_PATH, child, Some(permit))?);
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(FlowError::operator_failure(ctx.node().id.clone(), join_err));
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        ctx.trigger("Exit").await
    }
}
