//! Diagnostics and timing: printing a value as feedback, suspending a chain
//! for a fixed duration, and deliberately raising an operator failure (used
//! to exercise `Try/Catch`).

use std::fmt;

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
    registry.register_declared(ids::DEBUG_PRINT, "Debug Print", std::sync::Arc::new(DebugPrint));
    registry.register_declared(ids::DELAY, "Delay", std::sync::Arc::new(Delay));
    registry.register_declared(ThrowError::DEFINITION_ID, "Throw Error", std::sync::Arc::new(ThrowError));
}

/// `Enter`:exec, `Value`:any in; `Exit`:exec out. Surfaces `Value` as a
/// `Debug`-severity feedback event rather than writing to stdout directly,
/// so a host can route it to its own log or UI.
pub struct DebugPrint;

#[async_trait]
impl DeclaredOperator for DebugPrint {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::DEBUG_PRINT, "Debug Print")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Value", "any"))
            .output(SocketDescriptor::output_exec("Exit"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let value = ctx.get_input_raw("Value")?;
        ctx.emit_feedback_with_payload(value.to_string(), FeedbackKind::Debug, Some(value));
        ctx.trigger("Exit").await
    }
}

/// `Enter`:exec, `Millis`:int in; `Exit`:exec out. Suspends for `Millis`,
/// observing the run's cancellation handle the whole time rather than
/// sleeping to completion regardless — this is the engine's one
/// operator-level timeout example, and it must remain cancellable.
pub struct Delay;

#[async_trait]
impl DeclaredOperator for Delay {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::DELAY, "Delay")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Millis", "int").with_default(Value::Int(0)))
            .output(SocketDescriptor::output_exec("Exit"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, cancel: &CancellationToken) -> Result<()> {
        let millis = ctx.get_input_int("Millis")?.max(0) as u64;
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_millis(millis)) => {}
            _ = cancel.cancelled() => return Err(FlowError::Canceled),
        }
        ctx.trigger("Exit").await
    }
}

#[derive(Debug)]
struct ThrownMessage(String);

impl fmt::Display for ThrownMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ThrownMessage {}

/// `Enter`:exec, `Message`:string in; no `Exit`. Always fails with
/// `Message` as the error text — a deliberate operator failure for testing
/// `Try/Catch` and plain-layer failure propagation.
pub struct ThrowError;

impl ThrowError {
    pub const DEFINITION_ID: &'static str = "flow.throw_error";
}

#[async_trait]
impl DeclaredOperator for ThrowError {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(Self::DEFINITION_ID, "Throw Error")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Message", "string").with_default(Value::String("error".into())));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let message = ctx.get_input_string("Message")?;
        Err(FlowError::operator_failure(ctx.node().id.clone(), ThrownMessage(message)))
    }
}
