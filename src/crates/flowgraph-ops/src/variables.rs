//! Run-scoped variable access: reading and writing the same case-insensitive
//! key/value store every node in a run shares via
//! [`flowgraph_core::storage::ExecutionStorage`].

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use flowgraph_core::binding::{DeclaredOperator, NodeBuilder};
use flowgraph_core::context::ExecutionContext;
use flowgraph_core::descriptor::SocketDescriptor;
use flowgraph_core::error::Result;
use flowgraph_core::value::Value;
use flowgraph_core::OperatorRegistry;

use crate::ids;

pub fn register(registry: &mut OperatorRegistry) {
    registry.register_declared(ids::SET_VARIABLE, "Set Variable", std::sync::Arc::new(SetVariable));
    registry.register_declared(ids::GET_VARIABLE, "Get Variable", std::sync::Arc::new(GetVariable));
}

/// `Enter`:exec, `Name`:string, `Value`:any in; `Exit`:exec, `Value`:any out.
/// Writes `Value` under `Name` and passes it through on its own output, so a
/// chain can both set and keep using the value without a second read.
pub struct SetVariable;

#[async_trait]
impl DeclaredOperator for SetVariable {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::SET_VARIABLE, "Set Variable")
            .input(SocketDescriptor::input_exec("Enter"))
            .input(SocketDescriptor::input_data("Name", "string"))
            .input(SocketDescriptor::input_data("Value", "any"))
            .output(SocketDescriptor::output_exec("Exit"))
            .output(SocketDescriptor::output_data("Value", "any"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let name = ctx.get_input_string("Name")?;
        let value = ctx.get_input_raw("Value")?;
        ctx.set_variable(&name, value.clone());
        ctx.set_output("Value", value);
        ctx.trigger("Exit").await
    }
}

/// `Name`:string in; `Value`:any out. Pure data — no execution sockets, so a
/// read can be wired anywhere a value is needed without ordering it into a
/// chain. Missing variables resolve to `Value::Null` rather than an error.
pub struct GetVariable;

#[async_trait]
impl DeclaredOperator for GetVariable {
    fn configure(&self, builder: &mut NodeBuilder) {
        *builder = NodeBuilder::new(ids::GET_VARIABLE, "Get Variable")
            .input(SocketDescriptor::input_data("Name", "string"))
            .output(SocketDescriptor::output_data("Value", "any"));
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let name = ctx.get_input_string("Name")?;
        let value = ctx.get_variable(&name).unwrap_or(Value::Null);
        ctx.set_output("Value", value);
        Ok(())
    }
}
