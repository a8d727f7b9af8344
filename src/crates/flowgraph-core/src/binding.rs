//! Node method binding: resolving a node descriptor to an invocable
//! operator, by definition id (preferred) or by human name (fallback).
//!
//! Two discovery routes are supported, matching the component design:
//! **declared operators** (a type implementing [`DeclaredOperator`],
//! registered once) and **inline operators** (a descriptor template plus a
//! bare closure, used for large families of trivial pure-data operators).
//! A third, legacy route adapts attribute-style reflective dispatch into
//! the same trait by precomputing the parameter/socket binding once at
//! registration instead of introspecting on every call.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::{FlowError, Result};
use crate::value::Value;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An operator implementation: either declared as a type or adapted from a
/// closure or legacy reflective binding. `configure` lets a declared
/// operator describe itself once at registration time; most inline and
/// legacy bindings leave it as a no-op since their descriptor template is
/// supplied directly.
#[async_trait]
pub trait DeclaredOperator: Send + Sync {
    fn configure(&self, _builder: &mut NodeBuilder) {}

    /// Called once per node id when the runtime constructs its per-run
    /// instance table, before any invocation.
    async fn on_created(&self, _ctx: &ExecutionContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>, cancel: &CancellationToken) -> Result<()>;

    /// Called exactly once per node id at the end of the run, even on
    /// failure or cancellation.
    async fn on_disposed(&self, _ctx: &ExecutionContext<'_>) {}
}

/// Accumulates a definition-level socket schema. Declared operators use it
/// from `configure` to publish the template a host's node registry copies
/// into each graph instance's [`crate::descriptor::NodeDescriptor`].
#[derive(Debug, Default, Clone)]
pub struct NodeBuilder {
    pub definition_id: String,
    pub name: String,
    pub inputs: Vec<crate::descriptor::SocketDescriptor>,
    pub outputs: Vec<crate::descriptor::SocketDescriptor>,
    pub is_execution_initiator: bool,
    pub is_loop_header: bool,
}

impl NodeBuilder {
    pub fn new(definition_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { definition_id: definition_id.into(), name: name.into(), ..Default::default() }
    }

    pub fn input(mut self, socket: crate::descriptor::SocketDescriptor) -> Self {
        self.inputs.push(socket);
        self
    }

    pub fn output(mut self, socket: crate::descriptor::SocketDescriptor) -> Self {
        self.outputs.push(socket);
        self
    }

    pub fn execution_initiator(mut self) -> Self {
        self.is_execution_initiator = true;
        self
    }

    pub fn loop_header(mut self) -> Self {
        self.is_loop_header = true;
        self
    }
}

/// An inline operator: a descriptor-template-free binding used for large
/// families of trivial pure-data operators, where declaring a whole type
/// per operator (one `Add`, one `Sub`, ...) would be pure ceremony.
pub struct InlineOperator {
    closure: Arc<
        dyn for<'a> Fn(&'a mut ExecutionContext<'_>, &'a CancellationToken) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync,
    >,
}

impl InlineOperator {
    pub fn new<F>(closure: F) -> Self
    where
        F: for<'a> Fn(&'a mut ExecutionContext<'_>, &'a CancellationToken) -> BoxFuture<'a, Result<()>>
            + Send
            + Sync
            + 'static,
    {
        Self { closure: Arc::new(closure) }
    }
}

#[async_trait]
impl DeclaredOperator for InlineOperator {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>, cancel: &CancellationToken) -> Result<()> {
        (self.closure)(ctx, cancel).await
    }
}

/// Describes one parameter of a legacy, attribute-annotated method: which
/// socket it binds to, and whether it is an `out` parameter (written back
/// to an output socket after the call) or a plain input.
#[derive(Debug, Clone)]
pub struct LegacyParameter {
    pub socket_name: String,
    pub direction: LegacyDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyDirection {
    In,
    Out,
}

/// Adapts a reflective, attribute-annotated method into the same
/// `DeclaredOperator` interface. Real runtime introspection is replaced by
/// a parameter table computed once at registration (per design note:
/// "precomputes the binding at registration time, not at each call");
/// the method body itself is a plain synchronous Rust closure operating on
/// positional [`Value`]s.
pub struct LegacyReflectiveOperator {
    parameters: Vec<LegacyParameter>,
    method: Arc<dyn Fn(Vec<Value>) -> Result<Vec<Value>> + Send + Sync>,
}

impl LegacyReflectiveOperator {
    pub fn new(
        parameters: Vec<LegacyParameter>,
        method: impl Fn(Vec<Value>) -> Result<Vec<Value>> + Send + Sync + 'static,
    ) -> Self {
        Self { parameters, method: Arc::new(method) }
    }
}

#[async_trait]
impl DeclaredOperator for LegacyReflectiveOperator {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>, _cancel: &CancellationToken) -> Result<()> {
        let mut args = Vec::with_capacity(self.parameters.len());
        for param in &self.parameters {
            let value = match param.direction {
                LegacyDirection::In => ctx.get_input_raw(&param.socket_name)?,
                // Zero-initialized storage for `out` parameters.
                LegacyDirection::Out => Value::Null,
            };
            args.push(value);
        }

        let outs = (self.method)(args)?;

        for (param, value) in self.parameters.iter().zip(outs.into_iter()) {
            if param.direction == LegacyDirection::Out {
                let value = if matches!(value, Value::Null) && param.socket_name.eq_ignore_ascii_case("exec") {
                    // An unset `out` of execution-signal type defaults to
                    // "signaled" rather than null.
                    Value::Bool(true)
                } else {
                    value
                };
                ctx.set_output(&param.socket_name, value);
            }
        }
        Ok(())
    }
}

/// The binder's lookup tables: definition-id is authoritative, human name
/// is a fallback for disambiguation when only a display name is known.
#[derive(Default)]
pub struct OperatorRegistry {
    by_definition_id: HashMap<String, Arc<dyn DeclaredOperator>>,
    name_to_definition_id: HashMap<String, String>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_declared(&mut self, definition_id: impl Into<String>, name: impl Into<String>, operator: Arc<dyn DeclaredOperator>) {
        let definition_id = definition_id.into();
        self.name_to_definition_id.insert(name.into().to_lowercase(), definition_id.clone());
        self.by_definition_id.insert(definition_id, operator);
    }

    pub fn register_inline(&mut self, definition_id: impl Into<String>, name: impl Into<String>, closure: InlineOperator) {
        self.register_declared(definition_id, name, Arc::new(closure));
    }

    pub fn resolve(&self, definition_id: &str, name: &str) -> Result<Arc<dyn DeclaredOperator>> {
        if let Some(op) = self.by_definition_id.get(definition_id) {
            return Ok(op.clone());
        }
        if let Some(resolved_id) = self.name_to_definition_id.get(&name.to_lowercase()) {
            if let Some(op) = self.by_definition_id.get(resolved_id) {
                return Ok(op.clone());
            }
        }
        Err(FlowError::MissingDependency {
            node: crate::descriptor::NodeId::new(definition_id),
            socket: "<binding>".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::NodeId;
    use crate::event_bus::EventBus;
    use crate::storage::ExecutionStorage;

    fn descriptor() -> crate::descriptor::NodeDescriptor {
        crate::descriptor::NodeDescriptor {
            id: NodeId::new("n1"),
            definition_id: "math.add".into(),
            name: "Add".into(),
            inputs: vec![
                crate::descriptor::SocketDescriptor::input_data("A", "int"),
                crate::descriptor::SocketDescriptor::input_data("B", "int"),
            ],
            outputs: vec![crate::descriptor::SocketDescriptor::output_data("Result", "int")],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    #[tokio::test]
    async fn inline_operator_resolves_by_definition_id_and_runs() {
        let mut registry = OperatorRegistry::new();
        registry.register_inline(
            "math.add",
            "Add",
            InlineOperator::new(|ctx, _cancel| {
                Box::pin(async move {
                    let a = ctx.get_input_raw("A")?.as_int().unwrap_or(0);
                    let b = ctx.get_input_raw("B")?.as_int().unwrap_or(0);
                    ctx.set_output("Result", Value::Int(a + b));
                    Ok(())
                })
            }),
        );

        let op = registry.resolve("math.add", "Add").unwrap();
        let desc = descriptor();
        let storage = ExecutionStorage::new(EventBus::new());
        storage.set_socket(&desc.id, "A", Value::Int(2));
        storage.set_socket(&desc.id, "B", Value::Int(3));
        let mut ctx = ExecutionContext::new(&desc, &storage, CancellationToken::new());
        let cancel = CancellationToken::new();
        op.execute(&mut ctx, &cancel).await.unwrap();
        assert_eq!(storage.get_socket(&desc.id, "Result"), Some(Value::Int(5)));
    }

    #[test]
    fn resolution_falls_back_to_name_when_definition_id_unknown() {
        let mut registry = OperatorRegistry::new();
        registry.register_inline(
            "math.add",
            "Add",
            InlineOperator::new(|_ctx, _cancel| Box::pin(async { Ok(()) })),
        );
        assert!(registry.resolve("unknown.id", "Add").is_ok());
    }

    #[test]
    fn resolution_fails_when_neither_id_nor_name_match() {
        let registry = OperatorRegistry::new();
        assert!(registry.resolve("nope", "nope").is_err());
    }
}
