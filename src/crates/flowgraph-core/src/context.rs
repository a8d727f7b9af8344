//! The operator-facing facade handed to every node invocation: resolved
//! input access, output writing, triggering downstream execution, emitting
//! stream values, variable access, feedback, and the run's cancellation
//! handle.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::descriptor::{NodeDescriptor, NodeId};
use crate::error::{FlowError, Result};
use crate::storage::ExecutionStorage;
use crate::value::Value;

/// Severity of a diagnostic emitted via [`ExecutionContext::emit_feedback`].
/// Does not affect flow unless an operator chooses to treat `Break` as a
/// reason to fail itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackKind {
    Debug,
    Warn,
    Error,
    Break,
}

/// The runtime-side hooks an [`ExecutionContext`] calls back into. The
/// runtime implements this once and hands a shared handle to every context
/// it constructs, so operators never depend on the runtime's concrete type.
#[async_trait]
pub trait RuntimeCallbacks: Send + Sync {
    async fn trigger(
        &self,
        node: &NodeId,
        socket: &str,
        storage: &Arc<ExecutionStorage>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn emit(
        &self,
        node: &NodeId,
        socket: &str,
        value: Value,
        storage: &Arc<ExecutionStorage>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Force a data input to be resolved again, discarding any cached value
    /// and re-running its upstream pure-data producer if it has one. Used by
    /// condition-reread loop headers (While/Do While/Repeat Until), whose
    /// condition input must reflect side effects from the prior iteration's
    /// body rather than the value resolved before the header's first call.
    async fn reread_input(
        &self,
        node: &NodeId,
        socket: &str,
        storage: &Arc<ExecutionStorage>,
        cancel: &CancellationToken,
    ) -> Result<Value>;

    fn feedback(&self, message: &str, kind: FeedbackKind, node: &NodeDescriptor, payload: Option<Value>);

    /// The run's configured soft cap on loop iterations (default 10,000).
    /// Loop-header operators read this to decide when to stop and emit a
    /// `LoopCapExceeded` warning instead of iterating forever.
    fn loop_iteration_cap(&self) -> usize;
}

pub struct ExecutionContext<'a> {
    node: &'a NodeDescriptor,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
    runtime: Option<Arc<dyn RuntimeCallbacks>>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(node: &'a NodeDescriptor, storage: &Arc<ExecutionStorage>, cancel: CancellationToken) -> Self {
        Self { node, storage: storage.clone(), cancel, runtime: None }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeCallbacks>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn node(&self) -> &NodeDescriptor {
        self.node
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn runtime_storage(&self) -> &Arc<ExecutionStorage> {
        &self.storage
    }

    /// The resolved value for a declared input. By the time an operator
    /// runs, the runtime's lazy input resolution has already populated this
    /// socket in storage; a missing value means the operator declared the
    /// input required but neither a connection nor a default supplied one.
    pub fn get_input_raw(&self, name: &str) -> Result<Value> {
        self.storage.get_socket(&self.node.id, name).ok_or_else(|| FlowError::MissingDependency {
            node: self.node.id.clone(),
            socket: name.to_string(),
        })
    }

    pub fn get_input_int(&self, name: &str) -> Result<i64> {
        self.get_input_raw(name)?.as_int().ok_or_else(|| FlowError::TypeMismatch {
            node: self.node.id.clone(),
            socket: name.to_string(),
            expected: "int".to_string(),
            got: "other".to_string(),
        })
    }

    pub fn get_input_float(&self, name: &str) -> Result<f64> {
        self.get_input_raw(name)?.as_float().ok_or_else(|| FlowError::TypeMismatch {
            node: self.node.id.clone(),
            socket: name.to_string(),
            expected: "float".to_string(),
            got: "other".to_string(),
        })
    }

    pub fn get_input_bool(&self, name: &str) -> Result<bool> {
        self.get_input_raw(name)?.as_bool().ok_or_else(|| FlowError::TypeMismatch {
            node: self.node.id.clone(),
            socket: name.to_string(),
            expected: "bool".to_string(),
            got: "other".to_string(),
        })
    }

    pub fn get_input_string(&self, name: &str) -> Result<String> {
        let value = self.get_input_raw(name)?;
        Ok(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string()))
    }

    pub fn set_output(&self, name: &str, value: Value) {
        self.storage.set_socket(&self.node.id, name, value);
    }

    pub fn get_variable(&self, name: &str) -> Option<Value> {
        self.storage.get_variable(name)
    }

    pub fn set_variable(&self, name: &str, value: Value) {
        self.storage.set_variable(name, value);
    }

    /// Fire an execution signal on `socket_name`; runs every downstream
    /// chain, awaiting full completion before returning.
    pub async fn trigger(&self, socket_name: &str) -> Result<()> {
        let runtime = self.runtime_handle()?;
        runtime.trigger(&self.node.id, socket_name, &self.storage, &self.cancel).await
    }

    /// Fire an execution signal under a layered overlay scope, used by
    /// parallel-foreach to isolate each iteration's writes.
    pub async fn trigger_scoped(&self, socket_name: &str, child_storage: &Arc<ExecutionStorage>) -> Result<()> {
        let runtime = self.runtime_handle()?;
        runtime.trigger(&self.node.id, socket_name, child_storage, &self.cancel).await
    }

    /// Spawn a scoped trigger as its own task, running concurrently with the
    /// caller instead of being awaited inline. `permit`, if given, is held
    /// for the task's lifetime and dropped when it completes — the caller
    /// acquires it from a bounding `Semaphore` before spawning, so the
    /// semaphore's permit count, not the caller's await order, limits how
    /// many iterations run at once. Used by parallel-foreach.
    pub fn spawn_scoped_trigger(
        &self,
        socket_name: &str,
        child_storage: Arc<ExecutionStorage>,
        permit: Option<tokio::sync::OwnedSemaphorePermit>,
    ) -> Result<tokio::task::JoinHandle<Result<()>>> {
        let runtime = self.runtime_handle()?;
        let node_id = self.node.id.clone();
        let socket_name = socket_name.to_string();
        let cancel = self.cancel.clone();
        Ok(tokio::spawn(async move {
            let _permit = permit;
            runtime.trigger(&node_id, &socket_name, &child_storage, &cancel).await
        }))
    }

    /// Emit a value on a streaming output socket.
    pub async fn emit(&self, stream_socket: &str, value: Value) -> Result<()> {
        let runtime = self.runtime_handle()?;
        runtime.emit(&self.node.id, stream_socket, value, &self.storage, &self.cancel).await
    }

    /// Discard the cached value for a data input and resolve it again,
    /// re-running its upstream producer if it has one. While/Do While/
    /// Repeat Until headers call this each iteration so a condition socket
    /// fed by a pure-data node reflects the body's latest side effects
    /// instead of the value resolved before the header's first call.
    pub async fn reread_input(&self, name: &str) -> Result<Value> {
        let runtime = self.runtime_handle()?;
        runtime.reread_input(&self.node.id, name, &self.storage, &self.cancel).await
    }

    pub async fn reread_input_bool(&self, name: &str) -> Result<bool> {
        let value = self.reread_input(name).await?;
        value.as_bool().ok_or_else(|| FlowError::TypeMismatch {
            node: self.node.id.clone(),
            socket: name.to_string(),
            expected: "bool".to_string(),
            got: "other".to_string(),
        })
    }

    pub fn emit_feedback(&self, message: impl Into<String>, kind: FeedbackKind) {
        self.emit_feedback_with_payload(message, kind, None)
    }

    pub fn emit_feedback_with_payload(&self, message: impl Into<String>, kind: FeedbackKind, payload: Option<Value>) {
        if let Some(runtime) = &self.runtime {
            runtime.feedback(&message.into(), kind, self.node, payload);
        }
    }

    fn runtime_handle(&self) -> Result<Arc<dyn RuntimeCallbacks>> {
        self.runtime.clone().ok_or_else(|| FlowError::MissingDependency {
            node: self.node.id.clone(),
            socket: "<runtime>".to_string(),
        })
    }

    /// The run's configured loop iteration cap, defaulting to 10,000 when no
    /// runtime handle is attached (e.g. a bare unit test of an operator).
    pub fn loop_iteration_cap(&self) -> usize {
        self.runtime.as_ref().map(|r| r.loop_iteration_cap()).unwrap_or(10_000)
    }

    /// Read a node-private bookkeeping value keyed by an arbitrary name, not
    /// necessarily a declared socket. Stateful operators (`Once`) use this to
    /// carry state across invocations within one run without the planner or
    /// host ever seeing the key.
    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.storage.get_socket(&self.node.id, key)
    }

    pub fn set_state(&self, key: &str, value: Value) {
        self.storage.set_socket(&self.node.id, key, value);
    }
}
