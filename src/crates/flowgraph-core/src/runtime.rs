//! The concurrent runtime: drives a [`HierarchicalPlan`] against execution
//! storage, resolving data inputs lazily, honoring the gate and
//! cancellation, and routing execution signals between nodes.
//!
//! A [`Runtime`] is the long-lived, reusable configuration (operator
//! registry, socket type resolver, parallelism options, the debug gate, and
//! the event broadcast channel). Each call to [`Runtime::run`] takes an
//! owned snapshot of `nodes` and `connections` and builds a fresh
//! [`RunContext`] for that run alone — per the rule that the only mutable
//! execution state lives per-run, never in a process-global table.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::context::{ExecutionContext, FeedbackKind, RuntimeCallbacks};
use crate::descriptor::{Connection, NodeDescriptor, NodeId};
use crate::error::{FlowError, Result};
use crate::event_bus::EventBus;
use crate::gate::Gate;
use crate::plan::{HierarchicalPlan, Step};
use crate::planner::Planner;
use crate::socket_type::{BuiltinSocketTypeResolver, SocketTypeResolver};
use crate::storage::ExecutionStorage;
use crate::value::Value;
use crate::binding::OperatorRegistry;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The definition id a host's node registry uses for "custom event
/// listener" nodes. The runtime auto-subscribes one handler per such node
/// at run start, per the event bus component design.
pub const CUSTOM_EVENT_LISTENER_DEFINITION_ID: &str = "flow.custom_event_listener";
/// The input socket on a custom event listener carrying the event name.
pub const EVENT_NAME_SOCKET: &str = "EventName";

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub max_parallelism: usize,
    pub allow_background: bool,
    pub loop_iteration_cap: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { max_parallelism: 1, allow_background: false, loop_iteration_cap: 10_000 }
    }
}

impl RuntimeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_parallelism(mut self, n: usize) -> Self {
        self.max_parallelism = n.max(1);
        self
    }

    pub fn with_background(mut self, allow: bool) -> Self {
        self.allow_background = allow;
        self
    }

    pub fn with_loop_iteration_cap(mut self, cap: usize) -> Self {
        self.loop_iteration_cap = cap;
        self
    }
}

/// Observer-facing events a host subscribes to via [`Runtime::subscribe_events`].
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    NodeStarted(NodeDescriptor),
    NodeCompleted(NodeDescriptor),
    NodeFailed { node: NodeDescriptor, message: String },
    LayerStarted(usize),
    LayerCompleted(usize),
    Feedback { message: String, kind: FeedbackKind, node: NodeDescriptor, payload: Option<Value> },
    ExecutionCanceled,
    ExecutionFailed(String),
    ExecutionCompleted,
}

/// What a successful (or canceled/failed, via `Err`) run leaves behind: the
/// storage queryable for socket values and variables.
pub struct RunReport {
    pub storage: Arc<ExecutionStorage>,
}

pub struct Runtime {
    registry: Arc<OperatorRegistry>,
    resolver: Arc<dyn SocketTypeResolver>,
    options: RuntimeOptions,
    gate: Arc<Gate>,
    event_tx: broadcast::Sender<RuntimeEvent>,
}

impl Runtime {
    pub fn new(registry: Arc<OperatorRegistry>, options: RuntimeOptions) -> Self {
        Self::with_resolver(registry, Arc::new(BuiltinSocketTypeResolver), options)
    }

    pub fn with_resolver(
        registry: Arc<OperatorRegistry>,
        resolver: Arc<dyn SocketTypeResolver>,
        options: RuntimeOptions,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1024);
        Self { registry, resolver, options, gate: Arc::new(Gate::new()), event_tx }
    }

    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.event_tx.subscribe()
    }

    /// Same subscription as a [`futures::Stream`], for hosts that want to
    /// `.next().await` or fan events into a UI update loop rather than poll a
    /// receiver directly. Lagged events are dropped silently, matching the
    /// underlying broadcast channel's overflow policy.
    pub fn subscribe_events_stream(&self) -> impl futures::Stream<Item = RuntimeEvent> {
        use tokio_stream::StreamExt;
        tokio_stream::wrappers::BroadcastStream::new(self.event_tx.subscribe()).filter_map(|r| r.ok())
    }

    /// Run the graph to completion. Takes ownership of `nodes` and
    /// `connections` so a caller's live graph-editor state cannot be
    /// observed mutating mid-run.
    pub async fn run(
        &self,
        nodes: Vec<NodeDescriptor>,
        connections: Vec<Connection>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        if self.options.allow_background {
            let registry = self.registry.clone();
            let resolver = self.resolver.clone();
            let options = self.options.clone();
            let gate = self.gate.clone();
            let event_tx = self.event_tx.clone();
            let handle = tokio::spawn(async move {
                run_inner(registry, resolver, options, gate, event_tx, nodes, connections, cancel).await
            });
            return handle.await.map_err(|join_err| {
                FlowError::operator_failure(NodeId::new("<runtime>"), join_err)
            })?;
        }

        run_inner(
            self.registry.clone(),
            self.resolver.clone(),
            self.options.clone(),
            self.gate.clone(),
            self.event_tx.clone(),
            nodes,
            connections,
            cancel,
        )
        .await
    }
}

async fn run_inner(
    registry: Arc<OperatorRegistry>,
    resolver: Arc<dyn SocketTypeResolver>,
    options: RuntimeOptions,
    gate: Arc<Gate>,
    event_tx: broadcast::Sender<RuntimeEvent>,
    nodes: Vec<NodeDescriptor>,
    connections: Vec<Connection>,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let run_id = uuid::Uuid::new_v4();
    let started_at = chrono::Utc::now();
    tracing::info!(%run_id, node_count = nodes.len(), "starting graph execution");

    let plan_output = Planner::plan(&nodes, &connections).map_err(|e| {
        tracing::error!(%run_id, error = %e, "planning failed");
        e
    })?;
    for warning in &plan_output.warnings {
        tracing::warn!(%warning, "planner warning");
    }

    let node_map: HashMap<NodeId, NodeDescriptor> =
        nodes.iter().map(|n| (n.id.clone(), n.clone())).collect();

    let mut loop_bodies = HashMap::new();
    collect_loop_bodies(&plan_output.plan, &mut loop_bodies);

    let ctx = Arc::new(RunContext {
        node_map,
        connections,
        loop_bodies,
        registry,
        resolver,
        options,
        gate,
        event_tx: event_tx.clone(),
    });

    let storage = ExecutionStorage::new(EventBus::new());
    subscribe_event_listeners(&ctx, &storage, &cancel);
    create_instances(&ctx, &storage, &cancel).await?;

    let result = run_plan(ctx.clone(), plan_output.plan, storage.clone(), cancel.clone()).await;

    dispose_instances(&ctx, &storage, &cancel).await;

    let elapsed_ms = (chrono::Utc::now() - started_at).num_milliseconds();
    match &result {
        Ok(()) => {
            tracing::info!(%run_id, elapsed_ms, "graph execution completed successfully");
            let _ = event_tx.send(RuntimeEvent::ExecutionCompleted);
        }
        Err(FlowError::Canceled) => {
            tracing::info!(%run_id, elapsed_ms, "graph execution canceled");
            let _ = event_tx.send(RuntimeEvent::ExecutionCanceled);
        }
        Err(e) => {
            tracing::error!(%run_id, elapsed_ms, error = %e, "graph execution failed");
            let _ = event_tx.send(RuntimeEvent::ExecutionFailed(e.to_string()));
        }
    }

    result.map(|()| RunReport { storage })
}

/// Per-run state: a node-id map and connection snapshot, plus clones of the
/// engine's shared configuration. Never reused across runs.
struct RunContext {
    node_map: HashMap<NodeId, NodeDescriptor>,
    connections: Vec<Connection>,
    /// Loop header id -> (loop socket name, body node ids), flattened out of
    /// the plan up front so triggering a header's loop socket can clear the
    /// body's executed marks without re-walking the plan on every iteration.
    loop_bodies: HashMap<NodeId, (String, Vec<NodeId>)>,
    registry: Arc<OperatorRegistry>,
    resolver: Arc<dyn SocketTypeResolver>,
    options: RuntimeOptions,
    gate: Arc<Gate>,
    event_tx: broadcast::Sender<RuntimeEvent>,
}

impl RunContext {
    fn feedback(&self, message: &str, kind: FeedbackKind, node: &NodeDescriptor, payload: Option<Value>) {
        let _ = self.event_tx.send(RuntimeEvent::Feedback {
            message: message.to_string(),
            kind,
            node: node.clone(),
            payload,
        });
    }
}

fn collect_loop_bodies(plan: &HierarchicalPlan, out: &mut HashMap<NodeId, (String, Vec<NodeId>)>) {
    for step in &plan.steps {
        match step {
            Step::Loop(loop_step) => {
                out.insert(
                    loop_step.header.id.clone(),
                    (loop_step.loop_socket.clone(), loop_step.body_node_ids.clone()),
                );
                collect_loop_bodies(&loop_step.body, out);
            }
            Step::Branch(branch) => {
                for (_, arm_plan) in &branch.arms {
                    collect_loop_bodies(arm_plan, out);
                }
            }
            Step::Layer(_) => {}
        }
    }
}

/// Clear both a node's executed mark and its cached data-input socket
/// values, local to this storage scope. Clearing the mark alone is not
/// enough to force re-invocation to observe fresh upstream data: the next
/// `resolve_inputs` pass would still short-circuit on the stale cached
/// value (`runtime.rs`'s `resolve_inputs`/`resolve_single_input`), so a
/// re-run node must also forget what it last resolved. Used wherever a node
/// legitimately runs again within one run — a loop-body iteration, or a
/// streaming operator's per-emission downstream chain.
fn reset_node_states(ctx: &RunContext, storage: &ExecutionStorage, node_ids: &[NodeId]) {
    storage.clear_executed(node_ids);
    for id in node_ids {
        if let Some(node) = ctx.node_map.get(id) {
            for input in node.data_inputs() {
                storage.clear_socket(id, &input.name);
            }
        }
    }
}

/// Every node transitively reachable via execution connections starting
/// from `node`'s `socket` output — the chain a single trigger/emit on that
/// socket would run. Used to reset a streaming operator's downstream chain
/// before each emission, the same way a loop header's body is reset before
/// each iteration.
fn downstream_chain(ctx: &RunContext, node: &NodeId, socket: &str) -> Vec<NodeId> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = ctx
        .connections
        .iter()
        .filter(|c| &c.from_node == node && c.from_socket == socket && c.is_execution)
        .map(|c| c.to_node.clone())
        .collect();

    while let Some(id) = queue.pop_front() {
        if !visited.insert(id.clone()) {
            continue;
        }
        for c in ctx.connections.iter().filter(|c| c.from_node == id && c.is_execution) {
            queue.push_back(c.to_node.clone());
        }
    }

    visited.into_iter().collect()
}

/// The handle actually installed into every [`ExecutionContext`]: wraps the
/// shared `Arc<RunContext>` so `trigger`/`emit` can recurse into
/// `execute_node` with their own owned `Arc` clone instead of a borrow.
struct RuntimeCallbacksHandle(Arc<RunContext>);

#[async_trait]
impl RuntimeCallbacks for RuntimeCallbacksHandle {
    async fn trigger(
        &self,
        node: &NodeId,
        socket: &str,
        storage: &Arc<ExecutionStorage>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ctx = self.0.clone();

        if let Some((loop_socket, body_ids)) = ctx.loop_bodies.get(node) {
            if loop_socket == socket {
                reset_node_states(&ctx, storage, body_ids);
            }
        }

        let mut targets: Vec<NodeDescriptor> = ctx
            .connections
            .iter()
            .filter(|c| &c.from_node == node && c.from_socket == socket && c.is_execution)
            .filter_map(|c| ctx.node_map.get(&c.to_node).cloned())
            .collect();
        targets.sort_by(|a, b| a.id.cmp(&b.id));

        run_targets(ctx, targets, storage.clone(), cancel.clone()).await
    }

    async fn emit(
        &self,
        node: &NodeId,
        socket: &str,
        value: Value,
        storage: &Arc<ExecutionStorage>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        storage.set_socket(node, socket, value);

        // A stream socket's downstream chain is not a loop body — nothing
        // clears its executed marks between emissions otherwise — so a
        // second and later emission would find every consumer already
        // marked executed and skip it entirely, and any data input it
        // cached from the first emission would never be re-resolved.
        // Reset the whole transitive chain, same as a loop iteration reset,
        // before each emission runs it again.
        let chain = downstream_chain(&self.0, node, socket);
        if !chain.is_empty() {
            reset_node_states(&self.0, storage, &chain);
        }

        // Emission semantics (Sequential vs FireAndForget) are an
        // operator-level choice implemented by streaming operators in
        // flowgraph-ops; the core contract here is just that the emitted
        // value becomes visible before downstream chains are triggered.
        self.trigger(node, socket, storage, cancel).await
    }

    async fn reread_input(
        &self,
        node: &NodeId,
        socket: &str,
        storage: &Arc<ExecutionStorage>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let ctx = self.0.clone();
        let descriptor = ctx
            .node_map
            .get(node)
            .cloned()
            .ok_or_else(|| FlowError::MissingDependency { node: node.clone(), socket: socket.to_string() })?;
        let input = descriptor
            .input(socket)
            .cloned()
            .ok_or_else(|| FlowError::MissingDependency { node: node.clone(), socket: socket.to_string() })?;

        storage.clear_socket(node, socket);

        // Clearing the target's own cache is not enough: resolving it again
        // would just re-read a pure-data source's last cached output, since
        // that source is still marked executed. Clear the source's mark and
        // cache too so it actually re-runs and picks up side effects the
        // loop body made since the first read (e.g. a variable it reads).
        // A callable source is left alone — rereading a data socket should
        // never re-trigger an operator's execution side effects.
        if let Some(conn) = ctx
            .connections
            .iter()
            .find(|c| c.to_node == *node && c.to_socket == socket && !c.is_execution)
        {
            if let Some(source) = ctx.node_map.get(&conn.from_node) {
                if !source.is_callable() {
                    storage.clear_executed(&[source.id.clone()]);
                    storage.clear_socket(&source.id, &conn.from_socket);
                }
            }
        }

        resolve_single_input(ctx, &descriptor, &input, storage.clone(), cancel.clone()).await
    }

    fn feedback(&self, message: &str, kind: FeedbackKind, node: &NodeDescriptor, payload: Option<Value>) {
        self.0.feedback(message, kind, node, payload);
    }

    fn loop_iteration_cap(&self) -> usize {
        self.0.options.loop_iteration_cap
    }
}

async fn run_targets(
    ctx: Arc<RunContext>,
    targets: Vec<NodeDescriptor>,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }
    if ctx.options.max_parallelism > 1 && targets.len() > 1 {
        run_concurrent(ctx, targets, storage, cancel).await
    } else {
        for target in targets {
            execute_node(ctx.clone(), target, storage.clone(), cancel.clone()).await?;
        }
        Ok(())
    }
}

async fn run_concurrent(
    ctx: Arc<RunContext>,
    targets: Vec<NodeDescriptor>,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(ctx.options.max_parallelism));
    let mut joins = JoinSet::new();

    for node in targets {
        let ctx = ctx.clone();
        let storage = storage.clone();
        let cancel = cancel.clone();
        let semaphore = semaphore.clone();
        joins.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            execute_node(ctx, node, storage, cancel).await
        });
    }

    let mut first_error = None;
    while let Some(joined) = joins.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(e);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(FlowError::operator_failure(NodeId::new("<task>"), join_err));
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Walk a plan's steps in order, fanning layers out per the options and
/// driving loop headers once each.
fn run_plan(
    ctx: Arc<RunContext>,
    plan: HierarchicalPlan,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        for (layer_id, step) in plan.steps.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(FlowError::Canceled);
            }
            match step {
                Step::Layer(layer) => {
                    let _ = ctx.event_tx.send(RuntimeEvent::LayerStarted(layer_id));
                    let mut nodes = layer.nodes;
                    nodes.sort_by(|a, b| a.id.cmp(&b.id));
                    tracing::debug!(layer = layer_id, node_count = nodes.len(), "running layer");
                    run_targets(ctx.clone(), nodes, storage.clone(), cancel.clone()).await?;
                    let _ = ctx.event_tx.send(RuntimeEvent::LayerCompleted(layer_id));
                }
                Step::Loop(loop_step) => {
                    tracing::debug!(header = %loop_step.header.id, "entering loop");
                    execute_loop(ctx.clone(), loop_step, storage.clone(), cancel.clone()).await?;
                }
                Step::Branch(branch) => {
                    // Reserved: the standard Branch operator uses execution
                    // signals instead, so the planner never emits this today.
                    return Err(FlowError::MissingDependency {
                        node: branch.condition_node,
                        socket: "<branch-step>".to_string(),
                    });
                }
            }
        }
        Ok(())
    })
}

async fn execute_loop(
    ctx: Arc<RunContext>,
    loop_step: crate::plan::LoopStep,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
) -> Result<()> {
    // The header operator owns iteration: each call it makes to
    // `trigger(loop_socket)` clears the body's executed marks (via the
    // `loop_bodies` lookup in `RuntimeCallbacksHandle::trigger`) before
    // re-running the body's nodes through their own connections. The
    // header triggers its exit socket, awaited after the loop finishes, once
    // it is done — deferred for free by ordinary `.await` sequencing inside
    // the operator's own `execute` body.
    execute_node(ctx, loop_step.header, storage, cancel).await
}

fn execute_node(
    ctx: Arc<RunContext>,
    node: NodeDescriptor,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        if storage.is_executed(&node.id) {
            return Ok(());
        }

        resolve_inputs(ctx.clone(), &node, storage.clone(), cancel.clone()).await?;

        ctx.gate.wait(&cancel).await?;

        let _ = ctx.event_tx.send(RuntimeEvent::NodeStarted(node.clone()));
        tracing::debug!(node = %node.id, "invoking node");

        let operator = ctx.registry.resolve(&node.definition_id, &node.name)?;
        let callbacks: Arc<dyn RuntimeCallbacks> = Arc::new(RuntimeCallbacksHandle(ctx.clone()));
        let mut exec_ctx = ExecutionContext::new(&node, &storage, cancel.clone()).with_runtime(callbacks);

        let result = operator.execute(&mut exec_ctx, &cancel).await;

        match result {
            Ok(()) => {
                storage.mark_executed(&node.id);
                let _ = ctx.event_tx.send(RuntimeEvent::NodeCompleted(node.clone()));
                Ok(())
            }
            Err(e) => {
                let _ = ctx.event_tx.send(RuntimeEvent::NodeFailed {
                    node: node.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    })
}

/// Lazily resolve every declared data input, recursively executing pure
/// data producers on demand and caching their outputs in storage.
fn resolve_inputs(
    ctx: Arc<RunContext>,
    node: &NodeDescriptor,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<()>> {
    let node = node.clone();
    Box::pin(async move {
        for input in node.data_inputs() {
            if storage.get_socket(&node.id, &input.name).is_some() {
                continue;
            }
            resolve_single_input(ctx.clone(), &node, input, storage.clone(), cancel.clone()).await?;
        }
        Ok(())
    })
}

/// Resolve one declared data input: reuse a cached value, else pull from
/// its incoming connection (recursively executing a pure-data producer, or
/// warning and falling back to its last-written output for a callable one),
/// else fall back to the socket's literal default. Caches the result.
fn resolve_single_input(
    ctx: Arc<RunContext>,
    node: &NodeDescriptor,
    input: &crate::descriptor::SocketDescriptor,
    storage: Arc<ExecutionStorage>,
    cancel: CancellationToken,
) -> BoxFuture<'static, Result<Value>> {
    let node = node.clone();
    let input = input.clone();
    Box::pin(async move {
        if let Some(v) = storage.get_socket(&node.id, &input.name) {
            return Ok(v);
        }

        let incoming = ctx
            .connections
            .iter()
            .find(|c| c.to_node == node.id && c.to_socket == input.name && !c.is_execution)
            .cloned();

        let resolved = if let Some(conn) = incoming {
            let source = ctx.node_map.get(&conn.from_node).cloned();
            match source {
                Some(source) => {
                    if !storage.is_executed(&source.id) {
                        if source.is_callable() {
                            ctx.feedback(
                                &format!("data pulled from callable node {} before it executed", source.id),
                                FeedbackKind::Warn,
                                &node,
                                None,
                            );
                        } else {
                            execute_node(ctx.clone(), source.clone(), storage.clone(), cancel.clone()).await?;
                        }
                    }
                    storage.get_socket(&source.id, &conn.from_socket)
                }
                None => None,
            }
        } else {
            None
        };

        let value = match resolved {
            Some(v) => ctx.resolver.convert(&input.type_name, v).map_err(|_| FlowError::TypeMismatch {
                node: node.id.clone(),
                socket: input.name.clone(),
                expected: input.type_name.clone(),
                got: "incompatible value".to_string(),
            })?,
            None => ctx.resolver.default_for(&input.type_name, input.default.as_ref())?,
        };

        storage.set_socket(&node.id, &input.name, value.clone());
        Ok(value)
    })
}

fn subscribe_event_listeners(ctx: &Arc<RunContext>, storage: &Arc<ExecutionStorage>, cancel: &CancellationToken) {
    for node in ctx.node_map.values() {
        if node.definition_id != CUSTOM_EVENT_LISTENER_DEFINITION_ID {
            continue;
        }
        let Some(event_name_socket) = node.input(EVENT_NAME_SOCKET) else { continue };
        let Some(Value::String(event_name)) = event_name_socket.default.clone() else { continue };

        let ctx = ctx.clone();
        let storage = storage.clone();
        let outer_cancel = cancel.clone();
        let node_id = node.id.clone();

        storage.event_bus().subscribe(
            &event_name,
            Arc::new(move |handler_cancel: CancellationToken| {
                let ctx = ctx.clone();
                let storage = storage.clone();
                let node_id = node_id.clone();
                let outer_cancel = outer_cancel.clone();
                Box::pin(async move {
                    let targets: Vec<NodeDescriptor> = ctx
                        .connections
                        .iter()
                        .filter(|c| c.from_node == node_id && c.from_socket == crate::descriptor::EXIT)
                        .filter_map(|c| ctx.node_map.get(&c.to_node).cloned())
                        .collect();
                    let cancel = if outer_cancel.is_cancelled() { outer_cancel } else { handler_cancel };
                    run_targets(ctx, targets, storage, cancel).await
                })
            }),
        );
    }
}

async fn create_instances(ctx: &Arc<RunContext>, storage: &Arc<ExecutionStorage>, cancel: &CancellationToken) -> Result<()> {
    let mut ids: Vec<&NodeId> = ctx.node_map.keys().collect();
    ids.sort();
    for id in ids {
        let node = ctx.node_map.get(id).unwrap();
        let operator = ctx.registry.resolve(&node.definition_id, &node.name)?;
        let exec_ctx = ExecutionContext::new(node, storage, cancel.clone());
        operator.on_created(&exec_ctx).await?;
    }
    Ok(())
}

async fn dispose_instances(ctx: &Arc<RunContext>, storage: &Arc<ExecutionStorage>, cancel: &CancellationToken) {
    let mut ids: Vec<&NodeId> = ctx.node_map.keys().collect();
    ids.sort();
    for id in ids {
        let node = ctx.node_map.get(id).unwrap();
        if let Ok(operator) = ctx.registry.resolve(&node.definition_id, &node.name) {
            let exec_ctx = ExecutionContext::new(node, storage, cancel.clone());
            operator.on_disposed(&exec_ctx).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::InlineOperator;
    use crate::descriptor::{SocketDescriptor, ENTER, EXIT};

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

    fn counter_node(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: "counter".into(),
            name: "Counter".into(),
            inputs: vec![SocketDescriptor::input_exec(ENTER)],
            outputs: vec![SocketDescriptor::output_exec(EXIT)],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    #[tokio::test]
    async fn linear_graph_executes_every_reachable_node() {
        let nodes = vec![initiator("start"), counter_node("a"), counter_node("b")];
        let connections = vec![
            Connection::new("start", EXIT, "a", ENTER, true),
            Connection::new("a", EXIT, "b", ENTER, true),
        ];

        let mut registry = OperatorRegistry::new();
        registry.register_inline("start", "Start", InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                ctx.trigger(EXIT).await
            })
        }));
        registry.register_inline("counter", "Counter", InlineOperator::new(|ctx, _c| {
            Box::pin(async move {
                ctx.set_variable("ran", Value::Bool(true));
                ctx.trigger(EXIT).await
            })
        }));

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();
        assert!(report.storage.is_executed(&NodeId::new("a")));
        assert!(report.storage.is_executed(&NodeId::new("b")));
    }

    #[tokio::test]
    async fn unreachable_island_never_executes() {
        let nodes = vec![initiator("start"), counter_node("a"), counter_node("island")];
        let connections = vec![Connection::new("start", EXIT, "a", ENTER, true)];

        let mut registry = OperatorRegistry::new();
        registry.register_inline("start", "Start", InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));
        registry.register_inline("counter", "Counter", InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();
        assert!(report.storage.is_executed(&NodeId::new("a")));
        assert!(!report.storage.is_executed(&NodeId::new("island")));
    }

    #[tokio::test]
    async fn reread_input_observes_a_variable_written_since_the_first_resolve() {
        let nodes = vec![
            NodeDescriptor {
                id: NodeId::new("cond"),
                definition_id: "read_flag".into(),
                name: "ReadFlag".into(),
                inputs: vec![],
                outputs: vec![SocketDescriptor::output_data("Value", "bool")],
                is_execution_initiator: false,
                is_loop_header: false,
            },
            NodeDescriptor {
                id: NodeId::new("header"),
                definition_id: "probe".into(),
                name: "Probe".into(),
                inputs: vec![
                    SocketDescriptor::input_exec(ENTER),
                    SocketDescriptor::input_data("Cond", "bool"),
                ],
                outputs: vec![SocketDescriptor::output_exec(EXIT)],
                is_execution_initiator: false,
                is_loop_header: false,
            },
            initiator("start"),
        ];
        let connections = vec![
            Connection::new("start", EXIT, "header", ENTER, true),
            Connection::new("cond", "Value", "header", "Cond", false),
        ];

        let mut registry = OperatorRegistry::new();
        registry.register_inline(
            "read_flag",
            "ReadFlag",
            InlineOperator::new(|ctx, _c| {
                Box::pin(async move {
                    let flag = ctx.get_variable("flag").and_then(|v| v.as_bool()).unwrap_or(false);
                    ctx.set_output("Value", Value::Bool(flag));
                    Ok(())
                })
            }),
        );
        registry.register_inline(
            "probe",
            "Probe",
            InlineOperator::new(|ctx, _c| {
                Box::pin(async move {
                    let first = ctx.get_input_bool("Cond")?;
                    ctx.set_variable("flag", Value::Bool(true));
                    let reread = ctx.reread_input_bool("Cond").await?;
                    ctx.set_variable("first", Value::Bool(first));
                    ctx.set_variable("reread", Value::Bool(reread));
                    ctx.trigger(EXIT).await
                })
            }),
        );
        registry.register_inline("start", "Start", InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));

        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(nodes, connections, CancellationToken::new()).await.unwrap();
        assert_eq!(report.storage.get_variable("first"), Some(Value::Bool(false)));
        assert_eq!(report.storage.get_variable("reread"), Some(Value::Bool(true)));
    }

    #[tokio::test]
    async fn empty_graph_completes_with_no_events() {
        let registry = OperatorRegistry::new();
        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let report = runtime.run(vec![], vec![], CancellationToken::new()).await.unwrap();
        assert!(report.storage.get_variable("anything").is_none());
    }

    #[tokio::test]
    async fn cancellation_before_start_yields_canceled_error() {
        let nodes = vec![initiator("start")];
        let mut registry = OperatorRegistry::new();
        registry.register_inline("start", "Start", InlineOperator::new(|ctx, _c| Box::pin(async move { ctx.trigger(EXIT).await })));
        let runtime = Runtime::new(Arc::new(registry), RuntimeOptions::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = runtime.run(nodes, vec![], cancel).await;
        assert!(matches!(result, Err(FlowError::Canceled)));
    }
}
