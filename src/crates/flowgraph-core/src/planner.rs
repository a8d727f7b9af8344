//! The hierarchical execution planner: validates a graph, detects loops,
//! extracts loop bodies, and topologically layers everything else.
//!
//! The planner never executes anything — it only produces a
//! [`HierarchicalPlan`] (or a validation failure) that the runtime walks.
//! Plan order is deterministic: ties within a layer are broken by ascending
//! node id, so `plan(nodes, connections)` is a pure function of its inputs.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::descriptor::{Connection, NodeDescriptor, NodeId, SocketFlavor, EXIT, LOOP_PATH, ENTER};
use crate::error::{FlowError, Result, Severity, ValidationMessage};
use crate::plan::{HierarchicalPlan, LayerStep, LoopStep, Step};

/// Stateless: the planner carries no fields, only the pure function
/// `plan`. Kept as a unit struct so call sites read `Planner::plan(..)`
/// the same way the rest of the crate reads as a collection of services.
pub struct Planner;

/// The result of a successful planning pass: the plan plus any non-fatal
/// warnings accumulated along the way (e.g. a fallback layer for an
/// undetected cycle).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutput {
    pub plan: HierarchicalPlan,
    pub warnings: Vec<ValidationMessage>,
}

impl Planner {
    pub fn plan(nodes: &[NodeDescriptor], connections: &[Connection]) -> Result<PlanOutput> {
        let node_map: HashMap<NodeId, &NodeDescriptor> =
            nodes.iter().map(|n| (n.id.clone(), n)).collect();

        let messages = validate(nodes, &node_map, connections);
        if messages.iter().any(|m| m.severity == Severity::Error) {
            return Err(FlowError::GraphValidation(messages));
        }
        let mut warnings = messages;

        // Headers are processed in ascending id order so body-claiming and
        // plan emission stay deterministic.
        let mut headers: Vec<&NodeDescriptor> =
            nodes.iter().filter(|n| n.is_loop_header).collect();
        headers.sort_by(|a, b| a.id.cmp(&b.id));

        let mut claimed: HashSet<NodeId> = HashSet::new();
        let mut bodies: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for header in &headers {
            let body = extract_loop_body(header, connections, &claimed);
            for id in &body {
                claimed.insert(id.clone());
            }
            bodies.insert(header.id.clone(), body);
        }
        for header in &headers {
            claimed.insert(header.id.clone());
        }

        let back_edges = classify_back_edges(&headers, &bodies, connections);
        let forward: Vec<&Connection> = connections
            .iter()
            .enumerate()
            .filter(|(i, _)| !back_edges.contains(i))
            .map(|(_, c)| c)
            .collect();

        let (steps, remainder_warning) = layer_remainder(nodes, &node_map, &headers, &bodies, &forward);
        if let Some(w) = remainder_warning {
            warnings.push(w);
        }

        Ok(PlanOutput { plan: HierarchicalPlan { steps }, warnings })
    }
}

fn validate(
    nodes: &[NodeDescriptor],
    node_map: &HashMap<NodeId, &NodeDescriptor>,
    connections: &[Connection],
) -> Vec<ValidationMessage> {
    let mut messages = Vec::new();
    let mut incoming_count: HashMap<(NodeId, String), usize> = HashMap::new();

    for conn in connections {
        let from = node_map.get(&conn.from_node);
        let to = node_map.get(&conn.to_node);

        let (Some(from), Some(to)) = (from, to) else {
            messages.push(ValidationMessage::error(format!(
                "connection references unknown node(s): {} -> {}",
                conn.from_node, conn.to_node
            )));
            continue;
        };

        let from_socket = from.output(&conn.from_socket);
        let to_socket = to.input(&conn.to_socket);
        let (Some(from_socket), Some(to_socket)) = (from_socket, to_socket) else {
            messages.push(ValidationMessage::error(format!(
                "connection references unknown socket(s): {}.{} -> {}.{}",
                conn.from_node, conn.from_socket, conn.to_node, conn.to_socket
            )));
            continue;
        };

        let flavors_agree = from_socket.flavor == to_socket.flavor
            && (from_socket.flavor == SocketFlavor::Execution) == conn.is_execution;
        if !flavors_agree {
            messages.push(ValidationMessage::error(format!(
                "connection {}.{} -> {}.{} mixes execution and data sockets",
                conn.from_node, conn.from_socket, conn.to_node, conn.to_socket
            )));
        }

        if conn.is_execution && to.is_execution_initiator {
            messages.push(ValidationMessage::error(format!(
                "execution initiator {} is targeted by an incoming execution connection",
                to.id
            )));
        }

        *incoming_count.entry((conn.to_node.clone(), conn.to_socket.clone())).or_insert(0) += 1;
    }

    for ((node, socket), count) in incoming_count {
        if count > 1 {
            messages.push(ValidationMessage::error(format!(
                "input socket {node}.{socket} has {count} incoming connections, at most 1 allowed"
            )));
        }
    }

    for node in nodes {
        if node.is_execution_initiator && node.input(ENTER).is_some() {
            messages.push(ValidationMessage::error(format!(
                "execution initiator {} declares an execution input socket",
                node.id
            )));
        }
    }

    messages
}

/// BFS from a loop header's `LoopPath` successors, stopping at the header
/// itself or at a node already claimed by an earlier-processed header's
/// body. Nodes reachable only through the header's `Exit` path are never
/// visited, since traversal never starts there.
fn extract_loop_body(
    header: &NodeDescriptor,
    connections: &[Connection],
    claimed: &HashSet<NodeId>,
) -> Vec<NodeId> {
    let mut body = Vec::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = connections
        .iter()
        .filter(|c| c.from_node == header.id && c.from_socket == LOOP_PATH)
        .map(|c| c.to_node.clone())
        .collect();

    while let Some(n) = queue.pop_front() {
        if n == header.id || claimed.contains(&n) || visited.contains(&n) {
            continue;
        }
        visited.insert(n.clone());
        body.push(n.clone());
        for c in connections.iter().filter(|c| c.from_node == n) {
            queue.push_back(c.to_node.clone());
        }
    }

    body
}

/// A connection is a back-edge iff it is a self-loop, or it targets a loop
/// header's execution input from a node inside that header's body.
fn classify_back_edges(
    headers: &[&NodeDescriptor],
    bodies: &HashMap<NodeId, Vec<NodeId>>,
    connections: &[Connection],
) -> HashSet<usize> {
    let mut back_edges = HashSet::new();
    for (i, conn) in connections.iter().enumerate() {
        if conn.from_node == conn.to_node {
            back_edges.insert(i);
            continue;
        }
        for header in headers {
            if conn.to_node == header.id && conn.to_socket == ENTER {
                if let Some(body) = bodies.get(&header.id) {
                    if body.contains(&conn.from_node) {
                        back_edges.insert(i);
                    }
                }
            }
        }
    }
    back_edges
}

/// Kahn's algorithm over the remainder subgraph (headers and their bodies
/// removed), gated by loop-exit dependencies: a node waiting on a header's
/// `Exit` successor edge cannot emit until that header has itself been
/// inserted as a `LoopStep`.
fn layer_remainder(
    nodes: &[NodeDescriptor],
    node_map: &HashMap<NodeId, &NodeDescriptor>,
    headers: &[&NodeDescriptor],
    bodies: &HashMap<NodeId, Vec<NodeId>>,
    forward: &[&Connection],
) -> (Vec<Step>, Option<ValidationMessage>) {
    let header_ids: HashSet<NodeId> = headers.iter().map(|h| h.id.clone()).collect();
    let body_ids: HashSet<NodeId> =
        bodies.values().flat_map(|b| b.iter().cloned()).collect();

    // A callable node (one with an execution socket) only ever runs because
    // something triggers it. Kahn's algorithm below is purely structural —
    // it would happily schedule a callable node with zero incoming edges in
    // round one, exactly like a genuine initiator. Find every callable node
    // actually reachable via execution edges from an initiator or a loop
    // header first, so an orphaned callable node (no initiator, nothing
    // wired to its entry) is left out of the remainder entirely instead of
    // being force-run.
    let exec_successors: HashMap<NodeId, Vec<NodeId>> = forward.iter().filter(|c| c.is_execution).fold(
        HashMap::new(),
        |mut acc, c| {
            acc.entry(c.from_node.clone()).or_default().push(c.to_node.clone());
            acc
        },
    );
    let mut exec_reachable: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = nodes
        .iter()
        .filter(|n| n.is_execution_initiator)
        .map(|n| n.id.clone())
        .chain(headers.iter().map(|h| h.id.clone()))
        .collect();
    while let Some(id) = queue.pop_front() {
        if !exec_reachable.insert(id.clone()) {
            continue;
        }
        if let Some(succs) = exec_successors.get(&id) {
            queue.extend(succs.iter().cloned());
        }
    }

    let remainder: Vec<NodeId> = nodes
        .iter()
        .map(|n| n.id.clone())
        .filter(|id| !header_ids.contains(id) && !body_ids.contains(id))
        .filter(|id| {
            let n = *node_map.get(id).unwrap();
            !n.is_callable() || exec_reachable.contains(id)
        })
        .collect();
    let remainder_set: HashSet<NodeId> = remainder.iter().cloned().collect();

    let mut in_degree: HashMap<NodeId, usize> = remainder.iter().map(|id| (id.clone(), 0)).collect();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for conn in forward {
        if remainder_set.contains(&conn.from_node) && remainder_set.contains(&conn.to_node) {
            *in_degree.get_mut(&conn.to_node).unwrap() += 1;
            successors.entry(conn.from_node.clone()).or_default().push(conn.to_node.clone());
        }
    }

    // Nodes blocked on a loop header's Exit edge until that header emits.
    let mut exit_blockers: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for conn in forward {
        if conn.from_socket == EXIT && header_ids.contains(&conn.from_node) && remainder_set.contains(&conn.to_node) {
            exit_blockers.entry(conn.to_node.clone()).or_default().push(conn.from_node.clone());
        }
    }

    // A header's main-graph predecessors: remainder nodes wired into any
    // of its input sockets (its body feeds back via the excluded back-edge).
    let mut header_predecessors: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    for conn in forward {
        if header_ids.contains(&conn.to_node) && remainder_set.contains(&conn.from_node) {
            header_predecessors.entry(conn.to_node.clone()).or_default().insert(conn.from_node.clone());
        }
    }

    let mut emitted_nodes: HashSet<NodeId> = HashSet::new();
    let mut emitted_headers: HashSet<NodeId> = HashSet::new();
    let mut pending_headers: Vec<NodeId> = headers.iter().map(|h| h.id.clone()).collect();
    pending_headers.sort();

    let mut steps = Vec::new();

    // Headers with no remainder predecessors at all are ready immediately.
    emit_ready_headers(
        &mut pending_headers,
        &header_predecessors,
        &emitted_nodes,
        &mut emitted_headers,
        &mut steps,
        node_map,
        bodies,
        forward,
    );

    loop {
        let mut ready: Vec<NodeId> = remainder
            .iter()
            .filter(|id| {
                !emitted_nodes.contains(*id)
                    && in_degree.get(*id).copied().unwrap_or(0) == 0
                    && exit_blockers
                        .get(*id)
                        .map(|hs| hs.iter().all(|h| emitted_headers.contains(h)))
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        ready.sort();

        if ready.is_empty() {
            break;
        }

        let layer_nodes: Vec<NodeDescriptor> =
            ready.iter().map(|id| (*node_map.get(id).unwrap()).clone()).collect();
        steps.push(Step::Layer(LayerStep { nodes: layer_nodes }));

        for id in &ready {
            emitted_nodes.insert(id.clone());
            if let Some(succs) = successors.get(id) {
                for s in succs {
                    *in_degree.get_mut(s).unwrap() -= 1;
                }
            }
        }

        emit_ready_headers(
            &mut pending_headers,
            &header_predecessors,
            &emitted_nodes,
            &mut emitted_headers,
            &mut steps,
            node_map,
            bodies,
            forward,
        );
    }

    let unresolved: Vec<NodeId> = remainder
        .into_iter()
        .filter(|id| !emitted_nodes.contains(id))
        .chain(pending_headers.into_iter())
        .collect();

    let warning = if unresolved.is_empty() {
        None
    } else {
        let nodes: Vec<NodeDescriptor> = unresolved
            .iter()
            .filter_map(|id| node_map.get(id).map(|n| (*n).clone()))
            .collect();
        let ids = unresolved.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ");
        steps.push(Step::Layer(LayerStep { nodes }));
        Some(ValidationMessage::warning(format!(
            "planner could not fully order nodes [{ids}]; emitted as a fallback layer (undetected cycle?)"
        )))
    };

    (steps, warning)
}

#[allow(clippy::too_many_arguments)]
fn emit_ready_headers(
    pending_headers: &mut Vec<NodeId>,
    header_predecessors: &HashMap<NodeId, HashSet<NodeId>>,
    emitted_nodes: &HashSet<NodeId>,
    emitted_headers: &mut HashSet<NodeId>,
    steps: &mut Vec<Step>,
    node_map: &HashMap<NodeId, &NodeDescriptor>,
    bodies: &HashMap<NodeId, Vec<NodeId>>,
    forward: &[&Connection],
) {
    loop {
        let mut ready: Vec<NodeId> = pending_headers
            .iter()
            .filter(|id| {
                header_predecessors
                    .get(*id)
                    .map(|preds| preds.iter().all(|p| emitted_nodes.contains(p)))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        ready.sort();

        if ready.is_empty() {
            return;
        }

        for header_id in ready {
            pending_headers.retain(|id| *id != header_id);
            let header = (*node_map.get(&header_id).unwrap()).clone();
            let body_ids = bodies.get(&header_id).cloned().unwrap_or_default();
            let body_plan = layer_body(&header, &body_ids, node_map, forward);
            steps.push(Step::Loop(LoopStep {
                header,
                loop_socket: LOOP_PATH.to_string(),
                exit_socket: EXIT.to_string(),
                body: body_plan,
                body_node_ids: body_ids,
            }));
            emitted_headers.insert(header_id);
        }
    }
}

/// Layer a loop body's nodes internally by forward edges, the same way the
/// remainder is layered, but scoped to the body's own node set.
fn layer_body(
    header: &NodeDescriptor,
    body_ids: &[NodeId],
    node_map: &HashMap<NodeId, &NodeDescriptor>,
    forward: &[&Connection],
) -> HierarchicalPlan {
    let body_set: HashSet<NodeId> = body_ids.iter().cloned().collect();
    let mut in_degree: HashMap<NodeId, usize> = body_ids.iter().map(|id| (id.clone(), 0)).collect();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    for conn in forward {
        if body_set.contains(&conn.from_node) && body_set.contains(&conn.to_node) {
            *in_degree.get_mut(&conn.to_node).unwrap() += 1;
            successors.entry(conn.from_node.clone()).or_default().push(conn.to_node.clone());
        }
        // Entries from the header's LoopPath socket don't create a body
        // in-degree edge; the header drives the first iteration layer itself.
        let _ = header;
    }

    let mut emitted: HashSet<NodeId> = HashSet::new();
    let mut steps = Vec::new();
    loop {
        let mut ready: Vec<NodeId> = body_ids
            .iter()
            .filter(|id| !emitted.contains(*id) && in_degree.get(*id).copied().unwrap_or(0) == 0)
            .cloned()
            .collect();
        ready.sort();
        if ready.is_empty() {
            break;
        }
        let layer_nodes: Vec<NodeDescriptor> =
            ready.iter().map(|id| (*node_map.get(id).unwrap()).clone()).collect();
        steps.push(Step::Layer(LayerStep { nodes: layer_nodes }));
        for id in &ready {
            emitted.insert(id.clone());
            if let Some(succs) = successors.get(id) {
                for s in succs {
                    *in_degree.get_mut(s).unwrap() -= 1;
                }
            }
        }
    }
    HierarchicalPlan { steps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SocketDescriptor;

    fn initiator(id: &str, exit: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: "start".into(),
            name: id.into(),
            inputs: vec![],
            outputs: vec![SocketDescriptor::output_exec(exit)],
            is_execution_initiator: true,
            is_loop_header: false,
        }
    }

    fn simple_node(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: "noop".into(),
            name: id.into(),
            inputs: vec![SocketDescriptor::input_exec(ENTER)],
            outputs: vec![SocketDescriptor::output_exec(EXIT)],
            is_execution_initiator: false,
            is_loop_header: false,
        }
    }

    fn loop_header(id: &str) -> NodeDescriptor {
        NodeDescriptor {
            id: NodeId::new(id),
            definition_id: "for_loop".into(),
            name: id.into(),
            inputs: vec![SocketDescriptor::input_exec(ENTER)],
            outputs: vec![
                SocketDescriptor::output_exec(LOOP_PATH),
                SocketDescriptor::output_exec(EXIT),
            ],
            is_execution_initiator: false,
            is_loop_header: true,
        }
    }

    #[test]
    fn linear_chain_layers_in_dependency_order() {
        let nodes = vec![initiator("start", "Exit"), simple_node("a"), simple_node("b")];
        let connections = vec![
            Connection::new("start", "Exit", "a", ENTER, true),
            Connection::new("a", EXIT, "b", ENTER, true),
        ];
        let output = Planner::plan(&nodes, &connections).unwrap();
        assert_eq!(output.plan.steps.len(), 3);
        for (step, expected) in output.plan.steps.iter().zip(["start", "a", "b"]) {
            match step {
                Step::Layer(layer) => assert_eq!(layer.nodes[0].id.as_str(), expected),
                _ => panic!("expected layer step"),
            }
        }
    }

    #[test]
    fn independent_nodes_share_one_layer_ordered_by_id() {
        let nodes = vec![initiator("start", "Exit"), simple_node("b"), simple_node("a")];
        let connections = vec![
            Connection::new("start", "Exit", "a", ENTER, true),
            Connection::new("start", "Exit", "b", ENTER, true),
        ];
        // two initiators firing the same downstream pair is invalid (two
        // incoming exec connections into one input) -- use a single fan-out
        // instead by sharing a distinct exec output per target is not
        // possible from one socket with >1 connections is fine for OUTPUTS.
        let output = Planner::plan(&nodes, &connections).unwrap();
        let Step::Layer(layer1) = &output.plan.steps[0] else { panic!() };
        assert_eq!(layer1.nodes[0].id.as_str(), "start");
        let Step::Layer(layer2) = &output.plan.steps[1] else { panic!() };
        let ids: Vec<&str> = layer2.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn loop_header_body_and_exit_successor_are_ordered() {
        let nodes =
            vec![initiator("start", "Exit"), loop_header("for"), simple_node("body"), simple_node("after")];
        let connections = vec![
            Connection::new("start", "Exit", "for", ENTER, true),
            Connection::new("for", LOOP_PATH, "body", ENTER, true),
            Connection::new("body", EXIT, "for", ENTER, true),
            Connection::new("for", EXIT, "after", ENTER, true),
        ];
        let output = Planner::plan(&nodes, &connections).unwrap();
        let steps = &output.plan.steps;
        assert_eq!(steps.len(), 3);
        match &steps[1] {
            Step::Loop(loop_step) => {
                assert_eq!(loop_step.header.id.as_str(), "for");
                assert_eq!(loop_step.body_node_ids, vec![NodeId::new("body")]);
            }
            _ => panic!("expected loop step"),
        }
        match &steps[2] {
            Step::Layer(layer) => assert_eq!(layer.nodes[0].id.as_str(), "after"),
            _ => panic!("expected layer step"),
        }
    }

    #[test]
    fn planning_is_deterministic_across_repeated_calls() {
        let nodes = vec![initiator("start", "Exit"), simple_node("z"), simple_node("a")];
        let connections = vec![
            Connection::new("start", "Exit", "a", ENTER, true),
            Connection::new("start", "Exit", "z", ENTER, true),
        ];
        let first = Planner::plan(&nodes, &connections).unwrap();
        let second = Planner::plan(&nodes, &connections).unwrap();
        assert_eq!(first.plan, second.plan);
    }

    #[test]
    fn duplicate_incoming_connections_fail_validation() {
        let nodes = vec![initiator("start", "Exit"), simple_node("a")];
        let connections = vec![
            Connection::new("start", "Exit", "a", ENTER, true),
            Connection::new("start", "Exit", "a", ENTER, true),
        ];
        let err = Planner::plan(&nodes, &connections).unwrap_err();
        assert!(matches!(err, FlowError::GraphValidation(_)));
    }

    #[test]
    fn unknown_socket_reference_fails_validation() {
        let nodes = vec![initiator("start", "Exit"), simple_node("a")];
        let connections = vec![Connection::new("start", "Exit", "a", "NotASocket", true)];
        let err = Planner::plan(&nodes, &connections).unwrap_err();
        assert!(matches!(err, FlowError::GraphValidation(_)));
    }

    #[test]
    fn empty_graph_plans_to_no_steps() {
        let output = Planner::plan(&[], &[]).unwrap();
        assert!(output.plan.is_empty());
    }
}

/// Property-based tests covering the two invariants the planner promises
/// regardless of which graph it is handed: planning is a pure, deterministic
/// function of its inputs, and the layering it produces never schedules a
/// data consumer before its producer.
///
/// Generated graphs are pure-data DAGs (no execution sockets, no loop
/// headers) with forward-only edges (`from < to` by generation index), so
/// every generated graph is acyclic and valid by construction — the
/// properties exercise `layer_remainder`'s Kahn's-algorithm core rather than
/// validation rejection paths, which are covered by the hand-written tests
/// above.
#[cfg(test)]
mod prop_tests {
    use super::*;
    use crate::descriptor::SocketDescriptor;
    use proptest::prelude::*;
    use std::collections::HashMap as Map;

    /// A random forward-edge-only DAG: `node_count` nodes, each potential
    /// edge `i -> j` (i < j) present independently. Every node gets one
    /// input socket per incoming edge and a single data output, so at most
    /// one connection ever lands on a given input socket.
    fn arb_dag(node_count: usize) -> impl Strategy<Value = (Vec<NodeDescriptor>, Vec<Connection>)> {
        let pair_count = node_count * (node_count.saturating_sub(1)) / 2;
        prop::collection::vec(any::<bool>(), pair_count).prop_map(move |present| {
            let mut pairs = Vec::with_capacity(pair_count);
            for i in 0..node_count {
                for j in (i + 1)..node_count {
                    pairs.push((i, j));
                }
            }

            let mut incoming: Map<usize, Vec<usize>> = Map::new();
            for (edge, &(i, j)) in present.iter().zip(pairs.iter()) {
                if *edge {
                    incoming.entry(j).or_default().push(i);
                }
            }

            let node_id = |i: usize| format!("n{i}");
            let mut nodes = Vec::with_capacity(node_count);
            let mut connections = Vec::new();
            for j in 0..node_count {
                let preds = incoming.get(&j).cloned().unwrap_or_default();
                let inputs = (0..preds.len())
                    .map(|k| SocketDescriptor::input_data(format!("in{k}"), "int"))
                    .collect();
                nodes.push(NodeDescriptor {
                    id: NodeId::new(node_id(j)),
                    definition_id: "prop.node".into(),
                    name: node_id(j),
                    inputs,
                    outputs: vec![SocketDescriptor::output_data("out", "int")],
                    is_execution_initiator: false,
                    is_loop_header: false,
                });
                for (k, &i) in preds.iter().enumerate() {
                    connections.push(Connection::new(node_id(i), "out", node_id(j), format!("in{k}"), false));
                }
            }

            (nodes, connections)
        })
    }

    fn layer_index_of(plan: &HierarchicalPlan) -> Map<NodeId, usize> {
        let mut index = Map::new();
        for (i, step) in plan.steps.iter().enumerate() {
            if let Step::Layer(layer) = step {
                for node in &layer.nodes {
                    index.insert(node.id.clone(), i);
                }
            }
        }
        index
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Planning the same graph twice must produce byte-for-byte identical
        /// plans and warnings: `Planner::plan` is a pure function of its
        /// `(nodes, connections)` arguments, never of call order or hidden
        /// state.
        #[test]
        fn planning_is_deterministic((nodes, connections) in arb_dag(6)) {
            let first = Planner::plan(&nodes, &connections).unwrap();
            let second = Planner::plan(&nodes, &connections).unwrap();
            prop_assert_eq!(first, second);
        }

        /// Every node appears in exactly one layer, and every data connection
        /// places its producer in a strictly earlier layer than its consumer
        /// — the planner never schedules a node before the inputs it depends
        /// on are ready.
        #[test]
        fn layering_respects_dependency_order((nodes, connections) in arb_dag(6)) {
            let output = Planner::plan(&nodes, &connections).unwrap();
            let index = layer_index_of(&output.plan);

            prop_assert_eq!(index.len(), nodes.len(), "every node should be placed in exactly one layer");

            for conn in &connections {
                let producer_layer = index.get(&conn.from_node);
                let consumer_layer = index.get(&conn.to_node);
                prop_assert!(producer_layer.is_some() && consumer_layer.is_some());
                prop_assert!(
                    producer_layer < consumer_layer,
                    "producer {:?} (layer {:?}) must precede consumer {:?} (layer {:?})",
                    conn.from_node, producer_layer, conn.to_node, consumer_layer
                );
            }
        }
    }
}
