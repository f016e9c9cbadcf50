//! Depth-first traversal orders.
//!
//! Dataflow iteration is scheduled in (reverse) postorder: a forward analysis
//! that visits nodes in reverse postorder sees every predecessor of a node
//! before the node itself wherever the graph is acyclic, which minimizes the
//! number of fixed-point passes.

use crate::utils::{
    bitset::BitSet,
    graph::{DirectedGraph, NodeId, TraversalDirection},
};

/// Computes the postorder of nodes reachable from `start`.
///
/// Implemented iteratively (an explicit stack of half-expanded nodes) so deep
/// methods cannot overflow the call stack.
#[must_use]
pub fn postorder<N, E>(
    graph: &DirectedGraph<N, E>,
    start: NodeId,
    direction: TraversalDirection,
) -> Vec<NodeId> {
    let mut order = Vec::with_capacity(graph.node_count());
    if start.index() >= graph.node_count() {
        return order;
    }

    let mut visited = BitSet::new(graph.node_count());
    // Stack of (node, iterator over its remaining neighbors).
    let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = Vec::new();

    visited.insert(start.index());
    stack.push((start, graph.neighbors(start, direction).collect(), 0));

    while let Some((node, neighbors, next)) = stack.last_mut() {
        if let Some(&neighbor) = neighbors.get(*next) {
            *next += 1;
            if !visited.contains(neighbor.index()) {
                visited.insert(neighbor.index());
                let expanded = graph.neighbors(neighbor, direction).collect();
                stack.push((neighbor, expanded, 0));
            }
        } else {
            order.push(*node);
            stack.pop();
        }
    }

    order
}

/// Computes the reverse postorder of nodes reachable from `start`.
#[must_use]
pub fn reverse_postorder<N, E>(
    graph: &DirectedGraph<N, E>,
    start: NodeId,
    direction: TraversalDirection,
) -> Vec<NodeId> {
    let mut order = postorder(graph, start, direction);
    order.reverse();
    order
}

/// Computes the set of nodes reachable from `start`.
#[must_use]
pub fn reachable_from<N, E>(
    graph: &DirectedGraph<N, E>,
    start: NodeId,
    direction: TraversalDirection,
) -> BitSet {
    let mut reachable = BitSet::new(graph.node_count());
    if start.index() >= graph.node_count() {
        return reachable;
    }
    let mut worklist = vec![start];
    reachable.insert(start.index());
    while let Some(node) = worklist.pop() {
        for neighbor in graph.neighbors(node, direction) {
            if !reachable.contains(neighbor.index()) {
                reachable.insert(neighbor.index());
                worklist.push(neighbor);
            }
        }
    }
    reachable
}
