//! Depth-first ordering analyses.
//!
//! [`DepthFirstSearch`] and [`ReverseDepthFirstSearch`] are cacheable results
//! recording traversal orders over a CFG together with a classification of
//! every edge (tree, back, forward, cross). The dataflow solver schedules its
//! worklist from these orders, and loop-sensitive detectors use the back-edge
//! classification directly.

use crate::{
    analysis::cfg::ControlFlowGraph,
    utils::graph::{EdgeId, NodeId, TraversalDirection},
};

/// Classification of a CFG edge with respect to one depth-first forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DfsEdgeKind {
    /// The edge discovered its target.
    Tree,
    /// The edge targets an ancestor still on the DFS stack; indicates a loop.
    Back,
    /// The edge targets a finished descendant.
    Forward,
    /// The edge targets a finished node in another subtree.
    Cross,
    /// The edge was not reached by the traversal (source unreachable).
    Unreached,
}

/// A depth-first search over a CFG from a root, with timestamps and edge
/// classification.
///
/// Construction is deterministic: edges are explored in insertion order, so
/// two searches over the same CFG yield identical orders - the cache relies on
/// this when results are compared across runs.
#[derive(Debug, Clone)]
pub struct DepthFirstOrder {
    preorder: Vec<NodeId>,
    postorder: Vec<NodeId>,
    reverse_postorder: Vec<NodeId>,
    edge_kinds: Vec<DfsEdgeKind>,
    discovery: Vec<usize>,
    finish: Vec<usize>,
}

const UNDISCOVERED: usize = usize::MAX;

impl DepthFirstOrder {
    fn search(cfg: &ControlFlowGraph, root: NodeId, direction: TraversalDirection) -> Self {
        let node_count = cfg.node_count();
        let mut discovery = vec![UNDISCOVERED; node_count];
        let mut finish = vec![UNDISCOVERED; node_count];
        let mut edge_kinds = vec![DfsEdgeKind::Unreached; cfg.edge_count()];
        let mut preorder = Vec::with_capacity(node_count);
        let mut postorder = Vec::with_capacity(node_count);
        let mut clock = 0usize;

        // Explicit stack of (node, edges, cursor); a frame finishes when its
        // cursor runs off the end of its edge list.
        let edges_of = |node: NodeId| -> Vec<(EdgeId, NodeId)> {
            match direction {
                TraversalDirection::Forward => {
                    cfg.outgoing(node).map(|(id, target, _)| (id, target)).collect()
                }
                TraversalDirection::Backward => {
                    cfg.incoming(node).map(|(id, source, _)| (id, source)).collect()
                }
            }
        };

        let mut stack: Vec<(NodeId, Vec<(EdgeId, NodeId)>, usize)> = Vec::new();
        discovery[root.index()] = clock;
        clock += 1;
        preorder.push(root);
        stack.push((root, edges_of(root), 0));

        while let Some((node, edges, cursor)) = stack.last_mut() {
            if let Some(&(edge_id, next)) = edges.get(*cursor) {
                *cursor += 1;
                let node = *node;
                if discovery[next.index()] == UNDISCOVERED {
                    edge_kinds[edge_id.index()] = DfsEdgeKind::Tree;
                    discovery[next.index()] = clock;
                    clock += 1;
                    preorder.push(next);
                    stack.push((next, edges_of(next), 0));
                } else if finish[next.index()] == UNDISCOVERED {
                    edge_kinds[edge_id.index()] = DfsEdgeKind::Back;
                } else if discovery[node.index()] < discovery[next.index()] {
                    edge_kinds[edge_id.index()] = DfsEdgeKind::Forward;
                } else {
                    edge_kinds[edge_id.index()] = DfsEdgeKind::Cross;
                }
            } else {
                finish[node.index()] = clock;
                clock += 1;
                postorder.push(*node);
                stack.pop();
            }
        }

        let mut reverse_postorder = postorder.clone();
        reverse_postorder.reverse();

        Self {
            preorder,
            postorder,
            reverse_postorder,
            edge_kinds,
            discovery,
            finish,
        }
    }

    /// Returns the nodes in discovery order.
    #[must_use]
    pub fn preorder(&self) -> &[NodeId] {
        &self.preorder
    }

    /// Returns the nodes in finish order.
    #[must_use]
    pub fn postorder(&self) -> &[NodeId] {
        &self.postorder
    }

    /// Returns the nodes in reverse finish order - the canonical forward
    /// dataflow iteration order.
    #[must_use]
    pub fn reverse_postorder(&self) -> &[NodeId] {
        &self.reverse_postorder
    }

    /// Returns the classification of an edge.
    #[must_use]
    pub fn edge_kind(&self, edge: EdgeId) -> DfsEdgeKind {
        self.edge_kinds
            .get(edge.index())
            .copied()
            .unwrap_or(DfsEdgeKind::Unreached)
    }

    /// Returns `true` if the edge closes a cycle in this traversal.
    #[must_use]
    pub fn is_back_edge(&self, edge: EdgeId) -> bool {
        self.edge_kind(edge) == DfsEdgeKind::Back
    }

    /// Returns `true` if the traversal reached the node.
    #[must_use]
    pub fn reached(&self, node: NodeId) -> bool {
        self.discovery
            .get(node.index())
            .is_some_and(|&d| d != UNDISCOVERED)
    }

    /// Returns the discovery timestamp of a node, if reached.
    #[must_use]
    pub fn discovery_time(&self, node: NodeId) -> Option<usize> {
        let time = *self.discovery.get(node.index())?;
        (time != UNDISCOVERED).then_some(time)
    }

    /// Returns the finish timestamp of a node, if reached.
    #[must_use]
    pub fn finish_time(&self, node: NodeId) -> Option<usize> {
        let time = *self.finish.get(node.index())?;
        (time != UNDISCOVERED).then_some(time)
    }
}

/// Depth-first search over the CFG edges from the entry node.
///
/// Cached per method; the forward dataflow analyses iterate in this order's
/// reverse postorder.
#[derive(Debug, Clone)]
pub struct DepthFirstSearch {
    order: DepthFirstOrder,
}

impl DepthFirstSearch {
    /// Runs the search over the given CFG.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        Self {
            order: DepthFirstOrder::search(cfg, cfg.entry(), TraversalDirection::Forward),
        }
    }

    /// Returns the underlying order and classification data.
    #[must_use]
    pub fn order(&self) -> &DepthFirstOrder {
        &self.order
    }
}

impl std::ops::Deref for DepthFirstSearch {
    type Target = DepthFirstOrder;

    fn deref(&self) -> &DepthFirstOrder {
        &self.order
    }
}

/// Depth-first search *against* the CFG edges from the synthetic exit.
///
/// Cached per method; backward dataflow analyses iterate in this order's
/// reverse postorder, and postdominance queries lean on its reachability.
#[derive(Debug, Clone)]
pub struct ReverseDepthFirstSearch {
    order: DepthFirstOrder,
}

impl ReverseDepthFirstSearch {
    /// Runs the search over the given CFG.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        Self {
            order: DepthFirstOrder::search(cfg, cfg.exit(), TraversalDirection::Backward),
        }
    }

    /// Returns the underlying order and classification data.
    #[must_use]
    pub fn order(&self) -> &DepthFirstOrder {
        &self.order
    }
}

impl std::ops::Deref for ReverseDepthFirstSearch {
    type Target = DepthFirstOrder;

    fn deref(&self) -> &DepthFirstOrder {
        &self.order
    }
}
