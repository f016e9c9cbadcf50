//! The control flow graph structure.

use std::{fmt::Write, sync::OnceLock};

use crate::{
    analysis::cfg::{BasicBlock, CfgEdge, CfgEdgeKind},
    utils::{
        bitset::BitSet,
        graph::{
            algorithms::{compute_dominators, DominatorTree},
            DirectedGraph, EdgeId, NodeId, TraversalDirection,
        },
    },
};

/// A control flow graph over one method's basic blocks.
///
/// # Invariants
///
/// - Exactly one entry node (the block containing offset 0) and one synthetic
///   exit node. Every `Return` edge and every uncaught exceptional exit leads
///   to the exit node, so backward analyses have a single boundary.
/// - Every node except the exit has at least one outgoing edge.
/// - Every node is reachable from the entry or flagged dead
///   ([`is_reachable`](Self::is_reachable) reports `false`).
/// - Exception edges carry the exception type they guard.
///
/// The graph is immutable after construction and owned by the analysis cache
/// entry for its method; all analyses share it through an `Arc`.
///
/// # Lazy Computation
///
/// Dominator and postdominator trees are computed on first access and cached
/// in [`OnceLock`]s, so concurrent readers are safe without recomputation.
#[derive(Debug)]
pub struct ControlFlowGraph {
    graph: DirectedGraph<BasicBlock, CfgEdge>,
    entry: NodeId,
    exit: NodeId,
    reachable: BitSet,
    dominators: OnceLock<DominatorTree>,
    postdominators: OnceLock<DominatorTree>,
}

impl ControlFlowGraph {
    /// Assembles a CFG from its parts. Only the builder calls this.
    pub(crate) fn from_parts(
        graph: DirectedGraph<BasicBlock, CfgEdge>,
        entry: NodeId,
        exit: NodeId,
    ) -> Self {
        let reachable =
            crate::utils::graph::algorithms::reachable_from(&graph, entry, TraversalDirection::Forward);
        Self {
            graph,
            entry,
            exit,
            reachable,
            dominators: OnceLock::new(),
            postdominators: OnceLock::new(),
        }
    }

    /// Returns the entry node.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the synthetic exit node.
    #[must_use]
    pub fn exit(&self) -> NodeId {
        self.exit
    }

    /// Returns the total number of nodes, the synthetic exit included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of basic blocks (the synthetic exit is not a block).
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.graph.node_count() - 1
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the block at the given node.
    #[must_use]
    pub fn block(&self, node: NodeId) -> Option<&BasicBlock> {
        self.graph.node(node)
    }

    /// Iterates over `(node, block)` pairs of the real basic blocks, in
    /// offset order; the synthetic exit is skipped.
    pub fn blocks(&self) -> impl Iterator<Item = (NodeId, &BasicBlock)> + '_ {
        self.graph
            .node_ids()
            .filter(move |&id| id != self.exit)
            .filter_map(move |id| self.graph.node(id).map(|b| (id, b)))
    }

    /// Iterates over all node ids, the synthetic exit included.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_ids()
    }

    /// Returns the node whose block covers the given byte offset.
    #[must_use]
    pub fn node_at_offset(&self, offset: u32) -> Option<NodeId> {
        self.blocks()
            .find(|(_, block)| block.contains_offset(offset))
            .map(|(node, _)| node)
    }

    /// Iterates over the successors of a node.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(node)
    }

    /// Iterates over the predecessors of a node.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(node)
    }

    /// Iterates over `(edge id, target node, edge)` for edges leaving `node`.
    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, NodeId, &CfgEdge)> + '_ {
        self.graph.outgoing_edges(node).filter_map(move |edge_id| {
            let (_, target) = self.graph.endpoints(edge_id)?;
            Some((edge_id, target, self.graph.edge(edge_id)?))
        })
    }

    /// Iterates over `(edge id, source node, edge)` for edges entering `node`.
    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = (EdgeId, NodeId, &CfgEdge)> + '_ {
        self.graph.incoming_edges(node).filter_map(move |edge_id| {
            let (source, _) = self.graph.endpoints(edge_id)?;
            Some((edge_id, source, self.graph.edge(edge_id)?))
        })
    }

    /// Returns the payload of an edge.
    #[must_use]
    pub fn edge(&self, edge: EdgeId) -> Option<&CfgEdge> {
        self.graph.edge(edge)
    }

    /// Returns the endpoints of an edge.
    #[must_use]
    pub fn endpoints(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.graph.endpoints(edge)
    }

    /// Returns `true` if the node is reachable from the entry.
    ///
    /// Unreachable blocks are legal input (dead code after an unconditional
    /// jump); they are kept in the graph, flagged dead, and skipped by the
    /// dataflow solver's iteration orders.
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        node.index() < self.reachable.capacity() && self.reachable.contains(node.index())
    }

    /// Returns the underlying graph for the traversal and dominator algorithms.
    #[must_use]
    pub(crate) fn graph(&self) -> &DirectedGraph<BasicBlock, CfgEdge> {
        &self.graph
    }

    /// Returns the dominator tree rooted at the entry, computing it on first
    /// access.
    pub fn dominators(&self) -> &DominatorTree {
        self.dominators.get_or_init(|| {
            compute_dominators(&self.graph, self.entry, TraversalDirection::Forward)
        })
    }

    /// Returns the postdominator tree rooted at the synthetic exit, computing
    /// it on first access.
    pub fn postdominators(&self) -> &DominatorTree {
        self.postdominators.get_or_init(|| {
            compute_dominators(&self.graph, self.exit, TraversalDirection::Backward)
        })
    }

    /// Renders the graph in Graphviz DOT format for debugging.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph cfg {\n");
        for node in self.graph.node_ids() {
            if let Some(block) = self.graph.node(node) {
                let shape = if node == self.exit { "doublecircle" } else { "box" };
                let _ = writeln!(out, "  {} [shape={shape}, label=\"{block}\"];", node.index());
            }
        }
        for node in self.graph.node_ids() {
            for (_, target, edge) in self.outgoing(node) {
                let _ = writeln!(
                    out,
                    "  {} -> {} [label=\"{edge}\"];",
                    node.index(),
                    target.index()
                );
            }
        }
        out.push_str("}\n");
        out
    }
}
