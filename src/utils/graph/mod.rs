//! Directed graph substrate shared by the control flow layer.
//!
//! [`DirectedGraph`] is a compact adjacency-list graph with typed node and edge
//! payloads and strongly-typed [`NodeId`]/[`EdgeId`] indices. The control flow
//! graph wraps it with bytecode-specific node and edge types; the traversal and
//! dominator algorithms in [`algorithms`] work against it in either direction,
//! which is how postdominators and reverse depth-first orders are obtained
//! without materializing a reversed graph.

pub mod algorithms;

use std::fmt;

use crate::{Error, Result};

/// A strongly-typed index identifying a node within one [`DirectedGraph`].
///
/// Ids are dense, assigned sequentially from 0 by
/// [`DirectedGraph::add_node`], and valid only for the graph that produced
/// them. The newtype prevents mixing node indices with other integers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a node id from a raw index.
    ///
    /// Intended for internal use and tests; normal code receives ids from the
    /// graph.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index, usable for indexing per-node side tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// A strongly-typed index identifying an edge within one [`DirectedGraph`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Creates an edge id from a raw index.
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        EdgeId(index)
    }

    /// Returns the raw index, usable for indexing per-edge side tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

/// Traversal direction for algorithms that can run with or against the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalDirection {
    /// Follow edges from source to target.
    Forward,
    /// Follow edges from target to source.
    Backward,
}

struct EdgeEntry<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// A directed graph with node payloads of type `N` and edge payloads of type `E`.
///
/// Nodes and edges are stored in insertion order; both adjacency directions are
/// indexed so predecessor queries are as cheap as successor queries - backward
/// dataflow iterates predecessors constantly.
///
/// # Thread Safety
///
/// The graph is immutable after construction by convention (the CFG builder is
/// the only writer) and is [`Send`]/[`Sync`] when the payloads are.
pub struct DirectedGraph<N, E> {
    nodes: Vec<N>,
    edges: Vec<EdgeEntry<E>>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl<N, E> Default for DirectedGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, E> DirectedGraph<N, E> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    /// Creates an empty graph with pre-allocated capacity.
    #[must_use]
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(node_capacity),
            edges: Vec::with_capacity(edge_capacity),
            outgoing: Vec::with_capacity(node_capacity),
            incoming: Vec::with_capacity(node_capacity),
        }
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, data: N) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(data);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    /// Adds a directed edge and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint does not exist.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> Result<EdgeId> {
        if source.0 >= self.nodes.len() || target.0 >= self.nodes.len() {
            return Err(Error::GraphError(format!(
                "edge {source} -> {target} references a missing node (graph has {} nodes)",
                self.nodes.len()
            )));
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(EdgeEntry {
            source,
            target,
            data,
        });
        self.outgoing[source.0].push(id);
        self.incoming[target.0].push(id);
        Ok(id)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the payload of a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.0)
    }

    /// Returns the payload of an edge.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&E> {
        self.edges.get(id.0).map(|e| &e.data)
    }

    /// Returns the (source, target) endpoints of an edge.
    #[must_use]
    pub fn endpoints(&self, id: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(id.0).map(|e| (e.source, e.target))
    }

    /// Iterates over all node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Iterates over the ids of edges leaving `node`.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.outgoing
            .get(node.0)
            .into_iter()
            .flatten()
            .copied()
    }

    /// Iterates over the ids of edges entering `node`.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.incoming
            .get(node.0)
            .into_iter()
            .flatten()
            .copied()
    }

    /// Iterates over the successor nodes of `node`.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing_edges(node).map(|e| self.edges[e.0].target)
    }

    /// Iterates over the predecessor nodes of `node`.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming_edges(node).map(|e| self.edges[e.0].source)
    }

    /// Iterates over the nodes adjacent to `node` in the given direction.
    ///
    /// `Forward` yields successors, `Backward` yields predecessors; the
    /// direction-generic algorithms are built on this.
    pub fn neighbors(
        &self,
        node: NodeId,
        direction: TraversalDirection,
    ) -> Box<dyn Iterator<Item = NodeId> + '_> {
        match direction {
            TraversalDirection::Forward => Box::new(self.successors(node)),
            TraversalDirection::Backward => Box::new(self.predecessors(node)),
        }
    }

    /// Returns the out-degree of `node`.
    #[must_use]
    pub fn out_degree(&self, node: NodeId) -> usize {
        self.outgoing.get(node.0).map_or(0, Vec::len)
    }

    /// Returns the in-degree of `node`.
    #[must_use]
    pub fn in_degree(&self, node: NodeId) -> usize {
        self.incoming.get(node.0).map_or(0, Vec::len)
    }
}

impl<N: fmt::Debug, E: fmt::Debug> fmt::Debug for DirectedGraph<N, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectedGraph")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> DirectedGraph<&'static str, u32> {
        let mut graph = DirectedGraph::new();
        let a = graph.add_node("a");
        let b = graph.add_node("b");
        let c = graph.add_node("c");
        let d = graph.add_node("d");
        graph.add_edge(a, b, 0).unwrap();
        graph.add_edge(a, c, 1).unwrap();
        graph.add_edge(b, d, 2).unwrap();
        graph.add_edge(c, d, 3).unwrap();
        graph
    }

    #[test]
    fn test_adjacency() {
        let graph = diamond();
        let a = NodeId::new(0);
        let d = NodeId::new(3);
        assert_eq!(graph.successors(a).count(), 2);
        assert_eq!(graph.predecessors(d).count(), 2);
        assert_eq!(graph.out_degree(d), 0);
        assert_eq!(graph.in_degree(a), 0);
    }

    #[test]
    fn test_edge_to_missing_node_rejected() {
        let mut graph: DirectedGraph<(), ()> = DirectedGraph::new();
        let a = graph.add_node(());
        assert!(graph.add_edge(a, NodeId::new(7), ()).is_err());
    }

    #[test]
    fn test_neighbors_direction() {
        let graph = diamond();
        let b = NodeId::new(1);
        let forward: Vec<_> = graph.neighbors(b, TraversalDirection::Forward).collect();
        let backward: Vec<_> = graph.neighbors(b, TraversalDirection::Backward).collect();
        assert_eq!(forward, vec![NodeId::new(3)]);
        assert_eq!(backward, vec![NodeId::new(0)]);
    }
}
