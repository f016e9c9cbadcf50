//! Dominator tree computation.
//!
//! Uses the iterative algorithm of Cooper, Harvey and Kennedy: process nodes in
//! reverse postorder, intersecting the candidate dominator paths of processed
//! predecessors, until the immediate-dominator table stabilizes. On the CFGs
//! this engine sees (a few hundred blocks) the simple iterative scheme is as
//! fast as Lengauer-Tarjan and considerably harder to get wrong.
//!
//! Running the computation with
//! [`TraversalDirection::Backward`](crate::utils::graph::TraversalDirection)
//! from the exit node yields the postdominator tree.

use crate::utils::graph::{
    algorithms::reverse_postorder, DirectedGraph, NodeId, TraversalDirection,
};

/// An immediate-dominator tree over the nodes reachable from a root.
///
/// Unreachable nodes have no dominator entry; [`dominates`](Self::dominates)
/// reports `false` for them.
#[derive(Debug, Clone)]
pub struct DominatorTree {
    root: NodeId,
    /// Immediate dominator per node index; the root maps to itself,
    /// unreachable nodes to `None`.
    idom: Vec<Option<NodeId>>,
}

impl DominatorTree {
    /// Returns the root of the tree.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the immediate dominator of `node`.
    ///
    /// `None` for the root itself and for nodes unreachable from the root.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.root {
            return None;
        }
        self.idom.get(node.index()).copied().flatten()
    }

    /// Returns `true` if `a` dominates `b` (reflexively).
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if self.idom.get(b.index()).copied().flatten().is_none() && b != self.root {
            return false;
        }
        let mut current = b;
        loop {
            if current == a {
                return true;
            }
            if current == self.root {
                return false;
            }
            match self.idom.get(current.index()).copied().flatten() {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Returns `true` if `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the chain of dominators of `node`, from the node itself up to
    /// the root.
    #[must_use]
    pub fn dominator_chain(&self, node: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = node;
        loop {
            chain.push(current);
            if current == self.root {
                break;
            }
            match self.idom.get(current.index()).copied().flatten() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        chain
    }
}

/// Computes the dominator tree of the nodes reachable from `root`.
///
/// With [`TraversalDirection::Forward`] this is the classic dominator tree;
/// with [`TraversalDirection::Backward`] and the exit node as `root` it is the
/// postdominator tree.
#[must_use]
pub fn compute_dominators<N, E>(
    graph: &DirectedGraph<N, E>,
    root: NodeId,
    direction: TraversalDirection,
) -> DominatorTree {
    let rpo = reverse_postorder(graph, root, direction);
    let mut rpo_position = vec![usize::MAX; graph.node_count()];
    for (position, node) in rpo.iter().enumerate() {
        rpo_position[node.index()] = position;
    }

    let joining = match direction {
        TraversalDirection::Forward => TraversalDirection::Backward,
        TraversalDirection::Backward => TraversalDirection::Forward,
    };

    let mut idom: Vec<Option<NodeId>> = vec![None; graph.node_count()];
    idom[root.index()] = Some(root);

    let mut changed = true;
    while changed {
        changed = false;
        for &node in rpo.iter().skip(1) {
            // First processed predecessor seeds the intersection.
            let mut new_idom: Option<NodeId> = None;
            for pred in graph.neighbors(node, joining) {
                if idom[pred.index()].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pred,
                    Some(current) => intersect(&idom, &rpo_position, pred, current),
                });
            }
            if new_idom != idom[node.index()] && new_idom.is_some() {
                idom[node.index()] = new_idom;
                changed = true;
            }
        }
    }

    // The root points at itself during iteration; strip that for the public view.
    idom[root.index()] = None;
    DominatorTree { root, idom }
}

/// Walks two dominator paths upward until they meet.
fn intersect(
    idom: &[Option<NodeId>],
    rpo_position: &[usize],
    a: NodeId,
    b: NodeId,
) -> NodeId {
    let mut finger_a = a;
    let mut finger_b = b;
    while finger_a != finger_b {
        while rpo_position[finger_a.index()] > rpo_position[finger_b.index()] {
            finger_a = idom[finger_a.index()].unwrap_or(finger_a);
        }
        while rpo_position[finger_b.index()] > rpo_position[finger_a.index()] {
            finger_b = idom[finger_b.index()].unwrap_or(finger_b);
        }
    }
    finger_a
}

#[cfg(test)]
mod tests {
    use super::*;

    /// entry -> then -> join, entry -> else -> join.
    fn diamond() -> DirectedGraph<(), ()> {
        let mut graph = DirectedGraph::new();
        let entry = graph.add_node(());
        let then = graph.add_node(());
        let els = graph.add_node(());
        let join = graph.add_node(());
        graph.add_edge(entry, then, ()).unwrap();
        graph.add_edge(entry, els, ()).unwrap();
        graph.add_edge(then, join, ()).unwrap();
        graph.add_edge(els, join, ()).unwrap();
        graph
    }

    #[test]
    fn test_diamond_dominators() {
        let graph = diamond();
        let tree = compute_dominators(&graph, NodeId::new(0), TraversalDirection::Forward);
        let entry = NodeId::new(0);
        let join = NodeId::new(3);

        assert_eq!(tree.immediate_dominator(join), Some(entry));
        assert!(tree.dominates(entry, join));
        assert!(!tree.dominates(NodeId::new(1), join));
        assert!(tree.strictly_dominates(entry, join));
        assert!(!tree.strictly_dominates(entry, entry));
    }

    #[test]
    fn test_postdominators_via_backward() {
        let graph = diamond();
        let tree = compute_dominators(&graph, NodeId::new(3), TraversalDirection::Backward);
        // The join node postdominates both branches and the entry.
        for idx in 0..3 {
            assert!(tree.dominates(NodeId::new(3), NodeId::new(idx)));
        }
        assert_eq!(tree.immediate_dominator(NodeId::new(0)), Some(NodeId::new(3)));
    }

    #[test]
    fn test_unreachable_node_not_dominated() {
        let mut graph = diamond();
        let isolated = graph.add_node(());
        let tree = compute_dominators(&graph, NodeId::new(0), TraversalDirection::Forward);
        assert!(!tree.dominates(NodeId::new(0), isolated));
        assert_eq!(tree.immediate_dominator(isolated), None);
    }

    #[test]
    fn test_loop_dominators() {
        // entry -> header -> body -> header, header -> exit.
        let mut graph = DirectedGraph::new();
        let entry = graph.add_node(());
        let header = graph.add_node(());
        let body = graph.add_node(());
        let exit = graph.add_node(());
        graph.add_edge(entry, header, ()).unwrap();
        graph.add_edge(header, body, ()).unwrap();
        graph.add_edge(body, header, ()).unwrap();
        graph.add_edge(header, exit, ()).unwrap();

        let tree = compute_dominators(&graph, entry, TraversalDirection::Forward);
        assert_eq!(tree.immediate_dominator(body), Some(header));
        assert_eq!(tree.immediate_dominator(exit), Some(header));
        assert!(tree.dominates(header, exit));
    }
}
