//! Dominator and postdominator analyses as cacheable results.
//!
//! Thin wrappers around the shared dominator-tree computation, registered with
//! the analysis cache so every consumer of dominance information for a method
//! shares one computation.

use crate::{
    analysis::cfg::ControlFlowGraph,
    utils::graph::{
        algorithms::{compute_dominators, DominatorTree},
        NodeId, TraversalDirection,
    },
};

/// Dominator tree of a method's CFG, rooted at the entry node.
#[derive(Debug, Clone)]
pub struct Dominators {
    tree: DominatorTree,
}

impl Dominators {
    /// Computes the dominator tree for the given CFG.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        Self {
            tree: compute_dominators(cfg.graph(), cfg.entry(), TraversalDirection::Forward),
        }
    }

    /// Returns `true` if `a` dominates `b` (reflexively).
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.tree.dominates(a, b)
    }

    /// Returns the immediate dominator of a node.
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.tree.immediate_dominator(node)
    }

    /// Returns the underlying tree.
    #[must_use]
    pub fn tree(&self) -> &DominatorTree {
        &self.tree
    }
}

/// Postdominator tree of a method's CFG, rooted at the synthetic exit.
///
/// A node postdominates another when every path from the other to the method
/// exit passes through it; detectors use this to recognize unconditional
/// consequences of a decision.
#[derive(Debug, Clone)]
pub struct Postdominators {
    tree: DominatorTree,
}

impl Postdominators {
    /// Computes the postdominator tree for the given CFG.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        Self {
            tree: compute_dominators(cfg.graph(), cfg.exit(), TraversalDirection::Backward),
        }
    }

    /// Returns `true` if `a` postdominates `b` (reflexively).
    #[must_use]
    pub fn postdominates(&self, a: NodeId, b: NodeId) -> bool {
        self.tree.dominates(a, b)
    }

    /// Returns the immediate postdominator of a node.
    #[must_use]
    pub fn immediate_postdominator(&self, node: NodeId) -> Option<NodeId> {
        self.tree.immediate_dominator(node)
    }

    /// Returns the underlying tree.
    #[must_use]
    pub fn tree(&self) -> &DominatorTree {
        &self.tree
    }
}
