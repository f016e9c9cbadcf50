//! Graph algorithms shared by the control flow layer.
//!
//! All algorithms are direction-generic: running them with
//! [`TraversalDirection::Backward`](crate::utils::graph::TraversalDirection)
//! is equivalent to running them on the reversed graph, which is how
//! postdominators and reverse depth-first orders are computed.

mod dominators;
mod traversal;

pub use dominators::{compute_dominators, DominatorTree};
pub use traversal::{postorder, reachable_from, reverse_postorder};
