//! Control flow graph construction and queries.
//!
//! # Architecture
//!
//! The CFG wraps the generic [`crate::utils::graph::DirectedGraph`] substrate
//! with bytecode-specific node and edge types, and leans on the shared
//! traversal and dominator algorithms for everything order-related.
//!
//! # Key Components
//!
//! - [`CfgBuilder`] - splits a decoded instruction stream into basic blocks
//!   and wires typed edges, including exception edges derived from the
//!   handler table
//! - [`ControlFlowGraph`] - the immutable graph owned by the analysis cache
//! - [`BasicBlock`] - an ordered, non-branching instruction run
//! - [`CfgEdge`] / [`CfgEdgeKind`] - edge classification (fall-through,
//!   branches, switch dispatch, exception, return, unhandled exit)
//!
//! # Shape Invariants
//!
//! One entry node, one synthetic exit node. Return edges and uncaught
//! exceptional exits both lead to the exit node, giving backward analyses a
//! single boundary. Unreachable blocks are kept and flagged dead rather than
//! rejected.
//!
//! # Lazy Computation
//!
//! Dominator and postdominator trees are computed on first access and cached
//! behind [`std::sync::OnceLock`], so a CFG shared through the analysis cache
//! is safe to query from parallel method workers.

mod block;
mod builder;
mod edge;
mod graph;

pub use block::BasicBlock;
pub use builder::CfgBuilder;
pub use edge::{CfgEdge, CfgEdgeKind};
pub use graph::ControlFlowGraph;
