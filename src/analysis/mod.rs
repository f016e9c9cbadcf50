//! The analysis layer: CFG construction, the generic dataflow framework, and
//! the concrete analyses built on top of it.
//!
//! # Architecture
//!
//! - [`cfg`] turns decoded method bodies into immutable control flow graphs.
//! - [`dataflow`] is the generic fixed-point machinery: lattice facts, frames,
//!   the [`DataflowAnalysis`](dataflow::DataflowAnalysis) trait and the
//!   worklist solver.
//! - The remaining modules are concrete analyses, each a thin (lattice,
//!   transfer) pair plugged into the solver. Analyses that need other
//!   analyses' *results* receive them pre-resolved from the analysis cache;
//!   no analysis constructs another.
//!
//! # Result Types
//!
//! Every type re-exported here is a cacheable analysis result: immutable
//! after construction, shared behind `Arc` by the cache, safe to query from
//! parallel method workers.

pub mod cfg;
pub mod constants;
pub mod dataflow;
pub mod dominators;
pub mod livestore;
pub mod locks;
pub mod nullness;
pub mod orders;
pub mod returnpath;
pub mod typeflow;
pub mod vna;

pub use cfg::{BasicBlock, CfgBuilder, CfgEdge, CfgEdgeKind, ControlFlowGraph};
pub use constants::{ConstantAnalysis, ConstantDataflow, ConstantFact};
pub use dataflow::{
    DataflowAnalysis, DataflowResult, DataflowSolver, Direction, Frame, Location,
};
pub use dominators::{Dominators, Postdominators};
pub use livestore::{LiveStoreAnalysis, LiveStoreDataflow};
pub use locks::{LockAnalysis, LockDataflow, LockSet};
pub use nullness::{Nullness, NullnessAnalysis, NullnessDataflow};
pub use orders::{DepthFirstOrder, DepthFirstSearch, DfsEdgeKind, ReverseDepthFirstSearch};
pub use returnpath::{ReturnPath, ReturnPathAnalysis, ReturnPathDataflow};
pub use typeflow::{TypeAnalysis, TypeDataflow, TypeFact};
pub use vna::{ValueFrame, ValueNumber, ValueNumberAnalysis, ValueNumbering};
