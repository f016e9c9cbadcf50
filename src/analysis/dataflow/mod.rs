//! Generic fixed-point dataflow framework.
//!
//! The framework separates three concerns:
//!
//! - **Facts** - lattice elements attached to node entries and exits.
//!   [`Frame`] covers the structured "locals + operand stack" shape the
//!   value-tracking analyses use; [`crate::utils::BitSet`] covers the
//!   set-shaped facts of reachability-style analyses.
//! - **Analyses** - implementations of [`DataflowAnalysis`]: direction,
//!   boundary/initial facts, join, per-instruction transfer, optional edge
//!   refinement.
//! - **Solving** - [`DataflowSolver`] runs any analysis to a fixed point with
//!   a worklist scheduled in (reverse) depth-first order, identical code for
//!   forward and backward analyses.
//!
//! Results are immutable [`DataflowResult`] values with per-node facts and the
//! iteration count for diagnostics.

mod frame;
mod framework;
mod lattice;
mod solver;

pub use frame::Frame;
pub use framework::{DataflowAnalysis, DataflowResult, Direction, Location};
pub use lattice::{intersect_join, union_join, JoinSemiLattice};
pub use solver::DataflowSolver;
