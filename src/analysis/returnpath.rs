//! Return-path analysis.
//!
//! A backward analysis answering, for each point, whether execution can still
//! reach a *normal* return from there - as opposed to only leaving the method
//! by an uncaught exception. Detectors use this to tell "this branch always
//! throws" apart from ordinary control flow.

use std::fmt;

use crate::{
    analysis::{
        cfg::{CfgEdge, CfgEdgeKind, ControlFlowGraph},
        dataflow::{DataflowAnalysis, DataflowResult, Direction, JoinSemiLattice, Location},
    },
    bytecode::Instruction,
    utils::graph::NodeId,
    Result,
};

/// Whether a normal return is reachable from a program point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnPath {
    /// Join identity: no exit path analyzed yet.
    Unreached,
    /// Every analyzed exit path leaves by an uncaught exception.
    NoReturn,
    /// At least one path reaches a normal return.
    CanReturn,
}

impl ReturnPath {
    /// Joins two return-path facts (may-return semantics).
    #[must_use]
    pub fn join(self, other: ReturnPath) -> ReturnPath {
        use ReturnPath::{CanReturn, NoReturn, Unreached};
        match (self, other) {
            (Unreached, x) | (x, Unreached) => x,
            (CanReturn, _) | (_, CanReturn) => CanReturn,
            (NoReturn, NoReturn) => NoReturn,
        }
    }
}

impl JoinSemiLattice for ReturnPath {
    fn join_with(&mut self, other: &Self) -> bool {
        let joined = self.join(*other);
        let changed = joined != *self;
        *self = joined;
        changed
    }
}

/// The return-path dataflow analysis.
///
/// The fact carries no per-slot structure, so the whole analysis is edge
/// classification: `Return` edges into the exit inject "can return",
/// `Unhandled` edges inject "no return", and blocks pass facts through
/// unchanged.
pub struct ReturnPathAnalysis;

impl DataflowAnalysis for ReturnPathAnalysis {
    type Fact = ReturnPath;
    const DIRECTION: Direction = Direction::Backward;

    fn name(&self) -> &'static str {
        "return path analysis"
    }

    fn boundary_fact(&mut self, _cfg: &ControlFlowGraph) -> Result<ReturnPath> {
        // The exit node itself asserts nothing; the edges into it decide.
        Ok(ReturnPath::Unreached)
    }

    fn initial_fact(&mut self, _cfg: &ControlFlowGraph) -> ReturnPath {
        ReturnPath::Unreached
    }

    fn join_into(&mut self, fact: &ReturnPath, into: &mut ReturnPath, _at: NodeId) -> Result<bool> {
        Ok(into.join_with(fact))
    }

    fn transfer_instruction(
        &mut self,
        _location: Location,
        _instruction: &Instruction,
        _fact: &mut ReturnPath,
    ) -> Result<()> {
        Ok(())
    }

    fn transfer_edge(
        &mut self,
        _source: NodeId,
        edge: &CfgEdge,
        fact: &mut ReturnPath,
    ) -> Result<()> {
        match edge.kind {
            CfgEdgeKind::Return => *fact = ReturnPath::CanReturn,
            CfgEdgeKind::Unhandled => *fact = ReturnPath::NoReturn,
            _ => {}
        }
        Ok(())
    }
}

/// The cacheable return-path result.
pub struct ReturnPathDataflow {
    dataflow: DataflowResult<ReturnPath>,
}

impl ReturnPathDataflow {
    /// Wraps a solved dataflow result.
    #[must_use]
    pub fn new(dataflow: DataflowResult<ReturnPath>) -> Self {
        Self { dataflow }
    }

    /// Returns the block-level dataflow result.
    #[must_use]
    pub fn dataflow(&self) -> &DataflowResult<ReturnPath> {
        &self.dataflow
    }

    /// Returns `true` if a normal return is reachable from the entry of the
    /// given node.
    #[must_use]
    pub fn can_return_from(&self, node: NodeId) -> bool {
        matches!(self.dataflow.entry_fact(node), Some(ReturnPath::CanReturn))
    }
}

impl fmt::Debug for ReturnPathDataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReturnPathDataflow")
            .field("nodes", &self.dataflow.node_count())
            .field("iterations", &self.dataflow.iterations())
            .finish()
    }
}
