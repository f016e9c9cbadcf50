//! The dataflow analysis trait and result types.
//!
//! Any concrete analysis implements [`DataflowAnalysis`]: it names its fact
//! type, its direction, its boundary and interior initial facts, its join, and
//! its per-instruction transfer function. The worklist solver in
//! [`super::solver`] does the rest and is shared, unmodified, by every
//! analysis in the engine - bit-set facts and structured frame facts alike.

use std::fmt::Debug;

use crate::{
    analysis::cfg::{BasicBlock, CfgEdge, ControlFlowGraph},
    bytecode::Instruction,
    utils::graph::NodeId,
    Result,
};

/// Direction of a dataflow analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Facts flow from entry to exit; a node's entry fact joins its
    /// predecessors' exit facts. Examples: value numbering, nullness,
    /// constant propagation.
    Forward,
    /// Facts flow from exit to entry; a node's exit fact joins its
    /// successors' entry facts. Examples: live stores, return paths.
    Backward,
}

/// A program point inside a CFG: a node plus an instruction index within it.
///
/// Transfer functions receive their location so analyses can key per-site
/// tables (value numbering's merge numbers, lock acquisition sites) without
/// threading extra state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Location {
    /// The CFG node.
    pub node: NodeId,
    /// Index of the instruction within the node's block.
    pub index: usize,
}

/// A dataflow analysis: a lattice of facts plus transfer functions.
///
/// # Contract
///
/// For the fixed-point iteration to terminate, `join_into` must be monotone
/// (joining can only move a fact up the lattice) and `transfer_instruction`
/// must be monotone in its input fact. The solver enforces a generous
/// iteration bound and converts violations into the fatal
/// [`Error::Convergence`](crate::Error::Convergence).
///
/// Methods take `&mut self` because several analyses maintain interning
/// tables (value numbering hash-conses expressions and merge numbers) that
/// grow during iteration; the tables must be keyed so that re-computation is
/// idempotent, or monotonicity breaks.
pub trait DataflowAnalysis {
    /// The fact type attached to node entries and exits.
    type Fact: Clone + PartialEq + Debug + Send + Sync;

    /// Direction of this analysis.
    const DIRECTION: Direction;

    /// Diagnostic name, used in error values and convergence reports.
    fn name(&self) -> &'static str;

    /// The fact at the analysis boundary: the entry node for forward
    /// analyses, the synthetic exit for backward ones.
    fn boundary_fact(&mut self, cfg: &ControlFlowGraph) -> Result<Self::Fact>;

    /// The initial fact for interior nodes - the identity of the join
    /// ("no path reaches here yet").
    fn initial_fact(&mut self, cfg: &ControlFlowGraph) -> Self::Fact;

    /// Joins `fact` into `into` at the given merge node; returns `true` if
    /// `into` changed.
    ///
    /// The merge node identifies the join point: analyses that synthesize
    /// fresh abstract values at merges (value numbering's merge numbers) key
    /// them by `(node, slot)` so repeated joins are idempotent.
    fn join_into(&mut self, fact: &Self::Fact, into: &mut Self::Fact, at: NodeId)
        -> Result<bool>;

    /// Applies one instruction's effect to `fact` in place.
    fn transfer_instruction(
        &mut self,
        location: Location,
        instruction: &Instruction,
        fact: &mut Self::Fact,
    ) -> Result<()>;

    /// Applies a whole block's effect to `fact` in place.
    ///
    /// The default iterates the block's instructions in execution order for
    /// forward analyses and in reverse for backward ones; analyses with
    /// block-level shortcuts may override it.
    fn transfer_block(
        &mut self,
        node: NodeId,
        block: &BasicBlock,
        fact: &mut Self::Fact,
    ) -> Result<()> {
        match Self::DIRECTION {
            Direction::Forward => {
                for (index, instruction) in block.instructions.iter().enumerate() {
                    self.transfer_instruction(Location { node, index }, instruction, fact)?;
                }
            }
            Direction::Backward => {
                for (index, instruction) in block.instructions.iter().enumerate().rev() {
                    self.transfer_instruction(Location { node, index }, instruction, fact)?;
                }
            }
        }
        Ok(())
    }

    /// Refines a fact as it flows along a specific edge.
    ///
    /// Called on the copy of the fact contributed to the join at the edge's
    /// far end; `source` is the block the edge leaves, whose terminating
    /// instruction decided the outcome. The default is the identity; nullness
    /// uses this hook to sharpen facts on the taken / not-taken edges of null
    /// tests, and return-path uses it to distinguish normal from exceptional
    /// exits.
    fn transfer_edge(
        &mut self,
        source: NodeId,
        edge: &CfgEdge,
        fact: &mut Self::Fact,
    ) -> Result<()> {
        let _ = (source, edge, fact);
        Ok(())
    }
}

/// The immutable result of running one analysis over one CFG.
///
/// Owns a fact per node entry and exit plus the solver's iteration count.
/// Never mutated after the solver publishes it; the analysis cache shares it
/// behind an `Arc`.
#[derive(Debug, Clone)]
pub struct DataflowResult<F> {
    entry_facts: Vec<F>,
    exit_facts: Vec<F>,
    iterations: usize,
}

impl<F> DataflowResult<F> {
    pub(crate) fn new(entry_facts: Vec<F>, exit_facts: Vec<F>, iterations: usize) -> Self {
        Self {
            entry_facts,
            exit_facts,
            iterations,
        }
    }

    /// Returns the fact at the entry of a node.
    #[must_use]
    pub fn entry_fact(&self, node: NodeId) -> Option<&F> {
        self.entry_facts.get(node.index())
    }

    /// Returns the fact at the exit of a node.
    #[must_use]
    pub fn exit_fact(&self, node: NodeId) -> Option<&F> {
        self.exit_facts.get(node.index())
    }

    /// Returns the number of node visits the solver performed before
    /// reaching the fixed point. Exposed for diagnostics and tests.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns the number of nodes covered by this result.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.entry_facts.len()
    }
}

impl<F: Clone + PartialEq + Debug + Send + Sync> DataflowResult<F> {
    /// Recomputes the fact immediately *before* the instruction at `location`
    /// by replaying the block's transfers from its entry fact.
    ///
    /// Facts are stored per block boundary; per-instruction queries replay the
    /// prefix of the block, which is cheap for the block sizes real methods
    /// produce and keeps the stored result compact.
    ///
    /// For backward analyses the returned fact is the one *after* the
    /// instruction in execution order (the fact flowing into it analysis-wise).
    pub fn fact_before_instruction<A>(
        &self,
        analysis: &mut A,
        cfg: &ControlFlowGraph,
        location: Location,
    ) -> Result<Option<F>>
    where
        A: DataflowAnalysis<Fact = F>,
    {
        let Some(block) = cfg.block(location.node) else {
            return Ok(None);
        };
        if location.index >= block.instructions.len() {
            return Ok(None);
        }
        match A::DIRECTION {
            Direction::Forward => {
                let Some(entry) = self.entry_fact(location.node) else {
                    return Ok(None);
                };
                let mut fact = entry.clone();
                for (index, instruction) in
                    block.instructions.iter().enumerate().take(location.index)
                {
                    analysis.transfer_instruction(
                        Location {
                            node: location.node,
                            index,
                        },
                        instruction,
                        &mut fact,
                    )?;
                }
                Ok(Some(fact))
            }
            Direction::Backward => {
                let Some(exit) = self.exit_fact(location.node) else {
                    return Ok(None);
                };
                let mut fact = exit.clone();
                for (index, instruction) in block
                    .instructions
                    .iter()
                    .enumerate()
                    .skip(location.index + 1)
                    .rev()
                {
                    analysis.transfer_instruction(
                        Location {
                            node: location.node,
                            index,
                        },
                        instruction,
                        &mut fact,
                    )?;
                }
                Ok(Some(fact))
            }
        }
    }
}
