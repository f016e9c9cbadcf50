//! Live-store tracking.
//!
//! A backward bit-set analysis over local slots: a slot is *live* at a point
//! when some path from that point loads it before storing it again. A store
//! into a slot that is dead immediately afterwards never influences execution
//! - the classic dead-store defect. This is the engine's canonical bit-set
//! instantiation of the generic solver, alongside the frame-shaped analyses.

use std::fmt;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        dataflow::{union_join, DataflowAnalysis, DataflowResult, Direction, Location},
    },
    bytecode::{Instruction, MethodBody, Opcode, Operand},
    utils::{bitset::BitSet, graph::NodeId},
    Result,
};

/// The live-store dataflow analysis.
pub struct LiveStoreAnalysis {
    max_locals: u16,
}

impl LiveStoreAnalysis {
    /// Creates the analysis for a method body.
    #[must_use]
    pub fn new(body: &MethodBody) -> Self {
        Self {
            max_locals: body.max_locals,
        }
    }
}

impl DataflowAnalysis for LiveStoreAnalysis {
    type Fact = BitSet;
    const DIRECTION: Direction = Direction::Backward;

    fn name(&self) -> &'static str {
        "live store analysis"
    }

    fn boundary_fact(&mut self, _cfg: &ControlFlowGraph) -> Result<BitSet> {
        // Nothing is live at the method exit.
        Ok(BitSet::new(usize::from(self.max_locals)))
    }

    fn initial_fact(&mut self, _cfg: &ControlFlowGraph) -> BitSet {
        BitSet::new(usize::from(self.max_locals))
    }

    fn join_into(&mut self, fact: &BitSet, into: &mut BitSet, _at: NodeId) -> Result<bool> {
        // May-analysis: live on any successor path means live here.
        Ok(union_join(into, fact))
    }

    fn transfer_instruction(
        &mut self,
        _location: Location,
        instruction: &Instruction,
        fact: &mut BitSet,
    ) -> Result<()> {
        match (instruction.opcode, &instruction.operand) {
            (Opcode::Load, Operand::Local(slot)) => {
                let slot = usize::from(*slot);
                if slot < fact.capacity() {
                    fact.insert(slot);
                }
            }
            (Opcode::Store, Operand::Local(slot)) => {
                let slot = usize::from(*slot);
                if slot < fact.capacity() {
                    fact.remove(slot);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// The cacheable live-store result.
pub struct LiveStoreDataflow {
    dataflow: DataflowResult<BitSet>,
}

impl LiveStoreDataflow {
    /// Wraps a solved dataflow result.
    #[must_use]
    pub fn new(dataflow: DataflowResult<BitSet>) -> Self {
        Self { dataflow }
    }

    /// Returns the block-level dataflow result.
    #[must_use]
    pub fn dataflow(&self) -> &DataflowResult<BitSet> {
        &self.dataflow
    }

    /// Returns `true` if the store instruction at `location` is dead: the
    /// stored slot is not live after it.
    ///
    /// Non-store instructions report `false`.
    pub fn is_dead_store(&self, cfg: &ControlFlowGraph, location: Location) -> Result<bool> {
        let Some(block) = cfg.block(location.node) else {
            return Ok(false);
        };
        let Some(instruction) = block.instructions.get(location.index) else {
            return Ok(false);
        };
        let (Opcode::Store, Operand::Local(slot)) = (instruction.opcode, &instruction.operand)
        else {
            return Ok(false);
        };
        let slot = usize::from(*slot);

        let max_locals = self
            .dataflow
            .entry_fact(cfg.entry())
            .map_or(0, BitSet::capacity);
        let max_locals = u16::try_from(max_locals).unwrap_or(u16::MAX);

        // Backward analysis: the fact flowing into the store (in analysis
        // order) is the liveness *after* it in execution order.
        let mut analysis = LiveStoreAnalysis { max_locals };
        let Some(after) = self
            .dataflow
            .fact_before_instruction(&mut analysis, cfg, location)?
        else {
            return Ok(false);
        };
        Ok(slot < after.capacity() && !after.contains(slot))
    }
}

impl fmt::Debug for LiveStoreDataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveStoreDataflow")
            .field("nodes", &self.dataflow.node_count())
            .field("iterations", &self.dataflow.iterations())
            .finish()
    }
}
