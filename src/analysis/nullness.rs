//! Null-value tracking.
//!
//! Tracks, per frame slot, whether the held reference is definitely null,
//! definitely non-null, null on some path into this point, or unknown. The
//! taken and not-taken edges of `ifnull`/`ifnonnull` refine every slot holding
//! the tested value, which is where the dependency on value numbering comes
//! in: the numbering says *which* slots hold that value.

use std::fmt;
use std::sync::Arc;

use crate::{
    analysis::{
        cfg::{CfgEdge, CfgEdgeKind, ControlFlowGraph},
        dataflow::{
            DataflowAnalysis, DataflowResult, Direction, Frame, JoinSemiLattice, Location,
        },
        vna::ValueNumbering,
    },
    bytecode::{Instruction, MethodBody, Opcode, Operand},
    utils::graph::NodeId,
    Error, Result,
};

/// Abstract nullness of one reference slot.
///
/// Lattice order: `Null` and `NonNull` sit at the bottom, `Unknown` above
/// `NonNull`, and `NullOnSomePath` at the top; joins move upward. Primitive
/// slots ride along as [`Nullness::NonNull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nullness {
    /// Definitely the null reference on every path.
    Null,
    /// Definitely not null on every path.
    NonNull,
    /// Nothing is known about this value.
    Unknown,
    /// Null on at least one path into this point - the state defect
    /// detectors care about most.
    NullOnSomePath,
}

impl Nullness {
    /// Joins two nullness values, moving up the lattice.
    #[must_use]
    pub fn join(self, other: Nullness) -> Nullness {
        use Nullness::{NonNull, Null, NullOnSomePath, Unknown};
        match (self, other) {
            (a, b) if a == b => a,
            (Null, NonNull) | (NonNull, Null) => NullOnSomePath,
            (Null, Unknown) | (Unknown, Null) => NullOnSomePath,
            (NullOnSomePath, _) | (_, NullOnSomePath) => NullOnSomePath,
            (Unknown, NonNull) | (NonNull, Unknown) => Unknown,
            _ => NullOnSomePath,
        }
    }

    /// Returns `true` if the value may be null at this point.
    #[must_use]
    pub fn may_be_null(self) -> bool {
        matches!(
            self,
            Nullness::Null | Nullness::NullOnSomePath | Nullness::Unknown
        )
    }

    /// Returns `true` if the value is null on every or some path.
    #[must_use]
    pub fn is_definitely_or_partially_null(self) -> bool {
        matches!(self, Nullness::Null | Nullness::NullOnSomePath)
    }
}

impl JoinSemiLattice for Nullness {
    fn join_with(&mut self, other: &Self) -> bool {
        let joined = self.join(*other);
        let changed = joined != *self;
        *self = joined;
        changed
    }
}

/// The nullness dataflow analysis.
///
/// Depends on the method's [`ValueNumbering`] (resolved through the analysis
/// cache, never constructed here) for edge refinement.
pub struct NullnessAnalysis {
    vna: Arc<ValueNumbering>,
    cfg: Arc<ControlFlowGraph>,
    max_locals: u16,
}

impl NullnessAnalysis {
    /// Creates the analysis from its cache-resolved dependencies.
    #[must_use]
    pub fn new(body: &MethodBody, cfg: Arc<ControlFlowGraph>, vna: Arc<ValueNumbering>) -> Self {
        Self {
            vna,
            cfg,
            max_locals: body.max_locals,
        }
    }

    fn underflow(&self, location: Location) -> Error {
        Error::GraphError(format!(
            "operand stack underflow at {location:?} during nullness analysis"
        ))
    }

    /// Rewrites every slot of `fact` holding `tested` to `refined`.
    fn refine_slots(
        &self,
        source: NodeId,
        fact: &mut Frame<Nullness>,
        refined: Nullness,
    ) -> Result<()> {
        let Some(block) = self.cfg.block(source) else {
            return Ok(());
        };
        if block.instructions.is_empty() {
            return Ok(());
        }
        let last_index = block.instructions.len() - 1;
        let location = Location {
            node: source,
            index: last_index,
        };
        let Some(tested) = self.vna.value_before(&self.cfg, location, 0)? else {
            return Ok(());
        };
        let Some(exit_numbers) = self.vna.dataflow().exit_fact(source) else {
            return Ok(());
        };
        if exit_numbers.is_top() {
            return Ok(());
        }

        for slot in 0..fact.num_locals() {
            let slot = u16::try_from(slot).unwrap_or(u16::MAX);
            if exit_numbers.local(slot) == Some(tested) {
                fact.set_local(slot, refined);
            }
        }
        for index in 0..fact.stack_depth() {
            if exit_numbers.frame().stack_at(index) == Some(&tested) {
                fact.set_stack(index, refined);
            }
        }
        Ok(())
    }
}

impl DataflowAnalysis for NullnessAnalysis {
    type Fact = Frame<Nullness>;
    const DIRECTION: Direction = Direction::Forward;

    fn name(&self) -> &'static str {
        "null value analysis"
    }

    fn boundary_fact(&mut self, _cfg: &ControlFlowGraph) -> Result<Frame<Nullness>> {
        // Arguments may be anything the caller passed; other locals are not
        // yet written and never observed. Unknown is safe for both.
        Ok(Frame::new(usize::from(self.max_locals), Nullness::Unknown))
    }

    fn initial_fact(&mut self, _cfg: &ControlFlowGraph) -> Frame<Nullness> {
        Frame::top()
    }

    fn join_into(
        &mut self,
        fact: &Frame<Nullness>,
        into: &mut Frame<Nullness>,
        _at: NodeId,
    ) -> Result<bool> {
        into.join_with(fact, Nullness::join_with)
            .map_err(Error::GraphError)
    }

    fn transfer_instruction(
        &mut self,
        location: Location,
        instruction: &Instruction,
        fact: &mut Frame<Nullness>,
    ) -> Result<()> {
        if fact.is_top() {
            return Ok(());
        }
        match instruction.opcode {
            Opcode::ConstNull => fact.push(Nullness::Null),
            Opcode::PushInt => fact.push(Nullness::NonNull),
            Opcode::New => fact.push(Nullness::NonNull),
            Opcode::Load => {
                let Operand::Local(slot) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let value = fact.local(slot).copied().unwrap_or(Nullness::Unknown);
                fact.push(value);
            }
            Opcode::Store => {
                let Operand::Local(slot) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let value = fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.set_local(slot, value);
            }
            Opcode::Dup => {
                let top = *fact.peek(0).ok_or_else(|| self.underflow(location))?;
                fact.push(top);
            }
            Opcode::Swap => {
                let a = fact.pop().ok_or_else(|| self.underflow(location))?;
                let b = fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.push(a);
                fact.push(b);
            }
            Opcode::GetField => {
                // The successful load proves the receiver was non-null; the
                // pushed value itself is unknown.
                fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.push(Nullness::Unknown);
            }
            Opcode::GetStatic => fact.push(Nullness::Unknown),
            Opcode::CheckCast => {
                // Cast preserves the reference and its nullness.
            }
            Opcode::InstanceOf => {
                fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.push(Nullness::NonNull);
            }
            Opcode::InvokeStatic | Opcode::InvokeVirtual => {
                let Operand::Method(ref callee) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                for _ in 0..callee.arg_slots {
                    fact.pop().ok_or_else(|| self.underflow(location))?;
                }
                if callee.returns_value {
                    fact.push(Nullness::Unknown);
                }
            }
            _ => {
                // Everything else follows its declared stack behavior with
                // Unknown results.
                let behavior = instruction.stack_behavior();
                for _ in 0..behavior.pops {
                    fact.pop().ok_or_else(|| self.underflow(location))?;
                }
                for _ in 0..behavior.pushes {
                    fact.push(Nullness::Unknown);
                }
            }
        }
        Ok(())
    }

    fn transfer_edge(
        &mut self,
        source: NodeId,
        edge: &CfgEdge,
        fact: &mut Frame<Nullness>,
    ) -> Result<()> {
        if fact.is_top() {
            return Ok(());
        }
        let Some(block) = self.cfg.block(source) else {
            return Ok(());
        };
        let Some(last) = block.last_instruction() else {
            return Ok(());
        };
        let refined = match (last.opcode, &edge.kind) {
            (Opcode::IfNull, CfgEdgeKind::BranchTaken) => Nullness::Null,
            (Opcode::IfNull, CfgEdgeKind::BranchNotTaken) => Nullness::NonNull,
            (Opcode::IfNonNull, CfgEdgeKind::BranchTaken) => Nullness::NonNull,
            (Opcode::IfNonNull, CfgEdgeKind::BranchNotTaken) => Nullness::Null,
            _ => return Ok(()),
        };
        self.refine_slots(source, fact, refined)
    }
}

/// The cacheable nullness result.
pub struct NullnessDataflow {
    dataflow: DataflowResult<Frame<Nullness>>,
}

impl NullnessDataflow {
    /// Wraps a solved dataflow result.
    #[must_use]
    pub fn new(dataflow: DataflowResult<Frame<Nullness>>) -> Self {
        Self { dataflow }
    }

    /// Returns the block-level dataflow result.
    #[must_use]
    pub fn dataflow(&self) -> &DataflowResult<Frame<Nullness>> {
        &self.dataflow
    }

    /// Returns the nullness of a local slot at the entry of a node.
    #[must_use]
    pub fn local_at_entry(&self, node: NodeId, slot: u16) -> Option<Nullness> {
        self.dataflow.entry_fact(node)?.local(slot).copied()
    }
}

impl fmt::Debug for NullnessDataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NullnessDataflow")
            .field("nodes", &self.dataflow.node_count())
            .field("iterations", &self.dataflow.iterations())
            .finish()
    }
}
