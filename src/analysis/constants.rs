//! Constant propagation.
//!
//! Tracks, per frame slot, whether the held integer is a single known
//! constant on every path. Arithmetic over known constants folds; any merge
//! of different values or any opaque producer drops to
//! [`ConstantFact::Varying`].

use std::fmt;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        dataflow::{
            DataflowAnalysis, DataflowResult, Direction, Frame, JoinSemiLattice, Location,
        },
    },
    bytecode::{Instruction, MethodBody, Opcode, Operand},
    utils::graph::NodeId,
    Error, Result,
};

/// Abstract constant value of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantFact {
    /// The slot holds this exact value on every path.
    Value(i64),
    /// The slot's value varies or is unknown.
    Varying,
}

impl ConstantFact {
    /// Joins two constant facts.
    #[must_use]
    pub fn join(self, other: ConstantFact) -> ConstantFact {
        match (self, other) {
            (ConstantFact::Value(a), ConstantFact::Value(b)) if a == b => ConstantFact::Value(a),
            _ => ConstantFact::Varying,
        }
    }

    /// Returns the known value, if any.
    #[must_use]
    pub fn value(self) -> Option<i64> {
        match self {
            ConstantFact::Value(v) => Some(v),
            ConstantFact::Varying => None,
        }
    }
}

impl JoinSemiLattice for ConstantFact {
    fn join_with(&mut self, other: &Self) -> bool {
        let joined = self.join(*other);
        let changed = joined != *self;
        *self = joined;
        changed
    }
}

impl fmt::Display for ConstantFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantFact::Value(v) => write!(f, "{v}"),
            ConstantFact::Varying => f.write_str("?"),
        }
    }
}

/// Folds one binary operator over two known constants.
///
/// Division and remainder by zero do not fold (the instruction raises
/// instead of producing a value).
fn fold(opcode: Opcode, a: i64, b: i64) -> Option<i64> {
    match opcode {
        Opcode::Add => Some(a.wrapping_add(b)),
        Opcode::Sub => Some(a.wrapping_sub(b)),
        Opcode::Mul => Some(a.wrapping_mul(b)),
        Opcode::Div => (b != 0).then(|| a.wrapping_div(b)),
        Opcode::Rem => (b != 0).then(|| a.wrapping_rem(b)),
        Opcode::And => Some(a & b),
        Opcode::Or => Some(a | b),
        Opcode::Xor => Some(a ^ b),
        _ => None,
    }
}

/// The constant propagation dataflow analysis.
pub struct ConstantAnalysis {
    max_locals: u16,
}

impl ConstantAnalysis {
    /// Creates the analysis for a method body.
    #[must_use]
    pub fn new(body: &MethodBody) -> Self {
        Self {
            max_locals: body.max_locals,
        }
    }

    fn underflow(&self, location: Location) -> Error {
        Error::GraphError(format!(
            "operand stack underflow at {location:?} during constant propagation"
        ))
    }
}

impl DataflowAnalysis for ConstantAnalysis {
    type Fact = Frame<ConstantFact>;
    const DIRECTION: Direction = Direction::Forward;

    fn name(&self) -> &'static str {
        "constant propagation"
    }

    fn boundary_fact(&mut self, _cfg: &ControlFlowGraph) -> Result<Frame<ConstantFact>> {
        Ok(Frame::new(
            usize::from(self.max_locals),
            ConstantFact::Varying,
        ))
    }

    fn initial_fact(&mut self, _cfg: &ControlFlowGraph) -> Frame<ConstantFact> {
        Frame::top()
    }

    fn join_into(
        &mut self,
        fact: &Frame<ConstantFact>,
        into: &mut Frame<ConstantFact>,
        _at: NodeId,
    ) -> Result<bool> {
        into.join_with(fact, ConstantFact::join_with)
            .map_err(Error::GraphError)
    }

    fn transfer_instruction(
        &mut self,
        location: Location,
        instruction: &Instruction,
        fact: &mut Frame<ConstantFact>,
    ) -> Result<()> {
        if fact.is_top() {
            return Ok(());
        }
        match instruction.opcode {
            Opcode::PushInt => {
                let Operand::Int(value) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                fact.push(ConstantFact::Value(value));
            }
            Opcode::Load => {
                let Operand::Local(slot) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let value = fact.local(slot).copied().unwrap_or(ConstantFact::Varying);
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
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => {
                let b = fact.pop().ok_or_else(|| self.underflow(location))?;
                let a = fact.pop().ok_or_else(|| self.underflow(location))?;
                let folded = match (a.value(), b.value()) {
                    (Some(a), Some(b)) => fold(instruction.opcode, a, b)
                        .map_or(ConstantFact::Varying, ConstantFact::Value),
                    _ => ConstantFact::Varying,
                };
                fact.push(folded);
            }
            Opcode::Neg => {
                let operand = fact.pop().ok_or_else(|| self.underflow(location))?;
                let folded = operand
                    .value()
                    .map_or(ConstantFact::Varying, |v| {
                        ConstantFact::Value(v.wrapping_neg())
                    });
                fact.push(folded);
            }
            _ => {
                let behavior = instruction.stack_behavior();
                for _ in 0..behavior.pops {
                    fact.pop().ok_or_else(|| self.underflow(location))?;
                }
                for _ in 0..behavior.pushes {
                    fact.push(ConstantFact::Varying);
                }
            }
        }
        Ok(())
    }
}

/// The cacheable constant propagation result.
pub struct ConstantDataflow {
    dataflow: DataflowResult<Frame<ConstantFact>>,
}

impl ConstantDataflow {
    /// Wraps a solved dataflow result.
    #[must_use]
    pub fn new(dataflow: DataflowResult<Frame<ConstantFact>>) -> Self {
        Self { dataflow }
    }

    /// Returns the block-level dataflow result.
    #[must_use]
    pub fn dataflow(&self) -> &DataflowResult<Frame<ConstantFact>> {
        &self.dataflow
    }
}

impl fmt::Debug for ConstantDataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantDataflow")
            .field("nodes", &self.dataflow.node_count())
            .field("iterations", &self.dataflow.iterations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{cfg::CfgBuilder, dataflow::DataflowSolver},
        bytecode::BodyAssembler,
        descriptor::{ClassDescriptor, MethodDescriptor},
    };

    fn method() -> MethodDescriptor {
        MethodDescriptor::new(&ClassDescriptor::new("pkg/Sample"), "m", "()V", true)
    }

    #[test]
    fn test_folding_through_locals() {
        // v0 = 6 * 7; exit fact has v0 = 42.
        let mut asm = BodyAssembler::new(0, 1);
        asm.emit_push_int(6);
        asm.emit_push_int(7);
        asm.emit(Opcode::Mul);
        asm.emit_store(0);
        asm.emit(Opcode::Return);
        let body = asm.finish().unwrap();
        let cfg = CfgBuilder::build(&method(), &body).unwrap();

        let mut analysis = ConstantAnalysis::new(&body);
        let result = DataflowSolver::execute(&cfg, &mut analysis, &method()).unwrap();
        let exit = result.exit_fact(cfg.entry()).unwrap();
        assert_eq!(exit.local(0), Some(&ConstantFact::Value(42)));
    }

    #[test]
    fn test_merge_of_distinct_values_varies() {
        let mut asm = BodyAssembler::new(1, 2);
        asm.emit_load(0);
        asm.emit_branch(Opcode::IfZero, "else");
        asm.emit_push_int(1);
        asm.emit_store(1);
        asm.emit_branch(Opcode::Goto, "join");
        asm.define_label("else").unwrap();
        asm.emit_push_int(2);
        asm.emit_store(1);
        asm.define_label("join").unwrap();
        asm.emit(Opcode::Return);
        let body = asm.finish().unwrap();
        let cfg = CfgBuilder::build(&method(), &body).unwrap();

        let mut analysis = ConstantAnalysis::new(&body);
        let result = DataflowSolver::execute(&cfg, &mut analysis, &method()).unwrap();
        let join = cfg
            .blocks()
            .find(|(_, b)| {
                b.first_instruction()
                    .is_some_and(|i| i.opcode == Opcode::Return)
            })
            .map(|(n, _)| n)
            .unwrap();
        let fact = result.entry_fact(join).unwrap();
        assert_eq!(fact.local(1), Some(&ConstantFact::Varying));
    }

    #[test]
    fn test_division_by_zero_does_not_fold() {
        assert_eq!(fold(Opcode::Div, 10, 0), None);
        assert_eq!(fold(Opcode::Div, 10, 2), Some(5));
        assert_eq!(fold(Opcode::Rem, 10, 3), Some(1));
    }
}
