//! Decoded instruction model for stack-machine method bodies.
//!
//! This is the boundary data model consumed from the external instruction
//! decoder: an ordered list of [`Instruction`] values with byte offsets. The
//! engine never parses binary input itself; it only interprets this structured
//! form.
//!
//! # Key Types
//! - [`Opcode`] - The neutral stack-machine operation set
//! - [`Operand`] - Instruction operands (locals, constants, targets, references)
//! - [`Instruction`] - One decoded instruction with offset and size
//! - [`FlowKind`] - How an instruction affects control flow
//! - [`StackBehavior`] - Net operand stack effect of an instruction

use std::fmt;

use strum::{Display, EnumCount};

use crate::descriptor::{ClassDescriptor, MethodDescriptor};

/// The neutral stack-machine operation set understood by the engine.
///
/// The set is deliberately small: enough to express loads and stores of local
/// slots, constants, arithmetic, comparisons and branches, multi-way dispatch,
/// calls, field access, object allocation, monitors and exception flow - the
/// shapes the concrete analyses reason about. The external decoder maps its
/// source instruction set onto these operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumCount)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    /// No operation.
    Nop,
    /// Push the null reference.
    ConstNull,
    /// Push an integer constant (operand: [`Operand::Int`]).
    PushInt,
    /// Push the value of a local slot (operand: [`Operand::Local`]).
    Load,
    /// Pop into a local slot (operand: [`Operand::Local`]).
    Store,
    /// Duplicate the top of stack.
    Dup,
    /// Discard the top of stack.
    Pop,
    /// Swap the two topmost values.
    Swap,
    /// Integer addition.
    Add,
    /// Integer subtraction.
    Sub,
    /// Integer multiplication.
    Mul,
    /// Integer division.
    Div,
    /// Integer remainder.
    Rem,
    /// Arithmetic negation.
    Neg,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Unconditional jump (operand: [`Operand::Branch`]).
    Goto,
    /// Branch if the popped reference is null.
    IfNull,
    /// Branch if the popped reference is non-null.
    IfNonNull,
    /// Branch if the popped integer is zero.
    IfZero,
    /// Branch if the popped integer is non-zero.
    IfNonZero,
    /// Branch if the two popped integers are equal.
    IfCmpEq,
    /// Branch if the two popped integers differ.
    IfCmpNe,
    /// Branch if the second popped integer is less than the first.
    IfCmpLt,
    /// Branch if the second popped integer is greater or equal.
    IfCmpGe,
    /// Multi-way dispatch on the popped integer (operand: [`Operand::Switch`]).
    Switch,
    /// Call a static method (operand: [`Operand::Method`]).
    InvokeStatic,
    /// Call an instance method through its receiver (operand: [`Operand::Method`]).
    InvokeVirtual,
    /// Return without a value.
    Return,
    /// Pop the return value and return it.
    ReturnValue,
    /// Pop a reference and raise it as an exception.
    Throw,
    /// Allocate an instance of a class (operand: [`Operand::Class`]).
    New,
    /// Narrowing reference cast; raises on mismatch (operand: [`Operand::Class`]).
    CheckCast,
    /// Type test pushing 0/1 (operand: [`Operand::Class`]).
    InstanceOf,
    /// Pop a receiver and push an instance field value (operand: [`Operand::Field`]).
    GetField,
    /// Pop a value and a receiver and write an instance field (operand: [`Operand::Field`]).
    PutField,
    /// Push a static field value (operand: [`Operand::Field`]).
    GetStatic,
    /// Pop a value and write a static field (operand: [`Operand::Field`]).
    PutStatic,
    /// Pop a reference and acquire its monitor.
    MonitorEnter,
    /// Pop a reference and release its monitor.
    MonitorExit,
}

/// How an instruction affects control flow.
///
/// This classification drives basic block splitting and edge creation in the
/// CFG builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// Execution continues at the next instruction.
    Sequential,
    /// Two-way branch: taken edge plus fall-through.
    ConditionalBranch,
    /// Always transfers to the branch target.
    UnconditionalBranch,
    /// Multi-way dispatch with explicit case targets and a default.
    Switch,
    /// Transfers to a callee and resumes at the next instruction.
    Call,
    /// Leaves the method normally.
    Return,
    /// Raises an exception.
    Throw,
}

impl Opcode {
    /// Returns how this operation affects control flow.
    #[must_use]
    pub fn flow(self) -> FlowKind {
        match self {
            Opcode::Goto => FlowKind::UnconditionalBranch,
            Opcode::IfNull
            | Opcode::IfNonNull
            | Opcode::IfZero
            | Opcode::IfNonZero
            | Opcode::IfCmpEq
            | Opcode::IfCmpNe
            | Opcode::IfCmpLt
            | Opcode::IfCmpGe => FlowKind::ConditionalBranch,
            Opcode::Switch => FlowKind::Switch,
            Opcode::InvokeStatic | Opcode::InvokeVirtual => FlowKind::Call,
            Opcode::Return | Opcode::ReturnValue => FlowKind::Return,
            Opcode::Throw => FlowKind::Throw,
            _ => FlowKind::Sequential,
        }
    }

    /// Returns `true` if this operation can raise an exception at runtime.
    ///
    /// Used by the CFG builder to decide which blocks need edges into covering
    /// exception handlers. The approximation is deliberately coarse (any call,
    /// allocation, field access, cast, monitor operation or division may
    /// raise), matching how handler edges are added conservatively.
    #[must_use]
    pub fn can_throw(self) -> bool {
        matches!(
            self,
            Opcode::Div
                | Opcode::Rem
                | Opcode::InvokeStatic
                | Opcode::InvokeVirtual
                | Opcode::Throw
                | Opcode::New
                | Opcode::CheckCast
                | Opcode::GetField
                | Opcode::PutField
                | Opcode::GetStatic
                | Opcode::PutStatic
                | Opcode::MonitorEnter
                | Opcode::MonitorExit
        )
    }
}

/// A method referenced by a call instruction.
///
/// Carries the callee identity plus the explicit stack-shape facts the engine
/// needs to simulate the call (the signature string on the descriptor stays
/// opaque).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Identity of the callee.
    pub method: MethodDescriptor,
    /// Number of argument slots popped, including the receiver for instance calls.
    pub arg_slots: u16,
    /// `true` if the call pushes a return value.
    pub returns_value: bool,
    /// Declared class of the returned reference, `None` for primitives or `void`.
    pub return_class: Option<ClassDescriptor>,
}

/// A field referenced by a field access instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Class declaring the field.
    pub class: ClassDescriptor,
    /// Field name.
    pub name: String,
    /// Declared class of the field value, `None` for primitive fields.
    pub value_class: Option<ClassDescriptor>,
}

/// Instruction operands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    /// No operand.
    None,
    /// A local variable slot index.
    Local(u16),
    /// An integer immediate.
    Int(i64),
    /// A branch target byte offset.
    Branch(u32),
    /// Switch dispatch table: case targets plus the default target.
    Switch {
        /// Byte offsets of the case targets, in case order.
        targets: Vec<u32>,
        /// Byte offset of the default target.
        default: u32,
    },
    /// A class reference.
    Class(ClassDescriptor),
    /// A method reference.
    Method(MethodRef),
    /// A field reference.
    Field(FieldRef),
}

/// Operand stack effect of an instruction.
///
/// Describes how many values the instruction pops and pushes; the concrete
/// analyses use this to keep their abstract frames in sync with the real
/// evaluation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of values popped.
    pub pops: u16,
    /// Number of values pushed.
    pub pushes: u16,
}

/// One decoded instruction: offset, encoded size, operation and operand.
///
/// Instructions are immutable once decoded. The `size` field preserves the
/// original encoding width so `offset + size` is the fall-through offset,
/// letting the CFG builder reason about real bytecode offsets without access
/// to the binary form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset of this instruction within the method body.
    pub offset: u32,
    /// Encoded size in bytes.
    pub size: u32,
    /// The operation.
    pub opcode: Opcode,
    /// The operand, if any.
    pub operand: Operand,
}

impl Instruction {
    /// Returns the byte offset of the next sequential instruction.
    #[must_use]
    pub fn next_offset(&self) -> u32 {
        self.offset + self.size
    }

    /// Returns how this instruction affects control flow.
    #[must_use]
    pub fn flow(&self) -> FlowKind {
        self.opcode.flow()
    }

    /// Returns all explicit branch targets of this instruction.
    ///
    /// Empty for non-branching instructions; for a switch this is every case
    /// target followed by the default.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<u32> {
        match &self.operand {
            Operand::Branch(target) => vec![*target],
            Operand::Switch { targets, default } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }

    /// Returns `true` if execution can continue at the next sequential instruction.
    #[must_use]
    pub fn can_fall_through(&self) -> bool {
        !matches!(
            self.flow(),
            FlowKind::UnconditionalBranch | FlowKind::Switch | FlowKind::Return | FlowKind::Throw
        )
    }

    /// Returns the operand stack effect of this instruction.
    #[must_use]
    pub fn stack_behavior(&self) -> StackBehavior {
        let (pops, pushes) = match self.opcode {
            Opcode::Nop | Opcode::Goto | Opcode::Return => (0, 0),
            Opcode::ConstNull | Opcode::PushInt | Opcode::Load | Opcode::GetStatic => (0, 1),
            Opcode::Store
            | Opcode::Pop
            | Opcode::IfNull
            | Opcode::IfNonNull
            | Opcode::IfZero
            | Opcode::IfNonZero
            | Opcode::Switch
            | Opcode::ReturnValue
            | Opcode::Throw
            | Opcode::PutStatic
            | Opcode::MonitorEnter
            | Opcode::MonitorExit => (1, 0),
            Opcode::Dup => (1, 2),
            Opcode::Swap => (2, 2),
            Opcode::Neg | Opcode::CheckCast | Opcode::InstanceOf | Opcode::GetField => (1, 1),
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => (2, 1),
            Opcode::IfCmpEq | Opcode::IfCmpNe | Opcode::IfCmpLt | Opcode::IfCmpGe => (2, 0),
            Opcode::PutField => (2, 0),
            Opcode::New => (0, 1),
            Opcode::InvokeStatic | Opcode::InvokeVirtual => {
                let Operand::Method(ref m) = self.operand else {
                    return StackBehavior { pops: 0, pushes: 0 };
                };
                (m.arg_slots, u16::from(m.returns_value))
            }
        };
        StackBehavior { pops, pushes }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Local(slot) => write!(f, " v{slot}"),
            Operand::Int(value) => write!(f, " {value}"),
            Operand::Branch(target) => write!(f, " -> {target:04x}"),
            Operand::Switch { targets, default } => {
                write!(f, " [{} cases, default -> {default:04x}]", targets.len())
            }
            Operand::Class(class) => write!(f, " {class}"),
            Operand::Method(m) => write!(f, " {}", m.method),
            Operand::Field(field) => write!(f, " {}.{}", field.class, field.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insn(opcode: Opcode, operand: Operand) -> Instruction {
        Instruction {
            offset: 0,
            size: 1,
            opcode,
            operand,
        }
    }

    #[test]
    fn test_flow_classification() {
        assert_eq!(Opcode::Add.flow(), FlowKind::Sequential);
        assert_eq!(Opcode::Goto.flow(), FlowKind::UnconditionalBranch);
        assert_eq!(Opcode::IfNull.flow(), FlowKind::ConditionalBranch);
        assert_eq!(Opcode::Switch.flow(), FlowKind::Switch);
        assert_eq!(Opcode::ReturnValue.flow(), FlowKind::Return);
        assert_eq!(Opcode::Throw.flow(), FlowKind::Throw);
    }

    #[test]
    fn test_branch_targets() {
        let goto = insn(Opcode::Goto, Operand::Branch(42));
        assert_eq!(goto.branch_targets(), vec![42]);
        assert!(!goto.can_fall_through());

        let switch = insn(
            Opcode::Switch,
            Operand::Switch {
                targets: vec![10, 20],
                default: 30,
            },
        );
        assert_eq!(switch.branch_targets(), vec![10, 20, 30]);

        let cond = insn(Opcode::IfZero, Operand::Branch(8));
        assert!(cond.can_fall_through());
    }

    #[test]
    fn test_invoke_stack_behavior() {
        let callee = MethodDescriptor::new(
            &crate::descriptor::ClassDescriptor::new("pkg/Helper"),
            "combine",
            "(II)I",
            true,
        );
        let call = insn(
            Opcode::InvokeStatic,
            Operand::Method(MethodRef {
                method: callee,
                arg_slots: 2,
                returns_value: true,
                return_class: None,
            }),
        );
        let behavior = call.stack_behavior();
        assert_eq!(behavior.pops, 2);
        assert_eq!(behavior.pushes, 1);
    }
}
