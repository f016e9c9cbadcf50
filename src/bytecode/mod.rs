//! Boundary data model for decoded stack-machine bytecode.
//!
//! The external instruction decoder and class reader hand the engine decoded
//! method bodies in this form: an ordered [`Instruction`] list with byte
//! offsets, an [`ExceptionHandler`] table, and explicit frame-shape counts.
//! Nothing in this module reads binary input.
//!
//! # Key Types
//! - [`Instruction`], [`Opcode`], [`Operand`] - the decoded instruction model
//! - [`MethodBody`] - one method's instructions plus its handler table
//! - [`ExceptionHandler`] - protected range, handler target, guarded type
//! - [`BodyAssembler`] - label-based builder used by tests and embedders

mod assembler;
mod body;
mod exceptions;
mod instruction;

pub use assembler::BodyAssembler;
pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use instruction::{FieldRef, FlowKind, Instruction, MethodRef, Opcode, Operand, StackBehavior};
