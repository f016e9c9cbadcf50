//! Basic blocks.

use std::fmt;

use crate::bytecode::Instruction;

/// An ordered, non-branching run of instructions plus its byte offset range.
///
/// Blocks are owned exclusively by their control flow graph and never modified
/// after construction. The synthetic exit node of a CFG is represented as an
/// empty block whose offset range is the end of the method.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Instructions of this block, in offset order. Empty only for the
    /// synthetic exit node.
    pub instructions: Vec<Instruction>,
    /// Byte offset of the first instruction.
    pub start_offset: u32,
    /// Byte offset one past the last instruction.
    pub end_offset: u32,
}

impl BasicBlock {
    /// Returns `true` for the synthetic exit node's block.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns the first instruction, if any.
    #[must_use]
    pub fn first_instruction(&self) -> Option<&Instruction> {
        self.instructions.first()
    }

    /// Returns the last instruction, if any.
    #[must_use]
    pub fn last_instruction(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Returns the number of instructions in this block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if this block holds no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns `true` if the given byte offset falls inside this block's range.
    #[must_use]
    pub fn contains_offset(&self, offset: u32) -> bool {
        offset >= self.start_offset && offset < self.end_offset
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_synthetic() {
            return f.write_str("<exit>");
        }
        write!(
            f,
            "[{:04x}..{:04x}) {} insns",
            self.start_offset,
            self.end_offset,
            self.instructions.len()
        )
    }
}
