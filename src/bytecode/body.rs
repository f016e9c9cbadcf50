//! Decoded method bodies as delivered by the external decoder.

use crate::bytecode::{ExceptionHandler, Instruction};

/// A decoded method body: the ordered instruction list, the exception handler
/// table, and the frame-shape facts needed to seed abstract interpretation.
///
/// Bodies are produced by the external class reader and registered with the
/// analysis run before any analysis starts; the engine treats them as
/// immutable input. Argument and local counts are explicit so the engine
/// never has to parse signature strings.
#[derive(Debug, Clone)]
pub struct MethodBody {
    /// Instructions in offset order.
    pub instructions: Vec<Instruction>,
    /// Exception handler table, in decreasing priority order.
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Number of local slots, arguments included.
    pub max_locals: u16,
    /// Number of argument slots (receiver included for instance methods).
    pub num_args: u16,
}

impl MethodBody {
    /// Returns the number of instructions in the body.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Returns the total encoded size of the body in bytes.
    #[must_use]
    pub fn code_size(&self) -> u32 {
        self.instructions.last().map_or(0, Instruction::next_offset)
    }

    /// Returns the index of the instruction at the given byte offset.
    ///
    /// Offsets are strictly increasing, so this is a binary search. `None`
    /// means the offset does not land on an instruction boundary - branch
    /// targets that do are rejected by the CFG builder.
    #[must_use]
    pub fn index_at_offset(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |insn| insn.offset)
            .ok()
    }
}
