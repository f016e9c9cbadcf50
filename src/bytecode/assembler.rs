//! Label-based method body assembler.
//!
//! `BodyAssembler` builds decoded [`MethodBody`] values programmatically, with
//! named labels backpatched into branch targets on `finish`. The engine itself
//! never assembles code; this exists so tests, benches and embedding tools can
//! construct well-formed bodies without a binary decoder in the loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use bytescope::bytecode::{BodyAssembler, Opcode};
//!
//! let mut asm = BodyAssembler::new(1, 1);
//! asm.emit_load(0);
//! asm.emit_branch(Opcode::IfNull, "was_null");
//! asm.emit_push_int(1);
//! asm.emit(Opcode::ReturnValue);
//! asm.define_label("was_null");
//! asm.emit_push_int(0);
//! asm.emit(Opcode::ReturnValue);
//! let body = asm.finish()?;
//! # Ok::<(), bytescope::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    bytecode::{
        ExceptionHandler, ExceptionHandlerFlags, FieldRef, Instruction, MethodBody, MethodRef,
        Opcode, Operand,
    },
    descriptor::ClassDescriptor,
    Error, Result,
};

/// Encoded width used for instructions without an inline operand.
const PLAIN_WIDTH: u32 = 1;
/// Encoded width used for instructions with a 16-bit inline operand.
const SHORT_WIDTH: u32 = 3;
/// Encoded width used for instructions with a 32-bit inline operand.
const WIDE_WIDTH: u32 = 5;

/// Pending reference to a label from a branch or handler.
enum Fixup {
    Branch {
        index: usize,
        label: String,
    },
    Switch {
        index: usize,
        cases: Vec<String>,
        default: String,
    },
    Handler {
        index: usize,
        try_start: String,
        try_end: String,
        handler: String,
    },
}

/// Builds a [`MethodBody`] instruction by instruction, resolving named labels
/// to byte offsets when finished.
///
/// Offsets are synthesized from per-opcode encoding widths so the produced
/// bodies have realistic, non-contiguous instruction offsets, which is what
/// the CFG builder has to cope with on real input.
pub struct BodyAssembler {
    instructions: Vec<Instruction>,
    handlers: Vec<ExceptionHandler>,
    labels: HashMap<String, u32>,
    fixups: Vec<Fixup>,
    offset: u32,
    max_locals: u16,
    num_args: u16,
}

impl BodyAssembler {
    /// Creates an assembler for a method with the given argument and local counts.
    ///
    /// `max_locals` must be at least `num_args`; arguments occupy the first
    /// local slots.
    #[must_use]
    pub fn new(num_args: u16, max_locals: u16) -> Self {
        Self {
            instructions: Vec::new(),
            handlers: Vec::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            offset: 0,
            max_locals: max_locals.max(num_args),
            num_args,
        }
    }

    /// Defines a label at the current position.
    ///
    /// Redefining a label keeps the first definition and returns an error.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(Error::GraphError(format!("label '{name}' defined twice")));
        }
        self.labels.insert(name.to_string(), self.offset);
        Ok(())
    }

    fn push(&mut self, opcode: Opcode, operand: Operand, width: u32) {
        self.instructions.push(Instruction {
            offset: self.offset,
            size: width,
            opcode,
            operand,
        });
        self.offset += width;
    }

    /// Emits an instruction without an operand.
    pub fn emit(&mut self, opcode: Opcode) {
        self.push(opcode, Operand::None, PLAIN_WIDTH);
    }

    /// Emits an integer constant push.
    pub fn emit_push_int(&mut self, value: i64) {
        self.push(Opcode::PushInt, Operand::Int(value), WIDE_WIDTH);
    }

    /// Emits a local load.
    pub fn emit_load(&mut self, slot: u16) {
        self.push(Opcode::Load, Operand::Local(slot), SHORT_WIDTH);
    }

    /// Emits a local store.
    pub fn emit_store(&mut self, slot: u16) {
        self.push(Opcode::Store, Operand::Local(slot), SHORT_WIDTH);
    }

    /// Emits a branch instruction targeting a label.
    ///
    /// Valid for [`Opcode::Goto`] and every conditional branch opcode; the
    /// target offset is patched in by [`finish`](Self::finish).
    pub fn emit_branch(&mut self, opcode: Opcode, label: &str) {
        self.fixups.push(Fixup::Branch {
            index: self.instructions.len(),
            label: label.to_string(),
        });
        self.push(opcode, Operand::Branch(0), SHORT_WIDTH);
    }

    /// Emits a switch dispatch over the given case labels with a default label.
    pub fn emit_switch(&mut self, cases: &[&str], default: &str) {
        self.fixups.push(Fixup::Switch {
            index: self.instructions.len(),
            cases: cases.iter().map(|s| (*s).to_string()).collect(),
            default: default.to_string(),
        });
        let width = WIDE_WIDTH + 4 * u32::try_from(cases.len()).unwrap_or(u32::MAX);
        self.push(
            Opcode::Switch,
            Operand::Switch {
                targets: vec![0; cases.len()],
                default: 0,
            },
            width,
        );
    }

    /// Emits a call instruction.
    pub fn emit_call(&mut self, opcode: Opcode, method: MethodRef) {
        self.push(opcode, Operand::Method(method), SHORT_WIDTH);
    }

    /// Emits a class-operand instruction (`New`, `CheckCast`, `InstanceOf`).
    pub fn emit_class(&mut self, opcode: Opcode, class: ClassDescriptor) {
        self.push(opcode, Operand::Class(class), SHORT_WIDTH);
    }

    /// Emits a field access instruction.
    pub fn emit_field(&mut self, opcode: Opcode, field: FieldRef) {
        self.push(opcode, Operand::Field(field), SHORT_WIDTH);
    }

    /// Registers an exception handler over the range between two labels.
    ///
    /// All three labels are resolved on [`finish`](Self::finish); `catch_type`
    /// of `None` registers a catch-all clause.
    pub fn add_handler(
        &mut self,
        try_start: &str,
        try_end: &str,
        handler: &str,
        catch_type: Option<ClassDescriptor>,
    ) {
        let flags = if catch_type.is_some() {
            ExceptionHandlerFlags::CATCH
        } else {
            ExceptionHandlerFlags::FINALLY
        };
        self.fixups.push(Fixup::Handler {
            index: self.handlers.len(),
            try_start: try_start.to_string(),
            try_end: try_end.to_string(),
            handler: handler.to_string(),
        });
        self.handlers.push(ExceptionHandler {
            flags,
            try_start: 0,
            try_end: 0,
            handler_offset: 0,
            catch_type,
        });
    }

    fn resolve(&self, label: &str) -> Result<u32> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| Error::GraphError(format!("undefined label '{label}'")))
    }

    /// Resolves all labels and returns the finished body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if any referenced label was never defined.
    pub fn finish(mut self) -> Result<MethodBody> {
        let fixups = std::mem::take(&mut self.fixups);
        for fixup in fixups {
            match fixup {
                Fixup::Branch { index, label } => {
                    let target = self.resolve(&label)?;
                    self.instructions[index].operand = Operand::Branch(target);
                }
                Fixup::Switch {
                    index,
                    cases,
                    default,
                } => {
                    let mut targets = Vec::with_capacity(cases.len());
                    for case in &cases {
                        targets.push(self.resolve(case)?);
                    }
                    let default = self.resolve(&default)?;
                    self.instructions[index].operand = Operand::Switch { targets, default };
                }
                Fixup::Handler {
                    index,
                    try_start,
                    try_end,
                    handler,
                } => {
                    self.handlers[index].try_start = self.resolve(&try_start)?;
                    self.handlers[index].try_end = self.resolve(&try_end)?;
                    self.handlers[index].handler_offset = self.resolve(&handler)?;
                }
            }
        }
        Ok(MethodBody {
            instructions: self.instructions,
            exception_handlers: self.handlers,
            max_locals: self.max_locals,
            num_args: self.num_args,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_backpatching() {
        let mut asm = BodyAssembler::new(0, 1);
        asm.emit_push_int(0);
        asm.emit_branch(Opcode::IfZero, "done");
        asm.emit_push_int(1);
        asm.emit_store(0);
        asm.define_label("done").unwrap();
        asm.emit(Opcode::Return);
        let body = asm.finish().unwrap();

        let branch = &body.instructions[1];
        let Operand::Branch(target) = branch.operand else {
            panic!("expected branch operand");
        };
        assert_eq!(body.index_at_offset(target), Some(4));
    }

    #[test]
    fn test_undefined_label_rejected() {
        let mut asm = BodyAssembler::new(0, 0);
        asm.emit_branch(Opcode::Goto, "nowhere");
        asm.emit(Opcode::Return);
        assert!(asm.finish().is_err());
    }

    #[test]
    fn test_handler_resolution() {
        let mut asm = BodyAssembler::new(0, 0);
        asm.define_label("try").unwrap();
        asm.emit(Opcode::MonitorEnter);
        asm.define_label("try_end").unwrap();
        asm.emit(Opcode::Return);
        asm.define_label("catch").unwrap();
        asm.emit(Opcode::Throw);
        asm.add_handler(
            "try",
            "try_end",
            "catch",
            Some(ClassDescriptor::new("lang/Throwable")),
        );
        let body = asm.finish().unwrap();
        let handler = &body.exception_handlers[0];
        assert_eq!(handler.try_start, 0);
        assert!(handler.covers(0));
        assert_eq!(body.index_at_offset(handler.handler_offset), Some(2));
    }
}
