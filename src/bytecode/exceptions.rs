//! Exception handler table entries for decoded method bodies.
//!
//! Handlers describe protected bytecode ranges and where control transfers when
//! an exception raised inside the range matches the guarded type. The CFG
//! builder turns each (block, handler) intersection into a typed exception edge.

use bitflags::bitflags;

use crate::descriptor::ClassDescriptor;

bitflags! {
    /// Flags describing the kind of an exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed catch clause; `catch_type` names the guarded exception class.
        const CATCH = 0x0000;

        /// A finally clause that runs on both normal and exceptional exit from
        /// the protected range. `catch_type` is `None`: the handler observes
        /// every exception type.
        const FINALLY = 0x0002;

        /// A fault clause: like finally, but entered only on exceptional exit.
        const FAULT = 0x0004;
    }
}

/// One entry of a method's exception handler table.
///
/// The protected range is the half-open byte interval `[try_start, try_end)`.
/// An instruction inside that range whose operation can raise transfers control
/// to `handler_offset` when the raised exception matches `catch_type` (`None`
/// matches everything).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Kind of this clause.
    pub flags: ExceptionHandlerFlags,
    /// First byte offset of the protected range.
    pub try_start: u32,
    /// Byte offset one past the protected range.
    pub try_end: u32,
    /// Byte offset of the handler entry point.
    pub handler_offset: u32,
    /// Exception class guarded by this clause; `None` is a catch-all.
    pub catch_type: Option<ClassDescriptor>,
}

impl ExceptionHandler {
    /// Returns `true` if the given byte offset lies inside the protected range.
    #[must_use]
    pub fn covers(&self, offset: u32) -> bool {
        offset >= self.try_start && offset < self.try_end
    }
}
