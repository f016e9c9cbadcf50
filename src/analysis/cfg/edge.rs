//! Typed control flow edges.

use std::fmt;

use crate::descriptor::ClassDescriptor;

/// Classification of a control flow edge.
///
/// The kind records *why* control can transfer from the source block to the
/// target block. Dataflow analyses use it to refine facts along specific
/// outcomes (e.g. the taken edge of a null test) and to treat exceptional
/// transfers differently from normal ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfgEdgeKind {
    /// Sequential flow into the next block (the source block does not end in
    /// a control transfer; it was split because the target is a branch
    /// target or handler boundary).
    FallThrough,
    /// Unconditional jump.
    Goto,
    /// Conditional branch, condition satisfied.
    BranchTaken,
    /// Conditional branch, condition not satisfied (sequential continuation).
    BranchNotTaken,
    /// One case of a multi-way dispatch.
    SwitchCase {
        /// Position of the case in the dispatch table.
        index: usize,
    },
    /// The default target of a multi-way dispatch.
    SwitchDefault,
    /// Transfer into an exception handler, guarded by the handler's type.
    Exception {
        /// Exception class the handler guards; `None` is a catch-all.
        catch_type: Option<ClassDescriptor>,
    },
    /// Normal method exit into the synthetic exit node.
    Return,
    /// An exception leaves the method uncaught; edge into the synthetic exit
    /// node.
    Unhandled,
}

/// Payload attached to every edge of the control flow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgEdge {
    /// What kind of transfer this edge represents.
    pub kind: CfgEdgeKind,
}

impl CfgEdge {
    /// Creates an edge with the given kind.
    #[must_use]
    pub fn new(kind: CfgEdgeKind) -> Self {
        Self { kind }
    }

    /// Returns `true` for edges that model exceptional control transfer.
    #[must_use]
    pub fn is_exception(&self) -> bool {
        matches!(
            self.kind,
            CfgEdgeKind::Exception { .. } | CfgEdgeKind::Unhandled
        )
    }

    /// Returns the guarded exception type for handler edges.
    ///
    /// `None` for non-exception edges and for catch-all handlers; use
    /// [`is_exception`](Self::is_exception) to tell the two apart.
    #[must_use]
    pub fn catch_type(&self) -> Option<&ClassDescriptor> {
        match &self.kind {
            CfgEdgeKind::Exception { catch_type } => catch_type.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for CfgEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CfgEdgeKind::FallThrough => f.write_str("fallthrough"),
            CfgEdgeKind::Goto => f.write_str("goto"),
            CfgEdgeKind::BranchTaken => f.write_str("taken"),
            CfgEdgeKind::BranchNotTaken => f.write_str("not-taken"),
            CfgEdgeKind::SwitchCase { index } => write!(f, "case {index}"),
            CfgEdgeKind::SwitchDefault => f.write_str("default"),
            CfgEdgeKind::Exception { catch_type } => match catch_type {
                Some(class) => write!(f, "catch {class}"),
                None => f.write_str("catch *"),
            },
            CfgEdgeKind::Return => f.write_str("return"),
            CfgEdgeKind::Unhandled => f.write_str("unhandled"),
        }
    }
}
