//! # bytescope Prelude
//!
//! Convenient re-exports of the types most embedding tools and detectors
//! touch. Import the prelude to get the run driver, the cache, the common
//! result types and the boundary data model in one line.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all bytescope operations
pub use crate::Error;

/// The result type used throughout bytescope
pub use crate::Result;

// ================================================================================================
// Run Driver and Cache
// ================================================================================================

/// The analysis run driver and its class registration types
pub use crate::engine::{AnalysisRun, ClassInfo, MethodContext, MethodInfo};

/// The analysis cache, its configuration and engine traits
pub use crate::cache::{
    AnalysisCache, CacheConfig, ClassAnalysisEngine, ClassSummary, MethodAnalysisEngine,
};

// ================================================================================================
// Identities
// ================================================================================================

/// Interned class and method identities
pub use crate::descriptor::{ClassDescriptor, DescriptorPool, MethodDescriptor};

// ================================================================================================
// Boundary Data Model
// ================================================================================================

/// Decoded instruction and method body types
pub use crate::bytecode::{
    BodyAssembler, ExceptionHandler, ExceptionHandlerFlags, FieldRef, FlowKind, Instruction,
    MethodBody, MethodRef, Opcode, Operand,
};

// ================================================================================================
// Analysis Results
// ================================================================================================

/// Control flow graph types
pub use crate::analysis::{BasicBlock, CfgBuilder, CfgEdge, CfgEdgeKind, ControlFlowGraph};

/// Generic dataflow framework types
pub use crate::analysis::{
    DataflowAnalysis, DataflowResult, DataflowSolver, Direction, Frame, Location,
};

/// Concrete analysis results
pub use crate::analysis::{
    ConstantDataflow, ConstantFact, DepthFirstSearch, Dominators, LiveStoreDataflow, LockDataflow,
    LockSet, Nullness, NullnessDataflow, Postdominators, ReturnPath, ReturnPathDataflow,
    ReverseDepthFirstSearch, TypeDataflow, TypeFact, ValueNumber, ValueNumbering,
};

// ================================================================================================
// Hierarchy Boundary
// ================================================================================================

/// Class hierarchy view and the run-wide error collector
pub use crate::hierarchy::{ClassHierarchy, ErrorCollector};
