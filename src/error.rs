use thiserror::Error;

use crate::descriptor::{ClassDescriptor, MethodDescriptor};

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// This enum covers all failure modes of the analysis engine: control flow graph
/// construction, dataflow iteration, cache orchestration, and class hierarchy
/// resolution. Each variant provides specific context about the failure mode to
/// enable appropriate error handling.
///
/// The enum is [`Clone`] on purpose: the analysis cache memoizes failed outcomes
/// per (analysis, descriptor) key and hands the same error back on every repeated
/// request, so repeated queries never redo failing work.
///
/// # Error Categories
///
/// ## Per-method analysis failures (recoverable, memoized)
/// - [`Error::CfgBuilder`] - The method body has a malformed control structure
/// - [`Error::Dataflow`] - A dataflow analysis failed on an otherwise valid CFG
/// - [`Error::Unprofitable`] - The method was ruled out of full analysis (definitive, not a defect)
///
/// ## Degradable resolution failures
/// - [`Error::ClassNotFound`] - A referenced class could not be located
///
/// ## Programming-error conditions (fatal to the run)
/// - [`Error::AnalysisCycle`] - An analysis engine transitively requested itself
/// - [`Error::Convergence`] - A dataflow analysis exceeded its iteration sanity bound
/// - [`Error::UnregisteredAnalysis`] - No engine registered for the requested result type
///
/// ## Infrastructure errors
/// - [`Error::GraphError`] - Graph substrate invariant violation
/// - [`Error::LockError`] - Thread synchronization failure
///
/// # Examples
///
/// ```rust,ignore
/// use bytescope::{AnalysisCache, Error, analysis::ControlFlowGraph};
///
/// match cache.get_method::<ControlFlowGraph>(&descriptor) {
///     Ok(cfg) => println!("{} blocks", cfg.block_count()),
///     Err(Error::Unprofitable(m)) => println!("{m} skipped: too large"),
///     Err(Error::CfgBuilder { message, .. }) => eprintln!("bad method body: {message}"),
///     Err(e) => return Err(e),
/// }
/// ```
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The method body has a malformed control structure.
    ///
    /// Raised by the CFG builder when a branch target is out of range, does not
    /// land on an instruction boundary, the body is empty, or execution can fall
    /// off the end of the method. The failure is local to one method: the cache
    /// records it and analysis continues for sibling methods.
    #[error("CFG construction failed for {method}: {message}")]
    CfgBuilder {
        /// The method whose body could not be turned into a CFG.
        method: MethodDescriptor,
        /// Description of the malformed structure.
        message: String,
    },

    /// A dataflow analysis failed on a structurally valid CFG.
    ///
    /// Typical causes are operand stack underflow during abstract interpretation
    /// or incompatible stack depths at a control flow merge, both of which
    /// indicate bytecode the abstract interpreter cannot model. Local to one
    /// method, memoized by the cache.
    #[error("dataflow analysis '{analysis}' failed for {method}: {message}")]
    Dataflow {
        /// Diagnostic name of the analysis that failed.
        analysis: &'static str,
        /// The method being analyzed.
        method: MethodDescriptor,
        /// Description of the failure.
        message: String,
    },

    /// The method was ruled out of full analysis.
    ///
    /// This is a definitive, expected outcome for methods that exceed the
    /// configured instruction ceiling - not an error in the input. Every
    /// analysis depending on this method's CFG reports the same outcome
    /// without attempting computation.
    #[error("method {0} is unprofitable to analyze")]
    Unprofitable(MethodDescriptor),

    /// A referenced class could not be located in the hierarchy.
    ///
    /// Callers inside the engine degrade to a conservative approximation
    /// instead of propagating this; it is also reported once per class to the
    /// run's error collector.
    #[error("class not found: {0}")]
    ClassNotFound(ClassDescriptor),

    /// No decoded body has been registered for the requested method.
    ///
    /// Raised when an analysis is requested for a descriptor the external
    /// class reader never delivered. Non-fatal: the requesting detector sees
    /// a typed failure, siblings are unaffected.
    #[error("no method body registered for {0}")]
    MethodNotFound(MethodDescriptor),

    /// An analysis engine transitively requested its own result.
    ///
    /// A cycle among analysis dependencies is a bug in an engine's dependency
    /// declaration, not a property of the analyzed code. The cache detects the
    /// re-entrant request and fails fast instead of deadlocking.
    #[error("re-entrant analysis cycle: '{analysis}' requested itself for {method}")]
    AnalysisCycle {
        /// Diagnostic name of the analysis that closed the cycle.
        analysis: &'static str,
        /// The method key on which the cycle was detected.
        method: MethodDescriptor,
    },

    /// A dataflow analysis failed to reach a fixed point within the sanity bound.
    ///
    /// A monotone transfer function over a finite-height lattice always
    /// converges, so exceeding the bound indicates a non-monotone transfer or a
    /// broken join - a bug in the analysis, fatal to the run.
    #[error("dataflow analysis '{analysis}' did not converge after {iterations} iterations")]
    Convergence {
        /// Diagnostic name of the offending analysis.
        analysis: &'static str,
        /// Number of node visits performed before giving up.
        iterations: usize,
    },

    /// No engine has been registered for the requested analysis result type.
    ///
    /// Engines are registered once at startup; requesting an unregistered type
    /// is a wiring bug in the embedding tool.
    #[error("no analysis engine registered for result type '{0}'")]
    UnregisteredAnalysis(&'static str),

    /// Graph substrate invariant violation.
    ///
    /// Raised by the directed graph utilities when an edge references a node
    /// that does not exist or a traversal precondition is violated.
    #[error("{0}")]
    GraphError(String),

    /// Failed to lock a synchronization primitive.
    ///
    /// This occurs when a mutex or condition variable is poisoned by a panic
    /// on another analysis worker.
    #[error("failed to lock target")]
    LockError,
}

impl Error {
    /// Returns `true` if this error indicates a bug in an analysis or in the
    /// engine wiring rather than a property of the analyzed input.
    ///
    /// Fatal errors must propagate to the top of the run; non-fatal errors are
    /// memoized per method and analysis continues for sibling methods.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::AnalysisCycle { .. }
                | Error::Convergence { .. }
                | Error::UnregisteredAnalysis(_)
                | Error::LockError
        )
    }

    /// Returns `true` if this error is the definitive unprofitable-method marker.
    #[must_use]
    pub fn is_unprofitable(&self) -> bool {
        matches!(self, Error::Unprofitable(_))
    }
}
