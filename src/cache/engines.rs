//! The standard engine catalog.
//!
//! One engine per cacheable result type, each declaring its dependencies by
//! requesting them back through the cache - never by constructing another
//! analysis directly. The dependency graph this induces:
//!
//! ```text
//! MethodBody (registry)
//!   └─ ControlFlowGraph
//!        ├─ DepthFirstSearch ────────┐
//!        ├─ ReverseDepthFirstSearch ─┤
//!        ├─ Dominators / Postdominators
//!        ├─ ValueNumbering ──┬─ NullnessDataflow
//!        │                   └─ LockDataflow
//!        ├─ TypeDataflow (+ ClassHierarchy)
//!        ├─ LiveStoreDataflow
//!        ├─ ConstantDataflow
//!        └─ ReturnPathDataflow
//! ```
//!
//! Registering the catalog is one call to [`register_default_engines`];
//! embedding tools may register additional engines for their own result
//! types alongside.

use std::sync::Arc;

use crate::{
    analysis::{
        CfgBuilder, ConstantAnalysis, ConstantDataflow, ControlFlowGraph, DataflowSolver,
        DepthFirstSearch, Dominators, LiveStoreAnalysis, LiveStoreDataflow, LockAnalysis,
        LockDataflow, NullnessAnalysis, NullnessDataflow, Postdominators, ReturnPathAnalysis,
        ReturnPathDataflow, ReverseDepthFirstSearch, TypeAnalysis, TypeDataflow,
        ValueNumberAnalysis, ValueNumbering,
    },
    cache::{AnalysisCache, AnyResult, ClassAnalysisEngine, MethodAnalysisEngine},
    descriptor::{ClassDescriptor, MethodDescriptor},
    Result,
};

/// Class-level summary used by the visit contract: the methods of a class in
/// engine iteration order, plus its direct supertype and interfaces.
#[derive(Debug, Clone)]
pub struct ClassSummary {
    /// The summarized class.
    pub class: ClassDescriptor,
    /// Direct supertype, `None` for the hierarchy root.
    pub super_class: Option<ClassDescriptor>,
    /// Implemented interfaces.
    pub interfaces: Vec<ClassDescriptor>,
    /// Methods with registered bodies, in descriptor order.
    pub methods: Vec<MethodDescriptor>,
}

struct CfgEngine;

impl MethodAnalysisEngine for CfgEngine {
    fn name(&self) -> &'static str {
        "control flow graph"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let body = cache.method_body(method)?;
        let cfg = CfgBuilder::build(method, &body)?;
        Ok(Arc::new(cfg))
    }
}

struct DepthFirstSearchEngine;

impl MethodAnalysisEngine for DepthFirstSearchEngine {
    fn name(&self) -> &'static str {
        "depth first search"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        Ok(Arc::new(DepthFirstSearch::compute(&cfg)))
    }
}

struct ReverseDepthFirstSearchEngine;

impl MethodAnalysisEngine for ReverseDepthFirstSearchEngine {
    fn name(&self) -> &'static str {
        "reverse depth first search"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        Ok(Arc::new(ReverseDepthFirstSearch::compute(&cfg)))
    }
}

struct DominatorsEngine;

impl MethodAnalysisEngine for DominatorsEngine {
    fn name(&self) -> &'static str {
        "dominators analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        Ok(Arc::new(Dominators::compute(&cfg)))
    }
}

struct PostdominatorsEngine;

impl MethodAnalysisEngine for PostdominatorsEngine {
    fn name(&self) -> &'static str {
        "postdominators analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        Ok(Arc::new(Postdominators::compute(&cfg)))
    }
}

struct ValueNumberingEngine;

impl MethodAnalysisEngine for ValueNumberingEngine {
    fn name(&self) -> &'static str {
        "value number analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let body = cache.method_body(method)?;
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        let dfs = cache.get_method::<DepthFirstSearch>(method)?;
        let mut analysis = ValueNumberAnalysis::new(&body);
        let dataflow =
            DataflowSolver::execute_seeded(&cfg, &mut analysis, method, dfs.reverse_postorder())?;
        Ok(Arc::new(ValueNumbering::new(dataflow, analysis)))
    }
}

struct NullnessEngine;

impl MethodAnalysisEngine for NullnessEngine {
    fn name(&self) -> &'static str {
        "null value analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let body = cache.method_body(method)?;
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        let dfs = cache.get_method::<DepthFirstSearch>(method)?;
        let vna = cache.get_method::<ValueNumbering>(method)?;
        let mut analysis = NullnessAnalysis::new(&body, Arc::clone(&cfg), vna);
        let dataflow =
            DataflowSolver::execute_seeded(&cfg, &mut analysis, method, dfs.reverse_postorder())?;
        Ok(Arc::new(NullnessDataflow::new(dataflow)))
    }
}

struct LockEngine;

impl MethodAnalysisEngine for LockEngine {
    fn name(&self) -> &'static str {
        "lock set analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        let dfs = cache.get_method::<DepthFirstSearch>(method)?;
        let vna = cache.get_method::<ValueNumbering>(method)?;
        let mut analysis = LockAnalysis::new(Arc::clone(&cfg), vna);
        let dataflow =
            DataflowSolver::execute_seeded(&cfg, &mut analysis, method, dfs.reverse_postorder())?;
        Ok(Arc::new(LockDataflow::new(dataflow)))
    }
}

struct TypeEngine;

impl MethodAnalysisEngine for TypeEngine {
    fn name(&self) -> &'static str {
        "type analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let body = cache.method_body(method)?;
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        let dfs = cache.get_method::<DepthFirstSearch>(method)?;
        let mut analysis = TypeAnalysis::new(
            &body,
            cache.receiver_class(method),
            Arc::clone(cache.hierarchy()),
            Arc::clone(cache.collector()),
        );
        let dataflow =
            DataflowSolver::execute_seeded(&cfg, &mut analysis, method, dfs.reverse_postorder())?;
        Ok(Arc::new(TypeDataflow::new(dataflow)))
    }
}

struct LiveStoreEngine;

impl MethodAnalysisEngine for LiveStoreEngine {
    fn name(&self) -> &'static str {
        "live store analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let body = cache.method_body(method)?;
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        let rdfs = cache.get_method::<ReverseDepthFirstSearch>(method)?;
        let mut analysis = LiveStoreAnalysis::new(&body);
        let dataflow =
            DataflowSolver::execute_seeded(&cfg, &mut analysis, method, rdfs.reverse_postorder())?;
        Ok(Arc::new(LiveStoreDataflow::new(dataflow)))
    }
}

struct ConstantEngine;

impl MethodAnalysisEngine for ConstantEngine {
    fn name(&self) -> &'static str {
        "constant propagation"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let body = cache.method_body(method)?;
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        let dfs = cache.get_method::<DepthFirstSearch>(method)?;
        let mut analysis = ConstantAnalysis::new(&body);
        let dataflow =
            DataflowSolver::execute_seeded(&cfg, &mut analysis, method, dfs.reverse_postorder())?;
        Ok(Arc::new(ConstantDataflow::new(dataflow)))
    }
}

struct ReturnPathEngine;

impl MethodAnalysisEngine for ReturnPathEngine {
    fn name(&self) -> &'static str {
        "return path analysis"
    }

    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult> {
        let cfg = cache.get_method::<ControlFlowGraph>(method)?;
        let rdfs = cache.get_method::<ReverseDepthFirstSearch>(method)?;
        let mut analysis = ReturnPathAnalysis;
        let dataflow =
            DataflowSolver::execute_seeded(&cfg, &mut analysis, method, rdfs.reverse_postorder())?;
        Ok(Arc::new(ReturnPathDataflow::new(dataflow)))
    }
}

struct ClassSummaryEngine;

impl ClassAnalysisEngine for ClassSummaryEngine {
    fn name(&self) -> &'static str {
        "class summary"
    }

    fn analyze(&self, cache: &AnalysisCache, class: &ClassDescriptor) -> Result<AnyResult> {
        let super_class = cache.hierarchy().super_class(class)?;
        let interfaces = cache.hierarchy().interfaces_of(class);
        let methods = cache.methods_of(class);
        Ok(Arc::new(ClassSummary {
            class: class.clone(),
            super_class,
            interfaces,
            methods,
        }))
    }
}

/// Registers the standard engine catalog with a cache.
///
/// Embedding tools call this once at startup, before sharing the cache with
/// analysis workers, and may add their own engines afterwards.
pub fn register_default_engines(cache: &mut AnalysisCache) {
    cache.register_method_engine::<ControlFlowGraph>(Arc::new(CfgEngine));
    cache.register_method_engine::<DepthFirstSearch>(Arc::new(DepthFirstSearchEngine));
    cache.register_method_engine::<ReverseDepthFirstSearch>(Arc::new(ReverseDepthFirstSearchEngine));
    cache.register_method_engine::<Dominators>(Arc::new(DominatorsEngine));
    cache.register_method_engine::<Postdominators>(Arc::new(PostdominatorsEngine));
    cache.register_method_engine::<ValueNumbering>(Arc::new(ValueNumberingEngine));
    cache.register_method_engine::<NullnessDataflow>(Arc::new(NullnessEngine));
    cache.register_method_engine::<LockDataflow>(Arc::new(LockEngine));
    cache.register_method_engine::<TypeDataflow>(Arc::new(TypeEngine));
    cache.register_method_engine::<LiveStoreDataflow>(Arc::new(LiveStoreEngine));
    cache.register_method_engine::<ConstantDataflow>(Arc::new(ConstantEngine));
    cache.register_method_engine::<ReturnPathDataflow>(Arc::new(ReturnPathEngine));
    cache.register_class_engine::<ClassSummary>(Arc::new(ClassSummaryEngine));
}
