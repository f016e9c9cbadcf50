//! The run driver: class registration, the visit contract, and
//! parallel-by-method execution.
//!
//! An [`AnalysisRun`] is the explicit context object every component hangs
//! off: the descriptor pool, the analysis cache with its engine catalog, the
//! class hierarchy and the error collector. There is no ambient global state;
//! an embedding tool creates a run, registers decoded classes while it still
//! holds `&mut` (class-level state is fully built before any parallelism),
//! then hands detectors [`MethodContext`]s through the visit methods.
//!
//! # Concurrency
//!
//! [`AnalysisRun::for_each_method`] drives methods sequentially;
//! [`AnalysisRun::par_for_each_method`] fans out per method on the rayon
//! pool. Either way, per-method work only touches the cache, which serializes
//! same-key computation and lets distinct keys proceed concurrently.
//! Cancellation is coarse-grained: [`cancel`](AnalysisRun::cancel) stops the
//! run between methods, never mid-method.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rayon::prelude::*;

use crate::{
    analysis::{
        ConstantDataflow, ControlFlowGraph, DepthFirstSearch, Dominators, LiveStoreDataflow,
        LockDataflow, NullnessDataflow, Postdominators, ReturnPathDataflow,
        ReverseDepthFirstSearch, TypeDataflow, ValueNumbering,
    },
    bytecode::MethodBody,
    cache::{register_default_engines, AnalysisCache, CacheConfig, ClassSummary},
    descriptor::{ClassDescriptor, DescriptorPool, MethodDescriptor},
    hierarchy::ErrorCollector,
    Result,
};

/// One decoded method delivered by the external class reader.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// The method's identity.
    pub descriptor: MethodDescriptor,
    /// Its decoded body.
    pub body: Arc<MethodBody>,
}

/// One decoded class delivered by the external class reader.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// The class's identity.
    pub descriptor: ClassDescriptor,
    /// Direct supertype, `None` for the hierarchy root.
    pub super_class: Option<ClassDescriptor>,
    /// Implemented interfaces.
    pub interfaces: Vec<ClassDescriptor>,
    /// The class's methods with decoded bodies.
    pub methods: Vec<MethodInfo>,
}

/// A whole-program analysis run.
///
/// Owns the cache and shares it with every detector; dropped at the end of
/// the run, which is the only "eviction" the whole-run cache has.
pub struct AnalysisRun {
    pool: Arc<DescriptorPool>,
    cache: AnalysisCache,
    classes: Vec<ClassDescriptor>,
    cancelled: AtomicBool,
}

impl AnalysisRun {
    /// Creates a run with the standard engine catalog registered.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        let mut cache = AnalysisCache::new(config);
        register_default_engines(&mut cache);
        Self {
            pool: Arc::new(DescriptorPool::new()),
            cache,
            classes: Vec::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the run's descriptor pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<DescriptorPool> {
        &self.pool
    }

    /// Returns the analysis cache.
    #[must_use]
    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Returns mutable access to the cache for additional engine
    /// registration, only possible before the run is shared.
    pub fn cache_mut(&mut self) -> &mut AnalysisCache {
        &mut self.cache
    }

    /// Returns the run's error collector.
    #[must_use]
    pub fn collector(&self) -> &Arc<ErrorCollector> {
        self.cache.collector()
    }

    /// Registers one decoded class: its hierarchy facts and method bodies.
    ///
    /// Takes `&mut self` deliberately - all class-level shared state is built
    /// before method-level parallelism begins.
    pub fn add_class(&mut self, class: ClassInfo) {
        self.cache.hierarchy().add_class(
            class.descriptor.clone(),
            class.super_class,
            class.interfaces,
        );
        for method in class.methods {
            self.cache.add_method_body(method.descriptor, method.body);
        }
        self.classes.push(class.descriptor);
    }

    /// Requests cancellation; honored between methods, not mid-method.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns the registered classes in registration order.
    #[must_use]
    pub fn classes(&self) -> &[ClassDescriptor] {
        &self.classes
    }

    /// Collects every registered method in engine iteration order.
    fn all_methods(&self) -> Vec<MethodDescriptor> {
        self.classes
            .iter()
            .flat_map(|class| self.cache.methods_of(class))
            .collect()
    }

    /// Visits every registered method sequentially.
    ///
    /// Per-method analysis failures are routed to the error collector and do
    /// not stop the run; fatal errors (analysis cycles, non-convergence)
    /// propagate immediately.
    ///
    /// # Errors
    ///
    /// The first fatal error raised by `visitor` or by an analysis.
    pub fn for_each_method<F>(&self, visitor: F) -> Result<()>
    where
        F: Fn(&MethodContext<'_>) -> Result<()>,
    {
        for method in self.all_methods() {
            if self.is_cancelled() {
                break;
            }
            let context = MethodContext {
                cache: &self.cache,
                method,
            };
            if let Err(error) = visitor(&context) {
                if error.is_fatal() {
                    return Err(error);
                }
                self.collector()
                    .report_method_failure(&context.method, &error);
            }
        }
        Ok(())
    }

    /// Visits every registered method in parallel, one rayon task per method.
    ///
    /// Same failure policy as [`for_each_method`](Self::for_each_method).
    ///
    /// # Errors
    ///
    /// A fatal error raised by any worker; remaining workers finish their
    /// current method and stop at the next cancellation check.
    pub fn par_for_each_method<F>(&self, visitor: F) -> Result<()>
    where
        F: Fn(&MethodContext<'_>) -> Result<()> + Sync,
    {
        let methods = self.all_methods();
        methods.par_iter().try_for_each(|method| {
            if self.is_cancelled() {
                return Ok(());
            }
            let context = MethodContext {
                cache: &self.cache,
                method: method.clone(),
            };
            match visitor(&context) {
                Ok(()) => Ok(()),
                Err(error) if error.is_fatal() => {
                    self.cancel();
                    Err(error)
                }
                Err(error) => {
                    self.collector()
                        .report_method_failure(&context.method, &error);
                    Ok(())
                }
            }
        })
    }

    /// Visits the methods of one class, in engine iteration order.
    ///
    /// This is the visit contract detectors use instead of managing CFG
    /// construction themselves: each callback receives a [`MethodContext`]
    /// whose accessors resolve analysis results through the cache.
    ///
    /// # Errors
    ///
    /// As [`for_each_method`](Self::for_each_method), plus
    /// [`crate::Error::ClassNotFound`] if the class was never registered.
    pub fn visit_class<F>(&self, class: &ClassDescriptor, visitor: F) -> Result<()>
    where
        F: Fn(&MethodContext<'_>) -> Result<()>,
    {
        let summary = self.cache.get_class::<ClassSummary>(class)?;
        for method in &summary.methods {
            if self.is_cancelled() {
                break;
            }
            let context = MethodContext {
                cache: &self.cache,
                method: method.clone(),
            };
            if let Err(error) = visitor(&context) {
                if error.is_fatal() {
                    return Err(error);
                }
                self.collector()
                    .report_method_failure(&context.method, &error);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for AnalysisRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisRun")
            .field("classes", &self.classes.len())
            .field("methods", &self.cache.method_count())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A detector's view of one method: typed accessors for every cacheable
/// analysis result, all resolved through the cache.
pub struct MethodContext<'a> {
    cache: &'a AnalysisCache,
    method: MethodDescriptor,
}

impl MethodContext<'_> {
    /// Returns the method's identity.
    #[must_use]
    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.method
    }

    /// Returns the underlying cache for result types without a dedicated
    /// accessor.
    #[must_use]
    pub fn cache(&self) -> &AnalysisCache {
        self.cache
    }

    /// Returns the decoded method body.
    pub fn body(&self) -> Result<Arc<MethodBody>> {
        self.cache.method_body(&self.method)
    }

    /// Returns the method's control flow graph.
    pub fn cfg(&self) -> Result<Arc<ControlFlowGraph>> {
        self.cache.get_method::<ControlFlowGraph>(&self.method)
    }

    /// Returns the depth-first search over the CFG.
    pub fn depth_first_search(&self) -> Result<Arc<DepthFirstSearch>> {
        self.cache.get_method::<DepthFirstSearch>(&self.method)
    }

    /// Returns the reverse depth-first search over the CFG.
    pub fn reverse_depth_first_search(&self) -> Result<Arc<ReverseDepthFirstSearch>> {
        self.cache
            .get_method::<ReverseDepthFirstSearch>(&self.method)
    }

    /// Returns the dominator tree.
    pub fn dominators(&self) -> Result<Arc<Dominators>> {
        self.cache.get_method::<Dominators>(&self.method)
    }

    /// Returns the postdominator tree.
    pub fn postdominators(&self) -> Result<Arc<Postdominators>> {
        self.cache.get_method::<Postdominators>(&self.method)
    }

    /// Returns the value numbering result.
    pub fn value_numbering(&self) -> Result<Arc<ValueNumbering>> {
        self.cache.get_method::<ValueNumbering>(&self.method)
    }

    /// Returns the nullness tracking result.
    pub fn nullness(&self) -> Result<Arc<NullnessDataflow>> {
        self.cache.get_method::<NullnessDataflow>(&self.method)
    }

    /// Returns the lock-state tracking result.
    pub fn locks(&self) -> Result<Arc<LockDataflow>> {
        self.cache.get_method::<LockDataflow>(&self.method)
    }

    /// Returns the type tracking result.
    pub fn types(&self) -> Result<Arc<TypeDataflow>> {
        self.cache.get_method::<TypeDataflow>(&self.method)
    }

    /// Returns the live-store result.
    pub fn live_stores(&self) -> Result<Arc<LiveStoreDataflow>> {
        self.cache.get_method::<LiveStoreDataflow>(&self.method)
    }

    /// Returns the constant propagation result.
    pub fn constants(&self) -> Result<Arc<ConstantDataflow>> {
        self.cache.get_method::<ConstantDataflow>(&self.method)
    }

    /// Returns the return-path result.
    pub fn return_paths(&self) -> Result<Arc<ReturnPathDataflow>> {
        self.cache.get_method::<ReturnPathDataflow>(&self.method)
    }
}

impl std::fmt::Debug for MethodContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MethodContext({})", self.method)
    }
}
