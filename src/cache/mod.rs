//! The analysis cache: lazy, dependency-aware, memoizing orchestration.
//!
//! Detectors and analyses never construct other analyses; they ask the cache.
//! One engine is registered per result type at startup; at query time
//! [`AnalysisCache::get_method`] resolves the engine on a miss, and the engine
//! in turn calls back into the cache for its own dependencies (the CFG, the
//! orderings, upstream dataflow results). Each of those is memoized
//! independently, so a result shared by several analyses is computed exactly
//! once per method.
//!
//! # Memoization Contract
//!
//! - At most one entry per (result-type, descriptor) key; once populated it is
//!   never recomputed for the lifetime of the cache (whole-run cache, no
//!   eviction).
//! - Two `get` calls for the same key return the *identical* `Arc`.
//! - Failures are memoized too: a method whose CFG cannot be built fails once
//!   and replays the same typed error afterwards.
//! - A method over the configured instruction ceiling is *unprofitable*: a
//!   definitive negative outcome recorded before any CFG construction and
//!   propagated to every dependent analysis of that method.
//!
//! # Concurrency
//!
//! Distinct keys proceed fully in parallel; concurrent requests for the same
//! key are serialized by a per-key slot (one computes, the rest wait for the
//! published outcome). There is no global lock. Same-thread re-entrance on a
//! key - an analysis cycle - fails fast with
//! [`Error::AnalysisCycle`](crate::Error::AnalysisCycle).

mod engines;
mod entry;

pub use engines::{register_default_engines, ClassSummary};
pub use entry::{AnyResult, Claim, EntrySlot, Outcome};

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::{
    bytecode::MethodBody,
    descriptor::{ClassDescriptor, MethodDescriptor},
    hierarchy::{ClassHierarchy, ErrorCollector},
    Error, Result,
};

/// Tunables for one analysis run.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Instruction-count ceiling above which a method is unprofitable to
    /// analyze. The check runs before CFG construction.
    pub max_instructions: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_instructions: 8_000,
        }
    }
}

/// An engine producing one method-level analysis result type.
///
/// Engines are strategy objects registered once at startup. `analyze` may
/// recursively request other results through the cache; it must resolve its
/// dependencies *only* that way, so the cache sees every edge of the
/// dependency graph.
pub trait MethodAnalysisEngine: Send + Sync {
    /// Diagnostic name of the produced analysis.
    fn name(&self) -> &'static str;

    /// Computes the result for one method.
    fn analyze(&self, cache: &AnalysisCache, method: &MethodDescriptor) -> Result<AnyResult>;
}

/// An engine producing one class-level analysis result type.
pub trait ClassAnalysisEngine: Send + Sync {
    /// Diagnostic name of the produced analysis.
    fn name(&self) -> &'static str;

    /// Computes the result for one class.
    fn analyze(&self, cache: &AnalysisCache, class: &ClassDescriptor) -> Result<AnyResult>;
}

/// Publishes a failure if a computation unwinds without publishing, so
/// waiters blocked on the slot are released instead of hanging.
struct CompletionGuard<'a> {
    slot: &'a EntrySlot,
    completed: bool,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let _ = self.slot.publish(Outcome::Failed(Error::LockError));
        }
    }
}

/// The whole-run analysis cache.
///
/// Owns the method body registry, the class hierarchy view, the error
/// collector, and the memoized per-method and per-class results. Engines are
/// registered while the embedding tool still holds `&mut`; afterwards the
/// cache is shared immutably across analysis workers.
pub struct AnalysisCache {
    config: CacheConfig,
    method_engines: HashMap<TypeId, Arc<dyn MethodAnalysisEngine>>,
    class_engines: HashMap<TypeId, Arc<dyn ClassAnalysisEngine>>,
    method_entries: DashMap<(TypeId, MethodDescriptor), Arc<EntrySlot>>,
    class_entries: DashMap<(TypeId, ClassDescriptor), Arc<EntrySlot>>,
    bodies: SkipMap<MethodDescriptor, Arc<MethodBody>>,
    hierarchy: Arc<ClassHierarchy>,
    collector: Arc<ErrorCollector>,
}

impl AnalysisCache {
    /// Creates an empty cache with the given configuration.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            method_engines: HashMap::new(),
            class_engines: HashMap::new(),
            method_entries: DashMap::new(),
            class_entries: DashMap::new(),
            bodies: SkipMap::new(),
            hierarchy: Arc::new(ClassHierarchy::new()),
            collector: Arc::new(ErrorCollector::new()),
        }
    }

    /// Returns the run configuration.
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the shared class hierarchy view.
    #[must_use]
    pub fn hierarchy(&self) -> &Arc<ClassHierarchy> {
        &self.hierarchy
    }

    /// Returns the shared error collector.
    #[must_use]
    pub fn collector(&self) -> &Arc<ErrorCollector> {
        &self.collector
    }

    /// Registers the engine producing result type `A` for methods.
    ///
    /// Later registrations for the same type replace earlier ones; engines
    /// are registered at startup, before any `get`.
    pub fn register_method_engine<A: Any + Send + Sync>(
        &mut self,
        engine: Arc<dyn MethodAnalysisEngine>,
    ) {
        self.method_engines.insert(TypeId::of::<A>(), engine);
    }

    /// Registers the engine producing result type `A` for classes.
    pub fn register_class_engine<A: Any + Send + Sync>(
        &mut self,
        engine: Arc<dyn ClassAnalysisEngine>,
    ) {
        self.class_engines.insert(TypeId::of::<A>(), engine);
    }

    /// Registers one decoded method body.
    ///
    /// Bodies are pushed in by the run driver before analysis starts.
    pub fn add_method_body(&self, method: MethodDescriptor, body: Arc<MethodBody>) {
        self.bodies.insert(method, body);
    }

    /// Returns the decoded body of a method.
    ///
    /// # Errors
    ///
    /// [`Error::MethodNotFound`] if the external reader never delivered it.
    pub fn method_body(&self, method: &MethodDescriptor) -> Result<Arc<MethodBody>> {
        self.bodies
            .get(method)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::MethodNotFound(method.clone()))
    }

    /// Returns the declaring class for the receiver slot of an instance
    /// method, `None` for static methods.
    #[must_use]
    pub fn receiver_class(&self, method: &MethodDescriptor) -> Option<ClassDescriptor> {
        (!method.is_static()).then(|| method.class().clone())
    }

    /// Iterates the registered methods of one class, in descriptor order.
    ///
    /// Descriptor ordering groups a class's methods together, so the engine
    /// iteration order of the visit contract is deterministic.
    #[must_use]
    pub fn methods_of(&self, class: &ClassDescriptor) -> Vec<MethodDescriptor> {
        self.bodies
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|method| method.class() == class)
            .collect()
    }

    /// Returns the number of registered method bodies.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.bodies.len()
    }

    /// Returns the memoized result of analysis `A` for a method, computing it
    /// on first request.
    ///
    /// # Errors
    ///
    /// - [`Error::UnregisteredAnalysis`] if no engine produces `A`.
    /// - [`Error::Unprofitable`] if the method exceeds the instruction
    ///   ceiling (recorded before any CFG construction).
    /// - [`Error::AnalysisCycle`] if the calling thread is already computing
    ///   this key (fatal).
    /// - Any memoized per-method failure of the engine.
    pub fn get_method<A: Any + Send + Sync>(&self, method: &MethodDescriptor) -> Result<Arc<A>> {
        let engine = self
            .method_engines
            .get(&TypeId::of::<A>())
            .cloned()
            .ok_or_else(|| Error::UnregisteredAnalysis(std::any::type_name::<A>()))?;

        let slot = self
            .method_entries
            .entry((TypeId::of::<A>(), method.clone()))
            .or_insert_with(|| Arc::new(EntrySlot::new()))
            .clone();

        let claim = slot.claim(
            || Error::Unprofitable(method.clone()),
            || Error::AnalysisCycle {
                analysis: engine.name(),
                method: method.clone(),
            },
        )?;
        let erased = match claim {
            Claim::Ready(outcome) => outcome?,
            Claim::Compute => {
                let mut guard = CompletionGuard {
                    slot: &slot,
                    completed: false,
                };
                let outcome = self.compute_method(engine.as_ref(), method);
                let (published, returned) = match outcome {
                    Ok(result) => (Outcome::Resolved(Arc::clone(&result)), Ok(result)),
                    Err(error) if error.is_unprofitable() => {
                        (Outcome::Unprofitable, Err(error))
                    }
                    Err(error) => (Outcome::Failed(error.clone()), Err(error)),
                };
                slot.publish(published)?;
                guard.completed = true;
                returned?
            }
        };

        erased
            .downcast::<A>()
            .map_err(|_| Error::UnregisteredAnalysis(std::any::type_name::<A>()))
    }

    /// Runs the unprofitability guard and then the engine.
    fn compute_method(
        &self,
        engine: &dyn MethodAnalysisEngine,
        method: &MethodDescriptor,
    ) -> Result<AnyResult> {
        if let Ok(body) = self.method_body(method) {
            if body.instruction_count() > self.config.max_instructions {
                return Err(Error::Unprofitable(method.clone()));
            }
        }
        engine.analyze(self, method)
    }

    /// Returns the memoized result of analysis `A` for a class, computing it
    /// on first request.
    ///
    /// # Errors
    ///
    /// As [`get_method`](Self::get_method), minus the unprofitability guard
    /// (class-level results have no instruction ceiling).
    pub fn get_class<A: Any + Send + Sync>(&self, class: &ClassDescriptor) -> Result<Arc<A>> {
        let engine = self
            .class_engines
            .get(&TypeId::of::<A>())
            .cloned()
            .ok_or_else(|| Error::UnregisteredAnalysis(std::any::type_name::<A>()))?;

        let slot = self
            .class_entries
            .entry((TypeId::of::<A>(), class.clone()))
            .or_insert_with(|| Arc::new(EntrySlot::new()))
            .clone();

        let placeholder =
            MethodDescriptor::new(class, "<class>", "()V", true);
        let claim = slot.claim(
            || Error::ClassNotFound(class.clone()),
            || Error::AnalysisCycle {
                analysis: engine.name(),
                method: placeholder.clone(),
            },
        )?;
        let erased = match claim {
            Claim::Ready(outcome) => outcome?,
            Claim::Compute => {
                let mut guard = CompletionGuard {
                    slot: &slot,
                    completed: false,
                };
                let outcome = engine.analyze(self, class);
                let (published, returned) = match outcome {
                    Ok(result) => (Outcome::Resolved(Arc::clone(&result)), Ok(result)),
                    Err(error) => (Outcome::Failed(error.clone()), Err(error)),
                };
                slot.publish(published)?;
                guard.completed = true;
                returned?
            }
        };

        erased
            .downcast::<A>()
            .map_err(|_| Error::UnregisteredAnalysis(std::any::type_name::<A>()))
    }
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("method_engines", &self.method_engines.len())
            .field("class_engines", &self.class_engines.len())
            .field("method_entries", &self.method_entries.len())
            .field("class_entries", &self.class_entries.len())
            .field("bodies", &self.bodies.len())
            .finish()
    }
}
