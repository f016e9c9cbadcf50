//! Stable, interned identities for classes and methods.
//!
//! Descriptors identify a class or method by fully qualified name, signature and
//! staticness without holding any reference to loaded class data. They are the
//! keys of the [`crate::cache::AnalysisCache`]: cheap to clone, cheap to compare,
//! ordered, and alive for the whole analysis run.
//!
//! # Interning
//!
//! Descriptors wrap [`Arc`]-backed data. Creating them through a
//! [`DescriptorPool`] deduplicates the backing allocations so that equality
//! checks between pooled descriptors are usually a single pointer comparison.
//! Equality is still defined structurally, so descriptors built outside a pool
//! (e.g. in tests) compare correctly against pooled ones.
//!
//! # Examples
//!
//! ```rust,ignore
//! use bytescope::descriptor::DescriptorPool;
//!
//! let pool = DescriptorPool::new();
//! let class = pool.class("collections/TreeMap");
//! let method = pool.method(&class, "put", "(Ljava/lang/Object;Ljava/lang/Object;)V", false);
//!
//! assert_eq!(method.class(), &class);
//! assert!(!method.is_static());
//! ```

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

use dashmap::DashMap;

/// A stable identity for a class, independent of whether it is loaded.
///
/// Wraps the fully qualified, slash-separated class name (e.g.
/// `collections/TreeMap`). Cloning is an `Arc` bump; comparing two descriptors
/// produced by the same [`DescriptorPool`] is a pointer comparison fast path.
///
/// # Thread Safety
///
/// `ClassDescriptor` is [`Send`] and [`Sync`] and is used as a key in
/// concurrent maps throughout the engine.
#[derive(Clone)]
pub struct ClassDescriptor {
    name: Arc<str>,
}

impl ClassDescriptor {
    /// Creates a descriptor from a fully qualified, slash-separated class name.
    ///
    /// Prefer [`DescriptorPool::class`] inside the engine so equal names share
    /// one allocation.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
        }
    }

    /// Returns the fully qualified, slash-separated class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the unqualified class name (the segment after the last `/`).
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Returns the package prefix, or an empty string for unpackaged classes.
    #[must_use]
    pub fn package(&self) -> &str {
        match self.name.rfind('/') {
            Some(idx) => &self.name[..idx],
            None => "",
        }
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.name, &other.name) || self.name == other.name
    }
}

impl Eq for ClassDescriptor {}

impl Hash for ClassDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for ClassDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassDescriptor({})", self.name)
    }
}

impl fmt::Display for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// The interned payload of a [`MethodDescriptor`].
#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct MethodIdent {
    class: ClassDescriptor,
    name: Arc<str>,
    signature: Arc<str>,
    is_static: bool,
}

/// A stable identity for a method: owning class, name, signature and staticness.
///
/// The signature is carried as an opaque descriptor string supplied by the
/// external decoder; the engine never parses it. Argument and local counts
/// needed for frame setup travel on the decoded
/// [`MethodBody`](crate::bytecode::MethodBody) instead.
///
/// Descriptors never hold references to decoded bodies or analysis results;
/// they exist exactly so the cache can be keyed without loading anything.
#[derive(Clone)]
pub struct MethodDescriptor {
    ident: Arc<MethodIdent>,
}

impl MethodDescriptor {
    /// Creates a descriptor without pooling.
    ///
    /// Prefer [`DescriptorPool::method`] inside the engine.
    #[must_use]
    pub fn new(class: &ClassDescriptor, name: &str, signature: &str, is_static: bool) -> Self {
        Self {
            ident: Arc::new(MethodIdent {
                class: class.clone(),
                name: Arc::from(name),
                signature: Arc::from(signature),
                is_static,
            }),
        }
    }

    /// Returns the descriptor of the class that declares this method.
    #[must_use]
    pub fn class(&self) -> &ClassDescriptor {
        &self.ident.class
    }

    /// Returns the method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.ident.name
    }

    /// Returns the opaque signature string supplied by the decoder.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.ident.signature
    }

    /// Returns `true` if the method is static (no receiver slot).
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.ident.is_static
    }
}

impl PartialEq for MethodDescriptor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ident, &other.ident) || self.ident == other.ident
    }
}

impl Eq for MethodDescriptor {}

impl Hash for MethodDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ident.hash(state);
    }
}

impl PartialOrd for MethodDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MethodDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ident.cmp(&other.ident)
    }
}

impl fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MethodDescriptor({}.{}{})",
            self.ident.class.name(),
            self.ident.name,
            self.ident.signature
        )
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{}",
            self.ident.class.name(),
            self.ident.name,
            self.ident.signature
        )
    }
}

/// Deduplicating factory for descriptors.
///
/// One pool lives inside each [`AnalysisRun`](crate::engine::AnalysisRun) and is
/// shared by every component that mints descriptors, so a distinct identity is
/// allocated once per run regardless of how many call sites mention it.
///
/// # Thread Safety
///
/// All methods take `&self` and are safe to call concurrently; the pool is
/// backed by [`DashMap`].
#[derive(Default)]
pub struct DescriptorPool {
    classes: DashMap<Arc<str>, ClassDescriptor>,
    methods: DashMap<(Arc<str>, Arc<str>, Arc<str>, bool), MethodDescriptor>,
}

impl DescriptorPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the interned descriptor for the given class name.
    #[must_use]
    pub fn class(&self, name: &str) -> ClassDescriptor {
        if let Some(existing) = self.classes.get(name) {
            return existing.value().clone();
        }
        let descriptor = ClassDescriptor::new(name);
        self.classes
            .entry(descriptor.name.clone())
            .or_insert(descriptor)
            .clone()
    }

    /// Returns the interned descriptor for the given method identity.
    #[must_use]
    pub fn method(
        &self,
        class: &ClassDescriptor,
        name: &str,
        signature: &str,
        is_static: bool,
    ) -> MethodDescriptor {
        let class = self.class(class.name());
        let key = (
            class.name.clone(),
            Arc::<str>::from(name),
            Arc::<str>::from(signature),
            is_static,
        );
        if let Some(existing) = self.methods.get(&key) {
            return existing.value().clone();
        }
        let descriptor = MethodDescriptor {
            ident: Arc::new(MethodIdent {
                class,
                name: key.1.clone(),
                signature: key.2.clone(),
                is_static,
            }),
        };
        self.methods.entry(key).or_insert(descriptor).clone()
    }

    /// Returns the number of distinct class identities in the pool.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Returns the number of distinct method identities in the pool.
    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

impl fmt::Debug for DescriptorPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorPool")
            .field("classes", &self.classes.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_descriptor_parts() {
        let desc = ClassDescriptor::new("util/concurrent/Semaphore");
        assert_eq!(desc.simple_name(), "Semaphore");
        assert_eq!(desc.package(), "util/concurrent");

        let unpackaged = ClassDescriptor::new("Main");
        assert_eq!(unpackaged.simple_name(), "Main");
        assert_eq!(unpackaged.package(), "");
    }

    #[test]
    fn test_pool_interns_classes() {
        let pool = DescriptorPool::new();
        let a = pool.class("pkg/Widget");
        let b = pool.class("pkg/Widget");
        assert!(Arc::ptr_eq(&a.name, &b.name));
        assert_eq!(pool.class_count(), 1);
    }

    #[test]
    fn test_pool_interns_methods() {
        let pool = DescriptorPool::new();
        let class = pool.class("pkg/Widget");
        let m1 = pool.method(&class, "resize", "(II)V", false);
        let m2 = pool.method(&class, "resize", "(II)V", false);
        assert!(Arc::ptr_eq(&m1.ident, &m2.ident));
        assert_eq!(pool.method_count(), 1);

        let m3 = pool.method(&class, "resize", "(II)V", true);
        assert_ne!(m1, m3);
        assert_eq!(pool.method_count(), 2);
    }

    #[test]
    fn test_unpooled_equality_is_structural() {
        let pool = DescriptorPool::new();
        let class = pool.class("pkg/Widget");
        let pooled = pool.method(&class, "close", "()V", false);
        let loose = MethodDescriptor::new(&ClassDescriptor::new("pkg/Widget"), "close", "()V", false);
        assert_eq!(pooled, loose);
    }

    #[test]
    fn test_descriptor_ordering_is_stable() {
        let pool = DescriptorPool::new();
        let class = pool.class("pkg/Widget");
        let a = pool.method(&class, "alpha", "()V", false);
        let b = pool.method(&class, "beta", "()V", false);
        assert!(a < b);
    }
}
