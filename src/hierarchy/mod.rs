//! Class hierarchy boundary and the run-wide error collector.
//!
//! The hierarchy is an external collaborator: the class reader pushes
//! supertype and interface facts in before analysis starts, and the type
//! analyses query subtype relations and least common supertypes. A class the
//! reader never delivered produces [`Error::ClassNotFound`]; analyses degrade
//! to a conservative answer and report the miss once through the
//! [`ErrorCollector`].

use dashmap::{DashMap, DashSet};

use crate::{
    descriptor::{ClassDescriptor, MethodDescriptor},
    Error, Result,
};

/// Supertype and interface facts for the classes of one analysis run.
///
/// Read-mostly: fully populated before method-level parallelism begins, then
/// queried concurrently by the type analyses. The designated root class
/// (`lang/Object` by default) is the least common supertype of last resort.
#[derive(Debug)]
pub struct ClassHierarchy {
    supers: DashMap<ClassDescriptor, Option<ClassDescriptor>>,
    interfaces: DashMap<ClassDescriptor, Vec<ClassDescriptor>>,
    root: ClassDescriptor,
}

impl ClassHierarchy {
    /// Creates a hierarchy whose root class is `lang/Object`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(ClassDescriptor::new("lang/Object"))
    }

    /// Creates a hierarchy with an explicit root class.
    #[must_use]
    pub fn with_root(root: ClassDescriptor) -> Self {
        let hierarchy = Self {
            supers: DashMap::new(),
            interfaces: DashMap::new(),
            root: root.clone(),
        };
        hierarchy.supers.insert(root, None);
        hierarchy
    }

    /// Returns the root class descriptor.
    #[must_use]
    pub fn root(&self) -> &ClassDescriptor {
        &self.root
    }

    /// Registers a class with its direct supertype and implemented interfaces.
    ///
    /// `super_class` of `None` is only valid for the root; any other class
    /// without an explicit supertype is attached to the root.
    pub fn add_class(
        &self,
        class: ClassDescriptor,
        super_class: Option<ClassDescriptor>,
        interfaces: Vec<ClassDescriptor>,
    ) {
        let parent = if class == self.root {
            None
        } else {
            Some(super_class.unwrap_or_else(|| self.root.clone()))
        };
        self.supers.insert(class.clone(), parent);
        if !interfaces.is_empty() {
            self.interfaces.insert(class, interfaces);
        }
    }

    /// Returns `true` if the class has been registered.
    #[must_use]
    pub fn knows(&self, class: &ClassDescriptor) -> bool {
        self.supers.contains_key(class)
    }

    /// Returns the interfaces a class directly implements.
    #[must_use]
    pub fn interfaces_of(&self, class: &ClassDescriptor) -> Vec<ClassDescriptor> {
        self.interfaces
            .get(class)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Returns the direct supertype of a class.
    ///
    /// # Errors
    ///
    /// [`Error::ClassNotFound`] if the class was never registered.
    pub fn super_class(&self, class: &ClassDescriptor) -> Result<Option<ClassDescriptor>> {
        self.supers
            .get(class)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ClassNotFound(class.clone()))
    }

    /// Returns `true` if `sub` is `sup` or a transitive subtype of it.
    ///
    /// Interface implementation counts as subtyping.
    ///
    /// # Errors
    ///
    /// [`Error::ClassNotFound`] if a class on the supertype chain was never
    /// registered; callers degrade to a conservative answer.
    pub fn is_subtype(&self, sub: &ClassDescriptor, sup: &ClassDescriptor) -> Result<bool> {
        if sup == &self.root {
            return Ok(true);
        }
        let mut current = Some(sub.clone());
        while let Some(class) = current {
            if &class == sup {
                return Ok(true);
            }
            if let Some(interfaces) = self.interfaces.get(&class) {
                for interface in interfaces.iter() {
                    if interface == sup || self.is_subtype(interface, sup)? {
                        return Ok(true);
                    }
                }
            }
            current = self.super_class(&class)?;
        }
        Ok(false)
    }

    /// Returns the least common superclass of two classes.
    ///
    /// Interfaces are not merged; when the chains only meet at the root, the
    /// root is the answer, mirroring how bytecode verifiers merge reference
    /// types.
    ///
    /// # Errors
    ///
    /// [`Error::ClassNotFound`] if a class on either chain was never
    /// registered.
    pub fn common_supertype(
        &self,
        a: &ClassDescriptor,
        b: &ClassDescriptor,
    ) -> Result<ClassDescriptor> {
        let mut ancestors = Vec::new();
        let mut current = Some(a.clone());
        while let Some(class) = current {
            ancestors.push(class.clone());
            current = self.super_class(&class)?;
        }
        let mut current = Some(b.clone());
        while let Some(class) = current {
            if ancestors.contains(&class) {
                return Ok(class);
            }
            current = self.super_class(&class)?;
        }
        Ok(self.root.clone())
    }
}

impl Default for ClassHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only, deduplicating collector for recoverable analysis errors.
///
/// Recoverable errors (missing classes, per-method build failures) are
/// collected here during the run instead of aborting it; the embedding tool
/// reads the report out at the end. Deduplication is by identity: one missing
/// class is reported once no matter how many call sites mention it, and one
/// failing method is reported once no matter how many analyses trip over it.
///
/// # Thread Safety
///
/// All methods take `&self`; the store is a lock-free append-only vector, so
/// parallel method workers report without contention.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    reports: boxcar::Vec<Error>,
    missing_classes: DashSet<ClassDescriptor>,
    failed_methods: DashSet<MethodDescriptor>,
}

impl ErrorCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports a missing class, deduplicated by descriptor.
    pub fn report_missing_class(&self, class: &ClassDescriptor) {
        if self.missing_classes.insert(class.clone()) {
            self.reports.push(Error::ClassNotFound(class.clone()));
        }
    }

    /// Reports a per-method analysis failure, deduplicated by method.
    ///
    /// The unprofitable marker is an expected outcome, not an error, and is
    /// never recorded.
    pub fn report_method_failure(&self, method: &MethodDescriptor, error: &Error) {
        if error.is_unprofitable() {
            return;
        }
        if self.failed_methods.insert(method.clone()) {
            self.reports.push(error.clone());
        }
    }

    /// Returns the number of collected reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.count()
    }

    /// Returns `true` if nothing has been reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.count() == 0
    }

    /// Iterates over the collected reports in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.reports.iter().map(|(_, error)| error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> ClassDescriptor {
        ClassDescriptor::new(name)
    }

    fn sample_hierarchy() -> ClassHierarchy {
        let hierarchy = ClassHierarchy::new();
        hierarchy.add_class(class("lang/Throwable"), None, Vec::new());
        hierarchy.add_class(
            class("lang/Exception"),
            Some(class("lang/Throwable")),
            Vec::new(),
        );
        hierarchy.add_class(
            class("io/IoException"),
            Some(class("lang/Exception")),
            Vec::new(),
        );
        hierarchy.add_class(
            class("util/List"),
            None,
            Vec::new(),
        );
        hierarchy.add_class(
            class("util/ArrayList"),
            None,
            vec![class("util/List")],
        );
        hierarchy
    }

    #[test]
    fn test_subtype_chain() {
        let h = sample_hierarchy();
        assert!(h.is_subtype(&class("io/IoException"), &class("lang/Throwable")).unwrap());
        assert!(!h.is_subtype(&class("lang/Throwable"), &class("io/IoException")).unwrap());
        // Everything is a subtype of the root.
        assert!(h.is_subtype(&class("util/List"), h.root()).unwrap());
    }

    #[test]
    fn test_interface_subtyping() {
        let h = sample_hierarchy();
        assert!(h.is_subtype(&class("util/ArrayList"), &class("util/List")).unwrap());
    }

    #[test]
    fn test_common_supertype() {
        let h = sample_hierarchy();
        assert_eq!(
            h.common_supertype(&class("io/IoException"), &class("lang/Exception"))
                .unwrap(),
            class("lang/Exception")
        );
        assert_eq!(
            h.common_supertype(&class("io/IoException"), &class("util/ArrayList"))
                .unwrap(),
            *h.root()
        );
    }

    #[test]
    fn test_unknown_class_is_error() {
        let h = sample_hierarchy();
        let err = h
            .is_subtype(&class("ghost/Phantom"), &class("lang/Exception"))
            .unwrap_err();
        assert!(matches!(err, Error::ClassNotFound(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_collector_dedupes_missing_classes() {
        let collector = ErrorCollector::new();
        let ghost = class("ghost/Phantom");
        collector.report_missing_class(&ghost);
        collector.report_missing_class(&ghost);
        collector.report_missing_class(&class("ghost/Other"));
        assert_eq!(collector.len(), 2);
    }
}
