//! Lattice traits for dataflow facts.
//!
//! A dataflow fact must form a join-semilattice: a partial order with a join
//! (least upper bound) and a bottom element, so that the fixed-point solver is
//! guaranteed to terminate when transfer functions are monotone.
//!
//! The join used at control flow merge points is defined *on the analysis*
//! (see [`DataflowAnalysis::join_into`](crate::analysis::dataflow::DataflowAnalysis::join_into)),
//! not on the fact type, because the same representation joins differently in
//! different analyses: a [`BitSet`] joins by union in a may-analysis (live
//! stores) and by intersection in a must-analysis (available facts). The
//! traits here exist for fact types with a single canonical join, and the
//! [`BitSet`] helpers implement both conventions explicitly.

use crate::utils::bitset::BitSet;

/// A join-semilattice element with a canonical join.
///
/// The join must be idempotent, commutative and associative; `join_with`
/// returns `true` when the receiver changed, which is how the solver detects
/// stabilization without an extra comparison.
pub trait JoinSemiLattice: Clone + PartialEq + std::fmt::Debug {
    /// Joins `other` into `self`; returns `true` if `self` changed.
    fn join_with(&mut self, other: &Self) -> bool;
}

/// Union-join wrapper semantics for [`BitSet`] (may-analysis convention).
///
/// The element grows toward the full set; lattice height is the capacity.
pub fn union_join(into: &mut BitSet, other: &BitSet) -> bool {
    into.union_with(other)
}

/// Intersection-join wrapper semantics for [`BitSet`] (must-analysis
/// convention).
///
/// The element shrinks toward the empty set; the identity for this join is
/// the full set.
pub fn intersect_join(into: &mut BitSet, other: &BitSet) -> bool {
    into.intersect_with(other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_join_grows() {
        let mut a = BitSet::new(8);
        let mut b = BitSet::new(8);
        a.insert(1);
        b.insert(2);
        assert!(union_join(&mut a, &b));
        assert!(a.contains(1) && a.contains(2));
        assert!(!union_join(&mut a, &b));
    }

    #[test]
    fn test_intersect_join_shrinks() {
        let mut a = BitSet::full(8);
        let mut b = BitSet::new(8);
        b.insert(3);
        assert!(intersect_join(&mut a, &b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![3]);
    }
}
