//! A fixed-capacity bit vector for dataflow set facts.
//!
//! Reachability-style analyses track sets of entities identified by small
//! integers (local slots, definition sites, block ids). `BitSet` stores 64
//! elements per word and implements the set algebra those analyses need, with
//! each in-place operation reporting whether it changed anything so the
//! fixed-point solver can detect stabilization cheaply.

/// A fixed-capacity bit vector.
///
/// Capacity is set at construction and never grows; all binary operations
/// require both operands to have the same capacity.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BitSet {
    words: Vec<u64>,
    capacity: usize,
}

impl BitSet {
    /// Creates an empty set able to hold indices `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Creates a set with every index in `0..capacity` present.
    #[must_use]
    pub fn full(capacity: usize) -> Self {
        let mut set = Self {
            words: vec![u64::MAX; capacity.div_ceil(64)],
            capacity,
        };
        set.clear_excess_bits();
        set
    }

    fn clear_excess_bits(&mut self) {
        let tail = self.capacity % 64;
        if tail != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
    }

    /// Returns the capacity of the set.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no index is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Returns the number of indices present.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Adds an index to the set.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.capacity()`.
    pub fn insert(&mut self, index: usize) {
        assert!(index < self.capacity, "bit index out of bounds");
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Removes an index from the set.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.capacity()`.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.capacity, "bit index out of bounds");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Returns `true` if the index is present.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.capacity()`.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        assert!(index < self.capacity, "bit index out of bounds");
        (self.words[index / 64] >> (index % 64)) & 1 != 0
    }

    /// Removes every index.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Adds every index from `other`; returns `true` if this set changed.
    pub fn union_with(&mut self, other: &Self) -> bool {
        debug_assert_eq!(self.capacity, other.capacity);
        let mut changed = false;
        for (word, &other_word) in self.words.iter_mut().zip(&other.words) {
            let merged = *word | other_word;
            changed |= merged != *word;
            *word = merged;
        }
        changed
    }

    /// Keeps only indices also in `other`; returns `true` if this set changed.
    pub fn intersect_with(&mut self, other: &Self) -> bool {
        debug_assert_eq!(self.capacity, other.capacity);
        let mut changed = false;
        for (word, &other_word) in self.words.iter_mut().zip(&other.words) {
            let kept = *word & other_word;
            changed |= kept != *word;
            *word = kept;
        }
        changed
    }

    /// Removes every index present in `other`; returns `true` if this set changed.
    pub fn difference_with(&mut self, other: &Self) -> bool {
        debug_assert_eq!(self.capacity, other.capacity);
        let mut changed = false;
        for (word, &other_word) in self.words.iter_mut().zip(&other.words) {
            let kept = *word & !other_word;
            changed |= kept != *word;
            *word = kept;
        }
        changed
    }

    /// Returns `true` if every index of this set is also in `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        debug_assert_eq!(self.capacity, other.capacity);
        self.words
            .iter()
            .zip(&other.words)
            .all(|(&a, &b)| a & !b == 0)
    }

    /// Iterates over the present indices in increasing order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            set: self,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Debug for BitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Iterator over the indices present in a [`BitSet`].
pub struct BitSetIter<'a> {
    set: &'a BitSet,
    word_index: usize,
    current: u64,
}

impl Iterator for BitSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.current == 0 {
            self.word_index += 1;
            self.current = *self.set.words.get(self.word_index)?;
        }
        let bit = self.current.trailing_zeros() as usize;
        self.current &= self.current - 1;
        Some(self.word_index * 64 + bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_contains_remove() {
        let mut set = BitSet::new(130);
        set.insert(0);
        set.insert(64);
        set.insert(129);
        assert!(set.contains(0));
        assert!(set.contains(64));
        assert!(set.contains(129));
        assert!(!set.contains(1));
        assert_eq!(set.count(), 3);

        set.remove(64);
        assert!(!set.contains(64));
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn test_full_clears_excess_bits() {
        let set = BitSet::full(70);
        assert_eq!(set.count(), 70);
        assert_eq!(set.iter().max(), Some(69));
    }

    #[test]
    fn test_union_reports_change() {
        let mut a = BitSet::new(10);
        let mut b = BitSet::new(10);
        a.insert(1);
        b.insert(2);
        assert!(a.union_with(&b));
        assert!(!a.union_with(&b));
        assert_eq!(a.count(), 2);
    }

    #[test]
    fn test_intersection_and_difference() {
        let mut a = BitSet::new(8);
        let mut b = BitSet::new(8);
        for i in 0..6 {
            a.insert(i);
        }
        for i in 3..8 {
            b.insert(i);
        }
        let mut inter = a.clone();
        assert!(inter.intersect_with(&b));
        assert_eq!(inter.iter().collect::<Vec<_>>(), vec![3, 4, 5]);

        assert!(a.difference_with(&b));
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_subset() {
        let mut a = BitSet::new(8);
        let mut b = BitSet::new(8);
        a.insert(2);
        b.insert(2);
        b.insert(5);
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
    }

    #[test]
    fn test_iteration_order() {
        let mut set = BitSet::new(200);
        for idx in [5, 63, 64, 127, 199] {
            set.insert(idx);
        }
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![5, 63, 64, 127, 199]);
    }
}
