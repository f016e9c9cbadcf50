//! Lock-state tracking.
//!
//! Counts, per abstract value, how many times its monitor is held at each
//! program point. Two acquisitions of "the same lock" are recognized through
//! value numbering: `monitorenter` on two expressions with one value number is
//! a re-entrant acquisition of one monitor, not two monitors. Detectors use
//! the per-point lock sets to find unbalanced locking and waits on the wrong
//! monitor.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        dataflow::{DataflowAnalysis, DataflowResult, Direction, Location},
        vna::{ValueNumber, ValueNumbering},
    },
    bytecode::{Instruction, Opcode},
    utils::graph::NodeId,
    Result,
};

/// Lock counts per monitor value at one program point.
///
/// `Top` is the join identity ("no path reached here"); `Conflict` records
/// that two paths disagreed on a count, after which the set carries no usable
/// information for the affected monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockSet {
    counts: BTreeMap<ValueNumber, i32>,
    top: bool,
    conflict: bool,
}

impl LockSet {
    /// The join identity.
    #[must_use]
    pub fn top() -> Self {
        Self {
            counts: BTreeMap::new(),
            top: true,
            conflict: false,
        }
    }

    /// The empty lock set (method entry: nothing held).
    #[must_use]
    pub fn empty() -> Self {
        Self {
            counts: BTreeMap::new(),
            top: false,
            conflict: false,
        }
    }

    /// Returns the held count for a monitor value (zero when absent).
    #[must_use]
    pub fn count(&self, value: ValueNumber) -> i32 {
        self.counts.get(&value).copied().unwrap_or(0)
    }

    /// Returns the total number of monitors held at this point.
    #[must_use]
    pub fn total_held(&self) -> i32 {
        self.counts.values().copied().filter(|&c| c > 0).sum()
    }

    /// Returns `true` if any path disagreement poisoned this set.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        self.conflict
    }

    /// Returns `true` if this is the join identity.
    #[must_use]
    pub fn is_top(&self) -> bool {
        self.top
    }

    fn acquire(&mut self, value: ValueNumber) {
        *self.counts.entry(value).or_insert(0) += 1;
    }

    fn release(&mut self, value: ValueNumber) {
        let entry = self.counts.entry(value).or_insert(0);
        *entry -= 1;
        // A zero count carries no information; dropping it keeps exit sets
        // of balanced methods structurally empty.
        if *entry == 0 {
            self.counts.remove(&value);
        }
    }
}

/// The lock-state dataflow analysis.
///
/// Depends on the method's [`ValueNumbering`], resolved through the analysis
/// cache.
pub struct LockAnalysis {
    vna: Arc<ValueNumbering>,
    cfg: Arc<ControlFlowGraph>,
}

impl LockAnalysis {
    /// Creates the analysis from its cache-resolved dependencies.
    #[must_use]
    pub fn new(cfg: Arc<ControlFlowGraph>, vna: Arc<ValueNumbering>) -> Self {
        Self { vna, cfg }
    }

    fn monitor_value(&self, location: Location) -> Result<Option<ValueNumber>> {
        self.vna.value_before(&self.cfg, location, 0)
    }
}

impl DataflowAnalysis for LockAnalysis {
    type Fact = LockSet;
    const DIRECTION: Direction = Direction::Forward;

    fn name(&self) -> &'static str {
        "lock set analysis"
    }

    fn boundary_fact(&mut self, _cfg: &ControlFlowGraph) -> Result<LockSet> {
        Ok(LockSet::empty())
    }

    fn initial_fact(&mut self, _cfg: &ControlFlowGraph) -> LockSet {
        LockSet::top()
    }

    fn join_into(&mut self, fact: &LockSet, into: &mut LockSet, _at: NodeId) -> Result<bool> {
        if fact.top {
            return Ok(false);
        }
        if into.top {
            *into = fact.clone();
            return Ok(true);
        }
        let mut changed = false;
        if fact.conflict && !into.conflict {
            into.conflict = true;
            changed = true;
        }
        // Counts that agree survive; disagreement poisons the entry.
        let keys: Vec<ValueNumber> = into
            .counts
            .keys()
            .chain(fact.counts.keys())
            .copied()
            .collect();
        for key in keys {
            let mine = into.count(key);
            let theirs = fact.count(key);
            if mine != theirs {
                into.counts.remove(&key);
                into.conflict = true;
                changed = true;
            }
        }
        Ok(changed)
    }

    fn transfer_instruction(
        &mut self,
        location: Location,
        instruction: &Instruction,
        fact: &mut LockSet,
    ) -> Result<()> {
        if fact.top {
            return Ok(());
        }
        match instruction.opcode {
            Opcode::MonitorEnter => {
                if let Some(value) = self.monitor_value(location)? {
                    fact.acquire(value);
                }
            }
            Opcode::MonitorExit => {
                if let Some(value) = self.monitor_value(location)? {
                    fact.release(value);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// The cacheable lock-state result.
pub struct LockDataflow {
    dataflow: DataflowResult<LockSet>,
}

impl LockDataflow {
    /// Wraps a solved dataflow result.
    #[must_use]
    pub fn new(dataflow: DataflowResult<LockSet>) -> Self {
        Self { dataflow }
    }

    /// Returns the block-level dataflow result.
    #[must_use]
    pub fn dataflow(&self) -> &DataflowResult<LockSet> {
        &self.dataflow
    }

    /// Returns the lock set at the entry of the synthetic exit node: the
    /// monitors still held when the method leaves normally or abruptly.
    #[must_use]
    pub fn at_exit(&self, cfg: &ControlFlowGraph) -> Option<&LockSet> {
        self.dataflow.entry_fact(cfg.exit())
    }
}

impl fmt::Debug for LockDataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockDataflow")
            .field("nodes", &self.dataflow.node_count())
            .field("iterations", &self.dataflow.iterations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockset_balanced_release_is_empty() {
        let mut set = LockSet::empty();
        let vn = ValueNumber::from_raw(3);
        set.acquire(vn);
        set.acquire(vn);
        assert_eq!(set.count(vn), 2);
        set.release(vn);
        set.release(vn);
        assert_eq!(set.count(vn), 0);
        assert_eq!(set.total_held(), 0);
        assert_eq!(set, LockSet::empty());
    }

    #[test]
    fn test_top_is_join_identity() {
        let top = LockSet::top();
        assert!(top.is_top());
        assert!(!top.is_conflict());
        assert_eq!(top.total_held(), 0);
        assert_ne!(top, LockSet::empty());
    }
}
