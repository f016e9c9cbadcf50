//! Value numbering.
//!
//! Assigns an abstract [`ValueNumber`] to every value the method manipulates,
//! such that two expressions holding the same number are guaranteed to denote
//! the same runtime value. Downstream analyses use this to relate program
//! points: lock tracking recognizes that two `monitorenter` operands are the
//! same monitor, and nullness refinement knows which slots hold the value a
//! null test just examined.
//!
//! # Numbering discipline
//!
//! - Parameters and uninitialized locals get one number per slot, fixed at
//!   entry.
//! - Constants are interned by value; pure unary/binary operators are
//!   hash-consed over their operand numbers (commutative operators normalize
//!   operand order).
//! - Opaque producers (allocations, call results, unmatched field loads) get
//!   one number per *site*, so recomputing a block is idempotent.
//! - Merging different numbers at a join produces a *merge number* keyed by
//!   `(node, slot)` - stable across solver iterations, which is what makes
//!   the fixed point terminate.
//! - Field loads are tracked as available loads in the fact itself: a load of
//!   `o.f` reuses the previous number while no store or call intervened on
//!   the path, and joins intersect the availability maps.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        dataflow::{DataflowAnalysis, DataflowResult, Direction, Frame, Location},
    },
    bytecode::{Instruction, MethodBody, Opcode, Operand},
    utils::graph::NodeId,
    Error, Result,
};

/// An abstract value identity; equal numbers denote equal runtime values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueNumber(u32);

impl ValueNumber {
    /// Returns the raw number.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Builds a number from its raw form. Crate-internal; numbers are only
    /// meaningful relative to the table that minted them.
    #[must_use]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        ValueNumber(raw)
    }
}

impl fmt::Debug for ValueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vn{}", self.0)
    }
}

impl fmt::Display for ValueNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vn{}", self.0)
    }
}

/// Identifies one slot of a frame at a merge point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MergeSlot {
    Local(u16),
    Stack(usize),
}

/// A field identity for available-load tracking.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct FieldKey {
    class: String,
    name: String,
}

/// Source of an available load: optional receiver number plus field identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct LoadKey {
    receiver: Option<ValueNumber>,
    field: FieldKey,
}

/// The value numbering fact: a frame of numbers plus the available loads.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFrame {
    frame: Frame<ValueNumber>,
    loads: BTreeMap<LoadKey, ValueNumber>,
}

impl ValueFrame {
    fn top() -> Self {
        Self {
            frame: Frame::top(),
            loads: BTreeMap::new(),
        }
    }

    /// Returns the number held by a local slot.
    #[must_use]
    pub fn local(&self, slot: u16) -> Option<ValueNumber> {
        self.frame.local(slot).copied()
    }

    /// Returns the number `depth` entries below the top of stack.
    #[must_use]
    pub fn stack_top(&self, depth: usize) -> Option<ValueNumber> {
        self.frame.peek(depth).copied()
    }

    /// Returns the operand stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.frame.stack_depth()
    }

    /// Returns the underlying frame.
    #[must_use]
    pub fn frame(&self) -> &Frame<ValueNumber> {
        &self.frame
    }

    /// Returns `true` if no path has reached this point yet.
    #[must_use]
    pub fn is_top(&self) -> bool {
        self.frame.is_top()
    }
}

/// Interning tables shared across one method's numbering.
#[derive(Debug, Default)]
struct ValueTable {
    next: u32,
    null_value: Option<ValueNumber>,
    constants: HashMap<i64, ValueNumber>,
    parameters: HashMap<u16, ValueNumber>,
    unary: HashMap<(Opcode, ValueNumber), ValueNumber>,
    binary: HashMap<(Opcode, ValueNumber, ValueNumber), ValueNumber>,
    sites: HashMap<Location, ValueNumber>,
    merges: HashMap<(NodeId, MergeSlot), ValueNumber>,
}

impl ValueTable {
    fn fresh(&mut self) -> ValueNumber {
        let number = ValueNumber(self.next);
        self.next += 1;
        number
    }

    fn null(&mut self) -> ValueNumber {
        if let Some(number) = self.null_value {
            return number;
        }
        let number = self.fresh();
        self.null_value = Some(number);
        number
    }

    fn constant(&mut self, value: i64) -> ValueNumber {
        if let Some(&number) = self.constants.get(&value) {
            return number;
        }
        let number = self.fresh();
        self.constants.insert(value, number);
        number
    }

    fn parameter(&mut self, slot: u16) -> ValueNumber {
        if let Some(&number) = self.parameters.get(&slot) {
            return number;
        }
        let number = self.fresh();
        self.parameters.insert(slot, number);
        number
    }

    fn unary(&mut self, opcode: Opcode, operand: ValueNumber) -> ValueNumber {
        if let Some(&number) = self.unary.get(&(opcode, operand)) {
            return number;
        }
        let number = self.fresh();
        self.unary.insert((opcode, operand), number);
        number
    }

    fn binary(&mut self, opcode: Opcode, a: ValueNumber, b: ValueNumber) -> ValueNumber {
        let (a, b) = if Self::commutative(opcode) && b < a {
            (b, a)
        } else {
            (a, b)
        };
        if let Some(&number) = self.binary.get(&(opcode, a, b)) {
            return number;
        }
        let number = self.fresh();
        self.binary.insert((opcode, a, b), number);
        number
    }

    fn site(&mut self, location: Location) -> ValueNumber {
        if let Some(&number) = self.sites.get(&location) {
            return number;
        }
        let number = self.fresh();
        self.sites.insert(location, number);
        number
    }

    fn merge(&mut self, node: NodeId, slot: MergeSlot) -> ValueNumber {
        if let Some(&number) = self.merges.get(&(node, slot)) {
            return number;
        }
        let number = self.fresh();
        self.merges.insert((node, slot), number);
        number
    }

    fn commutative(opcode: Opcode) -> bool {
        matches!(
            opcode,
            Opcode::Add | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor
        )
    }
}

/// The value numbering dataflow analysis.
pub struct ValueNumberAnalysis {
    table: ValueTable,
    max_locals: u16,
}

impl ValueNumberAnalysis {
    /// Creates the analysis for a method body.
    #[must_use]
    pub fn new(body: &MethodBody) -> Self {
        Self {
            table: ValueTable::default(),
            max_locals: body.max_locals,
        }
    }

    /// Returns how many distinct numbers were handed out so far.
    #[must_use]
    pub fn distinct_values(&self) -> usize {
        self.table.next as usize
    }

    fn underflow(&self, location: Location) -> Error {
        Error::GraphError(format!(
            "operand stack underflow at {:?} during value numbering",
            location
        ))
    }
}

impl DataflowAnalysis for ValueNumberAnalysis {
    type Fact = ValueFrame;
    const DIRECTION: Direction = Direction::Forward;

    fn name(&self) -> &'static str {
        "value numbering"
    }

    fn boundary_fact(&mut self, _cfg: &ControlFlowGraph) -> Result<ValueFrame> {
        let mut locals = Vec::with_capacity(usize::from(self.max_locals));
        for slot in 0..self.max_locals {
            // One fixed number per slot; arguments and uninitialized locals
            // are indistinguishable to the numbering, both are opaque.
            locals.push(self.table.parameter(slot));
        }
        Ok(ValueFrame {
            frame: Frame::with_locals(locals),
            loads: BTreeMap::new(),
        })
    }

    fn initial_fact(&mut self, _cfg: &ControlFlowGraph) -> ValueFrame {
        ValueFrame::top()
    }

    fn join_into(&mut self, fact: &ValueFrame, into: &mut ValueFrame, at: NodeId) -> Result<bool> {
        if fact.is_top() {
            return Ok(false);
        }
        if into.is_top() {
            *into = fact.clone();
            return Ok(true);
        }

        // Slot-wise: equal numbers survive, unequal numbers become the merge
        // number of this (node, slot) - stable across iterations.
        let mut changed = false;
        for slot in 0..into.frame.num_locals() {
            let slot = u16::try_from(slot).unwrap_or(u16::MAX);
            let (Some(mine), Some(theirs)) = (into.local(slot), fact.local(slot)) else {
                continue;
            };
            if mine != theirs {
                let merged = self.table.merge(at, MergeSlot::Local(slot));
                if mine != merged {
                    into.frame.set_local(slot, merged);
                    changed = true;
                }
            }
        }
        if into.frame.stack_depth() != fact.frame.stack_depth() {
            return Err(Error::GraphError(format!(
                "stack depth mismatch at merge: {} vs {}",
                into.frame.stack_depth(),
                fact.frame.stack_depth()
            )));
        }
        for index in 0..into.frame.stack_depth() {
            let (Some(&mine), Some(&theirs)) =
                (into.frame.stack_at(index), fact.frame.stack_at(index))
            else {
                continue;
            };
            if mine != theirs {
                let merged = self.table.merge(at, MergeSlot::Stack(index));
                if mine != merged {
                    into.frame.set_stack(index, merged);
                    changed = true;
                }
            }
        }

        // Available loads merge by intersection: a load survives a join only
        // if both paths agree on its number.
        let before = into.loads.len();
        into.loads
            .retain(|key, number| fact.loads.get(key).copied() == Some(*number));
        changed |= into.loads.len() != before;

        Ok(changed)
    }

    fn transfer_instruction(
        &mut self,
        location: Location,
        instruction: &Instruction,
        fact: &mut ValueFrame,
    ) -> Result<()> {
        if fact.is_top() {
            return Ok(());
        }
        let frame = &mut fact.frame;
        match instruction.opcode {
            Opcode::Nop | Opcode::Goto | Opcode::Return => {}
            Opcode::ConstNull => {
                let number = self.table.null();
                frame.push(number);
            }
            Opcode::PushInt => {
                let Operand::Int(value) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let number = self.table.constant(value);
                frame.push(number);
            }
            Opcode::Load => {
                let Operand::Local(slot) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let number = frame
                    .local(slot)
                    .copied()
                    .unwrap_or_else(|| self.table.site(location));
                frame.push(number);
            }
            Opcode::Store => {
                let Operand::Local(slot) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let number = frame.pop().ok_or_else(|| self.underflow(location))?;
                frame.set_local(slot, number);
            }
            Opcode::Dup => {
                let top = *frame.peek(0).ok_or_else(|| self.underflow(location))?;
                frame.push(top);
            }
            Opcode::Pop => {
                frame.pop().ok_or_else(|| self.underflow(location))?;
            }
            Opcode::Swap => {
                let a = frame.pop().ok_or_else(|| self.underflow(location))?;
                let b = frame.pop().ok_or_else(|| self.underflow(location))?;
                frame.push(a);
                frame.push(b);
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => {
                let b = frame.pop().ok_or_else(|| self.underflow(location))?;
                let a = frame.pop().ok_or_else(|| self.underflow(location))?;
                let number = self.table.binary(instruction.opcode, a, b);
                frame.push(number);
            }
            Opcode::Neg | Opcode::InstanceOf => {
                let operand = frame.pop().ok_or_else(|| self.underflow(location))?;
                let number = self.table.unary(instruction.opcode, operand);
                frame.push(number);
            }
            // A cast returns the identical reference.
            Opcode::CheckCast => {}
            Opcode::IfNull
            | Opcode::IfNonNull
            | Opcode::IfZero
            | Opcode::IfNonZero
            | Opcode::Switch
            | Opcode::ReturnValue
            | Opcode::Throw
            | Opcode::MonitorEnter
            | Opcode::MonitorExit => {
                frame.pop().ok_or_else(|| self.underflow(location))?;
            }
            Opcode::IfCmpEq | Opcode::IfCmpNe | Opcode::IfCmpLt | Opcode::IfCmpGe => {
                frame.pop().ok_or_else(|| self.underflow(location))?;
                frame.pop().ok_or_else(|| self.underflow(location))?;
            }
            Opcode::New => {
                let number = self.table.site(location);
                frame.push(number);
            }
            Opcode::GetField | Opcode::GetStatic => {
                let Operand::Field(ref field) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let receiver = if instruction.opcode == Opcode::GetField {
                    Some(frame.pop().ok_or_else(|| self.underflow(location))?)
                } else {
                    None
                };
                let key = LoadKey {
                    receiver,
                    field: FieldKey {
                        class: field.class.name().to_string(),
                        name: field.name.clone(),
                    },
                };
                let number = match fact.loads.get(&key) {
                    Some(&number) => number,
                    None => {
                        let number = self.table.site(location);
                        fact.loads.insert(key, number);
                        number
                    }
                };
                fact.frame.push(number);
            }
            Opcode::PutField | Opcode::PutStatic => {
                let Operand::Field(ref field) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let value = frame.pop().ok_or_else(|| self.underflow(location))?;
                let receiver = if instruction.opcode == Opcode::PutField {
                    Some(frame.pop().ok_or_else(|| self.underflow(location))?)
                } else {
                    None
                };
                // The store invalidates every tracked load of this field
                // (aliasing receivers are indistinguishable), then forwards
                // the stored number.
                let stored_field = FieldKey {
                    class: field.class.name().to_string(),
                    name: field.name.clone(),
                };
                fact.loads.retain(|key, _| key.field != stored_field);
                fact.loads.insert(
                    LoadKey {
                        receiver,
                        field: stored_field,
                    },
                    value,
                );
            }
            Opcode::InvokeStatic | Opcode::InvokeVirtual => {
                let Operand::Method(ref callee) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                for _ in 0..callee.arg_slots {
                    frame.pop().ok_or_else(|| self.underflow(location))?;
                }
                if callee.returns_value {
                    let number = self.table.site(location);
                    frame.push(number);
                }
                // The callee may write any field.
                fact.loads.clear();
            }
        }
        Ok(())
    }
}

/// The cacheable value numbering result.
///
/// Wraps the dataflow result with replay-based per-instruction queries. The
/// interning tables are kept behind a mutex solely for those replays; results
/// are never mutated observably (replays only ever hit site-keyed entries
/// already created during solving).
pub struct ValueNumbering {
    dataflow: DataflowResult<ValueFrame>,
    analysis: std::sync::Mutex<ValueNumberAnalysis>,
}

impl ValueNumbering {
    /// Wraps a solved dataflow result with its analysis tables.
    #[must_use]
    pub fn new(dataflow: DataflowResult<ValueFrame>, analysis: ValueNumberAnalysis) -> Self {
        Self {
            dataflow,
            analysis: std::sync::Mutex::new(analysis),
        }
    }

    /// Returns the block-level dataflow result.
    #[must_use]
    pub fn dataflow(&self) -> &DataflowResult<ValueFrame> {
        &self.dataflow
    }

    /// Returns the frame in effect immediately before the instruction at
    /// `location`.
    ///
    /// # Errors
    ///
    /// [`Error::LockError`] if the table mutex is poisoned; dataflow errors
    /// if the replayed transfers fail (they cannot, on a solved result).
    pub fn frame_before(
        &self,
        cfg: &ControlFlowGraph,
        location: Location,
    ) -> Result<Option<ValueFrame>> {
        let mut analysis = self.analysis.lock().map_err(|_| Error::LockError)?;
        self.dataflow
            .fact_before_instruction(&mut *analysis, cfg, location)
    }

    /// Returns the number of the value `depth` entries below the stack top
    /// immediately before the instruction at `location`.
    pub fn value_before(
        &self,
        cfg: &ControlFlowGraph,
        location: Location,
        depth: usize,
    ) -> Result<Option<ValueNumber>> {
        Ok(self
            .frame_before(cfg, location)?
            .and_then(|frame| frame.stack_top(depth)))
    }
}

impl fmt::Debug for ValueNumbering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueNumbering")
            .field("nodes", &self.dataflow.node_count())
            .field("iterations", &self.dataflow.iterations())
            .finish()
    }
}
