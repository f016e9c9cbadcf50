//! Type tracking.
//!
//! Tracks an abstract type per frame slot. Reference types join to their
//! least common superclass through the class hierarchy; a class the hierarchy
//! does not know degrades the join to [`TypeFact::Any`] and is reported once
//! to the run's error collector rather than failing the method.

use std::fmt;
use std::sync::Arc;

use crate::{
    analysis::dataflow::{DataflowAnalysis, DataflowResult, Direction, Frame, Location},
    analysis::cfg::ControlFlowGraph,
    bytecode::{Instruction, MethodBody, Opcode, Operand},
    descriptor::ClassDescriptor,
    hierarchy::{ClassHierarchy, ErrorCollector},
    utils::graph::NodeId,
    Error, Result,
};

/// Abstract type of one frame slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeFact {
    /// The null reference; a subtype of every reference type for joins.
    Null,
    /// A primitive integer value.
    Int,
    /// A reference of (at most) the given class.
    Object(ClassDescriptor),
    /// Unknown type - the conservative answer.
    Any,
}

impl TypeFact {
    /// Returns `true` if the slot certainly holds a reference.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, TypeFact::Null | TypeFact::Object(_))
    }
}

impl fmt::Display for TypeFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFact::Null => f.write_str("null"),
            TypeFact::Int => f.write_str("int"),
            TypeFact::Object(class) => write!(f, "{class}"),
            TypeFact::Any => f.write_str("any"),
        }
    }
}

/// The type tracking dataflow analysis.
///
/// Depends on the run's [`ClassHierarchy`] (a class-level collaborator fully
/// built before method analysis starts) and reports unknown classes to the
/// [`ErrorCollector`].
pub struct TypeAnalysis {
    hierarchy: Arc<ClassHierarchy>,
    collector: Arc<ErrorCollector>,
    max_locals: u16,
    receiver: Option<ClassDescriptor>,
}

impl TypeAnalysis {
    /// Creates the analysis from its cache-resolved dependencies.
    ///
    /// `receiver` is the declaring class for instance methods (`None` for
    /// static ones); it types local slot 0 at entry.
    #[must_use]
    pub fn new(
        body: &MethodBody,
        receiver: Option<ClassDescriptor>,
        hierarchy: Arc<ClassHierarchy>,
        collector: Arc<ErrorCollector>,
    ) -> Self {
        Self {
            hierarchy,
            collector,
            max_locals: body.max_locals,
            receiver,
        }
    }

    fn underflow(&self, location: Location) -> Error {
        Error::GraphError(format!(
            "operand stack underflow at {location:?} during type analysis"
        ))
    }

    /// Joins two type facts, degrading to `Any` when the hierarchy cannot
    /// resolve the merge.
    fn join_types(&self, a: &TypeFact, b: &TypeFact) -> TypeFact {
        match (a, b) {
            (x, y) if x == y => x.clone(),
            (TypeFact::Null, TypeFact::Object(c)) | (TypeFact::Object(c), TypeFact::Null) => {
                TypeFact::Object(c.clone())
            }
            (TypeFact::Object(x), TypeFact::Object(y)) => {
                match self.hierarchy.common_supertype(x, y) {
                    Ok(common) => TypeFact::Object(common),
                    Err(Error::ClassNotFound(missing)) => {
                        self.collector.report_missing_class(&missing);
                        TypeFact::Any
                    }
                    Err(_) => TypeFact::Any,
                }
            }
            _ => TypeFact::Any,
        }
    }
}

impl DataflowAnalysis for TypeAnalysis {
    type Fact = Frame<TypeFact>;
    const DIRECTION: Direction = Direction::Forward;

    fn name(&self) -> &'static str {
        "type analysis"
    }

    fn boundary_fact(&mut self, _cfg: &ControlFlowGraph) -> Result<Frame<TypeFact>> {
        let mut locals = vec![TypeFact::Any; usize::from(self.max_locals)];
        if let Some(receiver) = &self.receiver {
            if !locals.is_empty() {
                locals[0] = TypeFact::Object(receiver.clone());
            }
        }
        // Argument slots past the receiver keep Any: the opaque signature
        // string is not parsed, so their declared types are unknown here.
        Ok(Frame::with_locals(locals))
    }

    fn initial_fact(&mut self, _cfg: &ControlFlowGraph) -> Frame<TypeFact> {
        Frame::top()
    }

    fn join_into(
        &mut self,
        fact: &Frame<TypeFact>,
        into: &mut Frame<TypeFact>,
        _at: NodeId,
    ) -> Result<bool> {
        let hierarchy_join = |mine: &mut TypeFact, theirs: &TypeFact| {
            let joined = self.join_types(mine, theirs);
            let changed = joined != *mine;
            *mine = joined;
            changed
        };
        into.join_with(fact, hierarchy_join).map_err(Error::GraphError)
    }

    fn transfer_instruction(
        &mut self,
        location: Location,
        instruction: &Instruction,
        fact: &mut Frame<TypeFact>,
    ) -> Result<()> {
        if fact.is_top() {
            return Ok(());
        }
        match instruction.opcode {
            Opcode::ConstNull => fact.push(TypeFact::Null),
            Opcode::PushInt => fact.push(TypeFact::Int),
            Opcode::Load => {
                let Operand::Local(slot) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let value = fact.local(slot).cloned().unwrap_or(TypeFact::Any);
                fact.push(value);
            }
            Opcode::Store => {
                let Operand::Local(slot) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                let value = fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.set_local(slot, value);
            }
            Opcode::Dup => {
                let top = fact.peek(0).cloned().ok_or_else(|| self.underflow(location))?;
                fact.push(top);
            }
            Opcode::Swap => {
                let a = fact.pop().ok_or_else(|| self.underflow(location))?;
                let b = fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.push(a);
                fact.push(b);
            }
            Opcode::New => {
                let Operand::Class(ref class) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                fact.push(TypeFact::Object(class.clone()));
            }
            Opcode::CheckCast => {
                let Operand::Class(ref class) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                fact.pop().ok_or_else(|| self.underflow(location))?;
                // After a successful cast the static type is the cast target.
                fact.push(TypeFact::Object(class.clone()));
            }
            Opcode::InstanceOf => {
                fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.push(TypeFact::Int);
            }
            Opcode::GetField | Opcode::GetStatic => {
                let Operand::Field(ref field) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                if instruction.opcode == Opcode::GetField {
                    fact.pop().ok_or_else(|| self.underflow(location))?;
                }
                let value = match &field.value_class {
                    Some(class) => TypeFact::Object(class.clone()),
                    None => TypeFact::Int,
                };
                fact.push(value);
            }
            Opcode::InvokeStatic | Opcode::InvokeVirtual => {
                let Operand::Method(ref callee) = instruction.operand else {
                    return Err(self.underflow(location));
                };
                for _ in 0..callee.arg_slots {
                    fact.pop().ok_or_else(|| self.underflow(location))?;
                }
                if callee.returns_value {
                    let value = match &callee.return_class {
                        Some(class) => TypeFact::Object(class.clone()),
                        None => TypeFact::Int,
                    };
                    fact.push(value);
                }
            }
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Rem
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor => {
                fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.push(TypeFact::Int);
            }
            Opcode::Neg => {
                fact.pop().ok_or_else(|| self.underflow(location))?;
                fact.push(TypeFact::Int);
            }
            _ => {
                let behavior = instruction.stack_behavior();
                for _ in 0..behavior.pops {
                    fact.pop().ok_or_else(|| self.underflow(location))?;
                }
                for _ in 0..behavior.pushes {
                    fact.push(TypeFact::Any);
                }
            }
        }
        Ok(())
    }
}

/// The cacheable type tracking result.
pub struct TypeDataflow {
    dataflow: DataflowResult<Frame<TypeFact>>,
}

impl TypeDataflow {
    /// Wraps a solved dataflow result.
    #[must_use]
    pub fn new(dataflow: DataflowResult<Frame<TypeFact>>) -> Self {
        Self { dataflow }
    }

    /// Returns the block-level dataflow result.
    #[must_use]
    pub fn dataflow(&self) -> &DataflowResult<Frame<TypeFact>> {
        &self.dataflow
    }
}

impl fmt::Debug for TypeDataflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDataflow")
            .field("nodes", &self.dataflow.node_count())
            .field("iterations", &self.dataflow.iterations())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_null_with_object_keeps_object() {
        let hierarchy = Arc::new(ClassHierarchy::new());
        hierarchy.add_class(ClassDescriptor::new("pkg/Widget"), None, Vec::new());
        let collector = Arc::new(ErrorCollector::new());
        let body = MethodBody {
            instructions: Vec::new(),
            exception_handlers: Vec::new(),
            max_locals: 0,
            num_args: 0,
        };
        let analysis = TypeAnalysis::new(&body, None, hierarchy, collector);

        let widget = TypeFact::Object(ClassDescriptor::new("pkg/Widget"));
        assert_eq!(analysis.join_types(&TypeFact::Null, &widget), widget);
        assert_eq!(analysis.join_types(&widget, &widget), widget);
        assert_eq!(
            analysis.join_types(&TypeFact::Int, &widget),
            TypeFact::Any
        );
    }

    #[test]
    fn test_unknown_class_degrades_and_reports() {
        let hierarchy = Arc::new(ClassHierarchy::new());
        hierarchy.add_class(ClassDescriptor::new("pkg/Known"), None, Vec::new());
        let collector = Arc::new(ErrorCollector::new());
        let body = MethodBody {
            instructions: Vec::new(),
            exception_handlers: Vec::new(),
            max_locals: 0,
            num_args: 0,
        };
        let analysis =
            TypeAnalysis::new(&body, None, hierarchy, Arc::clone(&collector));

        let known = TypeFact::Object(ClassDescriptor::new("pkg/Known"));
        let ghost = TypeFact::Object(ClassDescriptor::new("pkg/Ghost"));
        assert_eq!(analysis.join_types(&known, &ghost), TypeFact::Any);
        // Reported once, even if the join repeats.
        let _ = analysis.join_types(&known, &ghost);
        assert_eq!(collector.len(), 1);
    }
}
