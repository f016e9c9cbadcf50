//! Generic dataflow engine integration tests.
//!
//! Checks the solver-level properties the concrete analyses rely on:
//! idempotent re-execution, monotone convergence within the lattice-height
//! bound, and identical behavior across fact shapes (bit sets and frames).

use bytescope::{
    analysis::{
        CfgBuilder, ConstantAnalysis, ControlFlowGraph, DataflowSolver, LiveStoreAnalysis,
    },
    prelude::*,
};

fn method(name: &str) -> MethodDescriptor {
    MethodDescriptor::new(&ClassDescriptor::new("pkg/Flow"), name, "()V", true)
}

/// A diamond with a loop around one arm - enough structure to need real
/// fixed-point iteration.
fn loopy_body() -> MethodBody {
    let mut asm = BodyAssembler::new(1, 2);
    asm.emit_push_int(0);
    asm.emit_store(1);
    asm.define_label("head").unwrap();
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfZero, "done");
    asm.emit_load(1);
    asm.emit_push_int(1);
    asm.emit(Opcode::Add);
    asm.emit_store(1);
    asm.emit_load(0);
    asm.emit_push_int(1);
    asm.emit(Opcode::Sub);
    asm.emit_store(0);
    asm.emit_branch(Opcode::Goto, "head");
    asm.define_label("done").unwrap();
    asm.emit_load(1);
    asm.emit(Opcode::ReturnValue);
    asm.finish().unwrap()
}

fn build(body: &MethodBody, name: &str) -> ControlFlowGraph {
    CfgBuilder::build(&method(name), body).unwrap()
}

#[test]
fn re_execution_reproduces_identical_facts() {
    let body = loopy_body();
    let cfg = build(&body, "loopy");

    let mut first_analysis = ConstantAnalysis::new(&body);
    let first = DataflowSolver::execute(&cfg, &mut first_analysis, &method("loopy")).unwrap();
    let mut second_analysis = ConstantAnalysis::new(&body);
    let second = DataflowSolver::execute(&cfg, &mut second_analysis, &method("loopy")).unwrap();

    for node in cfg.node_ids() {
        assert_eq!(first.entry_fact(node), second.entry_fact(node));
        assert_eq!(first.exit_fact(node), second.exit_fact(node));
    }
}

#[test]
fn convergence_stays_within_the_lattice_bound() {
    let body = loopy_body();
    let cfg = build(&body, "loopy");

    // Constant propagation has lattice height 2 per slot; the iteration
    // count must stay well under height x node count, with slack for the
    // initial seeding pass.
    let mut analysis = ConstantAnalysis::new(&body);
    let result = DataflowSolver::execute(&cfg, &mut analysis, &method("loopy")).unwrap();
    let slots = usize::from(body.max_locals) + 4;
    let bound = 2 * slots * cfg.node_count() + cfg.node_count();
    assert!(
        result.iterations() <= bound,
        "{} iterations exceeds bound {bound}",
        result.iterations()
    );
}

#[test]
fn loop_counter_is_not_constant_but_unrelated_slot_is() {
    let mut asm = BodyAssembler::new(1, 3);
    asm.emit_push_int(7);
    asm.emit_store(2);
    asm.define_label("head").unwrap();
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfZero, "done");
    asm.emit_load(0);
    asm.emit_push_int(1);
    asm.emit(Opcode::Sub);
    asm.emit_store(0);
    asm.emit_branch(Opcode::Goto, "head");
    asm.define_label("done").unwrap();
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cfg = build(&body, "mixed");

    let mut analysis = ConstantAnalysis::new(&body);
    let result = DataflowSolver::execute(&cfg, &mut analysis, &method("mixed")).unwrap();
    let done = cfg
        .blocks()
        .find(|(_, b)| {
            b.first_instruction()
                .is_some_and(|i| i.opcode == Opcode::Return)
        })
        .map(|(n, _)| n)
        .unwrap();
    let fact = result.entry_fact(done).unwrap();
    // Slot 2 is set once before the loop; slot 0 is decremented inside it.
    assert_eq!(fact.local(2), Some(&ConstantFact::Value(7)));
    assert_eq!(fact.local(0), Some(&ConstantFact::Varying));
}

#[test]
fn backward_bitset_analysis_converges_on_loops() {
    let body = loopy_body();
    let cfg = build(&body, "loopy");

    let mut analysis = LiveStoreAnalysis::new(&body);
    let result = DataflowSolver::execute(&cfg, &mut analysis, &method("loopy")).unwrap();

    // The loop counter (slot 1) is live at the loop head: it is read both by
    // the increment and the final return.
    let head = cfg
        .blocks()
        .find(|(_, b)| {
            b.last_instruction()
                .is_some_and(|i| i.opcode == Opcode::IfZero)
        })
        .map(|(n, _)| n)
        .unwrap();
    let live_at_head = result.entry_fact(head).unwrap();
    assert!(live_at_head.contains(1));
}

#[test]
fn facts_grow_monotonically_across_a_merge() {
    // Two paths assigning the same constant still merge to that constant;
    // only genuinely different values drop to Varying.
    let mut asm = BodyAssembler::new(1, 2);
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfZero, "else");
    asm.emit_push_int(5);
    asm.emit_store(1);
    asm.emit_branch(Opcode::Goto, "join");
    asm.define_label("else").unwrap();
    asm.emit_push_int(5);
    asm.emit_store(1);
    asm.define_label("join").unwrap();
    asm.emit(Opcode::Return);
    let body = asm.finish().unwrap();
    let cfg = build(&body, "agree");

    let mut analysis = ConstantAnalysis::new(&body);
    let result = DataflowSolver::execute(&cfg, &mut analysis, &method("agree")).unwrap();
    let join = cfg
        .blocks()
        .find(|(_, b)| {
            b.first_instruction()
                .is_some_and(|i| i.opcode == Opcode::Return)
        })
        .map(|(n, _)| n)
        .unwrap();
    assert_eq!(
        result.entry_fact(join).unwrap().local(1),
        Some(&ConstantFact::Value(5))
    );
}
