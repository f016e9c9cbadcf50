//! CFG construction integration tests.
//!
//! These exercise the builder through the public API: assemble a method body
//! with `BodyAssembler`, build the CFG, and check the structural invariants -
//! every instruction in exactly one block, every non-exit node with an
//! outgoing edge, exception edges tagged with the guarded type.

use bytescope::prelude::*;

fn method(name: &str) -> MethodDescriptor {
    MethodDescriptor::new(&ClassDescriptor::new("pkg/Sample"), name, "()V", true)
}

/// if (arg0 == 0) x = 1 else x = 2; return x.
fn if_else_body() -> MethodBody {
    let mut asm = BodyAssembler::new(1, 2);
    asm.emit_load(0);
    asm.emit_branch(Opcode::IfZero, "else");
    asm.emit_push_int(1);
    asm.emit_store(1);
    asm.emit_branch(Opcode::Goto, "join");
    asm.define_label("else").unwrap();
    asm.emit_push_int(2);
    asm.emit_store(1);
    asm.define_label("join").unwrap();
    asm.emit_load(1);
    asm.emit(Opcode::ReturnValue);
    asm.finish().unwrap()
}

#[test]
fn two_branch_method_has_four_blocks_and_a_join() {
    let body = if_else_body();
    let cfg = CfgBuilder::build(&method("branchy"), &body).unwrap();

    // Condition, then-arm, else-arm, join.
    assert_eq!(cfg.block_count(), 4);

    // The join block has exactly the two arms as predecessors.
    let join = cfg
        .blocks()
        .find(|(_, b)| {
            b.last_instruction()
                .is_some_and(|i| i.opcode == Opcode::ReturnValue)
        })
        .map(|(n, _)| n)
        .unwrap();
    assert_eq!(cfg.predecessors(join).count(), 2);

    // Its entry fact is the join of both branch exit facts: with constant
    // propagation, 1 joined with 2 must be Varying while each arm's exit
    // still knows its own constant.
    let mut analysis = bytescope::analysis::ConstantAnalysis::new(&body);
    let result = DataflowSolver::execute(&cfg, &mut analysis, &method("branchy")).unwrap();
    let mut arm_constants = Vec::new();
    for pred in cfg.predecessors(join) {
        let exit = result.exit_fact(pred).unwrap();
        arm_constants.push(exit.local(1).cloned().unwrap());
    }
    arm_constants.sort_by_key(|fact| fact.value());
    assert_eq!(
        arm_constants,
        vec![ConstantFact::Value(1), ConstantFact::Value(2)]
    );
    let join_fact = result.entry_fact(join).unwrap();
    assert_eq!(join_fact.local(1), Some(&ConstantFact::Varying));
}

#[test]
fn every_instruction_in_exactly_one_block() {
    let body = if_else_body();
    let cfg = CfgBuilder::build(&method("branchy"), &body).unwrap();

    let mut seen = std::collections::HashMap::new();
    for (_, block) in cfg.blocks() {
        for insn in &block.instructions {
            *seen.entry(insn.offset).or_insert(0) += 1;
        }
    }
    for insn in &body.instructions {
        assert_eq!(seen.get(&insn.offset), Some(&1), "offset {:#x}", insn.offset);
    }
    assert_eq!(seen.len(), body.instructions.len());
}

#[test]
fn every_node_but_the_exit_has_an_outgoing_edge() {
    let body = if_else_body();
    let cfg = CfgBuilder::build(&method("branchy"), &body).unwrap();

    for node in cfg.node_ids() {
        let degree = cfg.successors(node).count();
        if node == cfg.exit() {
            assert_eq!(degree, 0);
        } else {
            assert!(degree >= 1, "node {node:?} has no outgoing edge");
        }
    }
}

#[test]
fn try_catch_produces_tagged_exception_edge() {
    let throwable = ClassDescriptor::new("lang/ArithmeticException");
    let mut asm = BodyAssembler::new(2, 3);
    asm.define_label("try").unwrap();
    asm.emit_load(0);
    asm.emit_load(1);
    asm.emit(Opcode::Div);
    asm.emit_store(2);
    asm.define_label("try_end").unwrap();
    asm.emit_load(2);
    asm.emit(Opcode::ReturnValue);
    asm.define_label("handler").unwrap();
    asm.emit(Opcode::Pop);
    asm.emit_push_int(0);
    asm.emit(Opcode::ReturnValue);
    asm.add_handler("try", "try_end", "handler", Some(throwable.clone()));
    let body = asm.finish().unwrap();

    let cfg = CfgBuilder::build(&method("guarded"), &body).unwrap();

    // The block containing the division has an exception edge to the handler
    // block, tagged with the guarded type.
    let div_block = cfg
        .blocks()
        .find(|(_, b)| b.instructions.iter().any(|i| i.opcode == Opcode::Div))
        .map(|(n, _)| n)
        .unwrap();
    let handler_block = cfg
        .blocks()
        .find(|(_, b)| {
            b.first_instruction()
                .is_some_and(|i| i.opcode == Opcode::Pop)
        })
        .map(|(n, _)| n)
        .unwrap();

    let exception_edges: Vec<&CfgEdge> = cfg
        .outgoing(div_block)
        .filter(|(_, target, edge)| *target == handler_block && edge.is_exception())
        .map(|(_, _, edge)| edge)
        .collect();
    assert_eq!(exception_edges.len(), 1);
    assert_eq!(exception_edges[0].catch_type(), Some(&throwable));
}

#[test]
fn uncaught_throw_reaches_the_exit() {
    let mut asm = BodyAssembler::new(1, 1);
    asm.emit_load(0);
    asm.emit(Opcode::Throw);
    let body = asm.finish().unwrap();
    let cfg = CfgBuilder::build(&method("thrower"), &body).unwrap();

    let kinds: Vec<CfgEdgeKind> = cfg
        .outgoing(cfg.entry())
        .map(|(_, _, edge)| edge.kind.clone())
        .collect();
    assert_eq!(kinds, vec![CfgEdgeKind::Unhandled]);
}

#[test]
fn loops_are_well_formed() {
    // while (arg0 != 0) { arg0 = arg0 - 1 }
    let mut asm = BodyAssembler::new(1, 1);
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
    let cfg = CfgBuilder::build(&method("looper"), &body).unwrap();

    for (node, _) in cfg.blocks() {
        assert!(cfg.is_reachable(node));
    }

    // The loop header dominates the body and the exit block.
    let doms = bytescope::analysis::Dominators::compute(&cfg);
    let done = cfg
        .blocks()
        .find(|(_, b)| {
            b.first_instruction()
                .is_some_and(|i| i.opcode == Opcode::Return)
        })
        .map(|(n, _)| n)
        .unwrap();
    assert!(doms.dominates(cfg.entry(), done));
}

#[test]
fn dot_rendering_mentions_every_node() {
    let body = if_else_body();
    let cfg = CfgBuilder::build(&method("branchy"), &body).unwrap();
    let dot = cfg.to_dot();
    assert!(dot.starts_with("digraph cfg {"));
    for node in cfg.node_ids() {
        assert!(dot.contains(&format!("  {} [", node.index())));
    }
}
