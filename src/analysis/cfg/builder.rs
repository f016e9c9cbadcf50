//! Control flow graph construction.
//!
//! The builder splits a decoded instruction stream into basic blocks at every
//! branch target, every instruction following a control transfer, and every
//! exception-handler boundary, then wires the blocks together with typed
//! edges. Malformed control structure (a branch target outside the method or
//! off an instruction boundary, a body that can fall off its own end) fails
//! with [`Error::CfgBuilder`]; the failure is local to the method being built.

use std::collections::{BTreeSet, HashMap};

use crate::{
    analysis::cfg::{BasicBlock, CfgEdge, CfgEdgeKind, ControlFlowGraph},
    bytecode::{FlowKind, MethodBody},
    descriptor::MethodDescriptor,
    utils::graph::{DirectedGraph, NodeId},
    Error, Result,
};

/// Builds [`ControlFlowGraph`]s from decoded method bodies.
pub struct CfgBuilder;

impl CfgBuilder {
    /// Builds the control flow graph for one method body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CfgBuilder`] if the body is empty, a branch or handler
    /// target is out of range or off an instruction boundary, or the last
    /// instruction can fall through past the end of the method.
    pub fn build(method: &MethodDescriptor, body: &MethodBody) -> Result<ControlFlowGraph> {
        if body.instructions.is_empty() {
            return Err(Self::malformed(method, "method body has no instructions"));
        }

        let last = &body.instructions[body.instructions.len() - 1];
        if last.can_fall_through() {
            return Err(Self::malformed(
                method,
                format!(
                    "execution can fall off the end of the method (last instruction at {:04x})",
                    last.offset
                ),
            ));
        }

        let leaders = Self::collect_leaders(method, body)?;
        let blocks = Self::split_blocks(body, &leaders);

        let mut graph: DirectedGraph<BasicBlock, CfgEdge> =
            DirectedGraph::with_capacity(blocks.len() + 1, blocks.len() * 2);
        let mut offset_to_node: HashMap<u32, NodeId> = HashMap::with_capacity(blocks.len());
        for block in blocks {
            let start = block.start_offset;
            let node = graph.add_node(block);
            offset_to_node.insert(start, node);
        }
        let code_size = body.code_size();
        let exit = graph.add_node(BasicBlock {
            instructions: Vec::new(),
            start_offset: code_size,
            end_offset: code_size,
        });

        Self::add_control_edges(method, &mut graph, &offset_to_node, exit)?;
        Self::add_exception_edges(method, body, &mut graph, &offset_to_node, exit)?;

        let entry = offset_to_node
            .get(&body.instructions[0].offset)
            .copied()
            .ok_or_else(|| Self::malformed(method, "entry block missing"))?;

        Ok(ControlFlowGraph::from_parts(graph, entry, exit))
    }

    fn malformed(method: &MethodDescriptor, message: impl Into<String>) -> Error {
        Error::CfgBuilder {
            method: method.clone(),
            message: message.into(),
        }
    }

    /// Validates a branch or handler target and returns it unchanged.
    fn check_target(method: &MethodDescriptor, body: &MethodBody, target: u32) -> Result<u32> {
        if body.index_at_offset(target).is_none() {
            return Err(Self::malformed(
                method,
                format!("branch target {target:04x} is not an instruction boundary"),
            ));
        }
        Ok(target)
    }

    /// Collects the set of block leader offsets.
    fn collect_leaders(method: &MethodDescriptor, body: &MethodBody) -> Result<BTreeSet<u32>> {
        let mut leaders = BTreeSet::new();
        leaders.insert(body.instructions[0].offset);

        for insn in &body.instructions {
            for target in insn.branch_targets() {
                leaders.insert(Self::check_target(method, body, target)?);
            }
            // The instruction after any control transfer starts a new block.
            if !matches!(insn.flow(), FlowKind::Sequential | FlowKind::Call) {
                let next = insn.next_offset();
                if next < body.code_size() {
                    if body.index_at_offset(next).is_none() {
                        return Err(Self::malformed(
                            method,
                            format!("instruction stream is not contiguous at {next:04x}"),
                        ));
                    }
                    leaders.insert(next);
                }
            }
        }

        for handler in &body.exception_handlers {
            leaders.insert(Self::check_target(method, body, handler.handler_offset)?);
            leaders.insert(Self::check_target(method, body, handler.try_start)?);
            if handler.try_end < body.code_size() {
                leaders.insert(Self::check_target(method, body, handler.try_end)?);
            }
        }

        Ok(leaders)
    }

    /// Splits the instruction stream into blocks at the leader offsets.
    fn split_blocks(body: &MethodBody, leaders: &BTreeSet<u32>) -> Vec<BasicBlock> {
        let mut blocks = Vec::with_capacity(leaders.len());
        let mut current: Vec<crate::bytecode::Instruction> = Vec::new();

        for insn in &body.instructions {
            if !current.is_empty() && leaders.contains(&insn.offset) {
                blocks.push(Self::seal(std::mem::take(&mut current)));
            }
            current.push(insn.clone());
            // A control transfer terminates its block even without a leader
            // following (e.g. the last instruction of the method).
            if !matches!(insn.flow(), FlowKind::Sequential | FlowKind::Call) {
                blocks.push(Self::seal(std::mem::take(&mut current)));
            }
        }
        if !current.is_empty() {
            blocks.push(Self::seal(current));
        }
        blocks
    }

    fn seal(instructions: Vec<crate::bytecode::Instruction>) -> BasicBlock {
        let start_offset = instructions.first().map_or(0, |i| i.offset);
        let end_offset = instructions.last().map_or(start_offset, |i| i.next_offset());
        BasicBlock {
            instructions,
            start_offset,
            end_offset,
        }
    }

    fn node_for(
        method: &MethodDescriptor,
        offset_to_node: &HashMap<u32, NodeId>,
        offset: u32,
    ) -> Result<NodeId> {
        offset_to_node.get(&offset).copied().ok_or_else(|| {
            Self::malformed(
                method,
                format!("no block starts at target offset {offset:04x}"),
            )
        })
    }

    /// Adds fall-through, branch, switch, return and throw edges.
    fn add_control_edges(
        method: &MethodDescriptor,
        graph: &mut DirectedGraph<BasicBlock, CfgEdge>,
        offset_to_node: &HashMap<u32, NodeId>,
        exit: NodeId,
    ) -> Result<()> {
        let nodes: Vec<NodeId> = graph.node_ids().filter(|&n| n != exit).collect();
        for node in nodes {
            let Some(block) = graph.node(node) else {
                continue;
            };
            let Some(last) = block.last_instruction().cloned() else {
                continue;
            };
            let end_offset = block.end_offset;

            match last.flow() {
                FlowKind::Sequential | FlowKind::Call => {
                    let target = Self::node_for(method, offset_to_node, end_offset)?;
                    graph.add_edge(node, target, CfgEdge::new(CfgEdgeKind::FallThrough))?;
                }
                FlowKind::UnconditionalBranch => {
                    let targets = last.branch_targets();
                    let target = Self::node_for(method, offset_to_node, targets[0])?;
                    graph.add_edge(node, target, CfgEdge::new(CfgEdgeKind::Goto))?;
                }
                FlowKind::ConditionalBranch => {
                    let targets = last.branch_targets();
                    let taken = Self::node_for(method, offset_to_node, targets[0])?;
                    graph.add_edge(node, taken, CfgEdge::new(CfgEdgeKind::BranchTaken))?;
                    let fallthrough = Self::node_for(method, offset_to_node, end_offset)?;
                    graph.add_edge(
                        node,
                        fallthrough,
                        CfgEdge::new(CfgEdgeKind::BranchNotTaken),
                    )?;
                }
                FlowKind::Switch => {
                    let crate::bytecode::Operand::Switch { targets, default } = &last.operand
                    else {
                        return Err(Self::malformed(
                            method,
                            format!("switch at {:04x} has no dispatch table", last.offset),
                        ));
                    };
                    for (index, &case) in targets.iter().enumerate() {
                        let target = Self::node_for(method, offset_to_node, case)?;
                        graph.add_edge(
                            node,
                            target,
                            CfgEdge::new(CfgEdgeKind::SwitchCase { index }),
                        )?;
                    }
                    let target = Self::node_for(method, offset_to_node, *default)?;
                    graph.add_edge(node, target, CfgEdge::new(CfgEdgeKind::SwitchDefault))?;
                }
                FlowKind::Return => {
                    graph.add_edge(node, exit, CfgEdge::new(CfgEdgeKind::Return))?;
                }
                FlowKind::Throw => {
                    // Handler edges are added in the exception pass; the
                    // uncaught path to the exit is added there as well so the
                    // handler table is consulted once.
                }
            }
        }
        Ok(())
    }

    /// Adds one exception edge per (block, handler) pair whose protected range
    /// covers a throwing instruction of the block, plus unhandled-exit edges.
    fn add_exception_edges(
        method: &MethodDescriptor,
        body: &MethodBody,
        graph: &mut DirectedGraph<BasicBlock, CfgEdge>,
        offset_to_node: &HashMap<u32, NodeId>,
        exit: NodeId,
    ) -> Result<()> {
        let nodes: Vec<NodeId> = graph.node_ids().filter(|&n| n != exit).collect();
        for node in nodes {
            let Some(block) = graph.node(node) else {
                continue;
            };

            let throwing_offsets: Vec<u32> = block
                .instructions
                .iter()
                .filter(|insn| insn.opcode.can_throw())
                .map(|insn| insn.offset)
                .collect();
            let ends_in_throw = block
                .last_instruction()
                .is_some_and(|insn| insn.flow() == FlowKind::Throw);
            if throwing_offsets.is_empty() && !ends_in_throw {
                continue;
            }

            // A throw is caught on this path if some covering handler is a
            // catch-all; otherwise the exception may leave the method.
            let mut saw_catch_all = false;
            for handler in &body.exception_handlers {
                let covered = throwing_offsets.iter().any(|&o| handler.covers(o));
                if !covered {
                    continue;
                }
                let target = Self::node_for(method, offset_to_node, handler.handler_offset)?;
                graph.add_edge(
                    node,
                    target,
                    CfgEdge::new(CfgEdgeKind::Exception {
                        catch_type: handler.catch_type.clone(),
                    }),
                )?;
                if handler.catch_type.is_none() {
                    saw_catch_all = true;
                }
            }

            if !saw_catch_all {
                graph.add_edge(node, exit, CfgEdge::new(CfgEdgeKind::Unhandled))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{BodyAssembler, Opcode},
        descriptor::{ClassDescriptor, MethodDescriptor},
    };

    fn method() -> MethodDescriptor {
        MethodDescriptor::new(&ClassDescriptor::new("pkg/Sample"), "m", "()V", true)
    }

    #[test]
    fn test_straight_line_method() {
        let mut asm = BodyAssembler::new(0, 1);
        asm.emit_push_int(7);
        asm.emit_store(0);
        asm.emit(Opcode::Return);
        let body = asm.finish().unwrap();

        let cfg = CfgBuilder::build(&method(), &body).unwrap();
        assert_eq!(cfg.block_count(), 1);
        assert_eq!(cfg.node_count(), 2);

        let exits: Vec<_> = cfg.outgoing(cfg.entry()).collect();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].1, cfg.exit());
        assert_eq!(exits[0].2.kind, CfgEdgeKind::Return);
    }

    #[test]
    fn test_empty_body_rejected() {
        let body = BodyAssembler::new(0, 0).finish().unwrap();
        let err = CfgBuilder::build(&method(), &body).unwrap_err();
        assert!(matches!(err, Error::CfgBuilder { .. }));
    }

    #[test]
    fn test_fall_off_end_rejected() {
        let mut asm = BodyAssembler::new(0, 1);
        asm.emit_push_int(1);
        asm.emit_store(0);
        let body = asm.finish().unwrap();
        let err = CfgBuilder::build(&method(), &body).unwrap_err();
        assert!(matches!(err, Error::CfgBuilder { .. }));
    }

    #[test]
    fn test_bad_branch_target_rejected() {
        let mut asm = BodyAssembler::new(0, 0);
        asm.emit_branch(Opcode::Goto, "end");
        asm.emit_push_int(3);
        asm.define_label("end").unwrap();
        asm.emit(Opcode::Return);
        let mut body = asm.finish().unwrap();
        // Corrupt the target so it lands inside the push encoding.
        body.instructions[0].operand = crate::bytecode::Operand::Branch(5);
        let err = CfgBuilder::build(&method(), &body).unwrap_err();
        assert!(matches!(err, Error::CfgBuilder { .. }));
    }

    #[test]
    fn test_unreachable_block_flagged() {
        let mut asm = BodyAssembler::new(0, 0);
        asm.emit_branch(Opcode::Goto, "end");
        asm.define_label("dead").unwrap();
        asm.emit(Opcode::Nop);
        asm.emit_branch(Opcode::Goto, "dead");
        asm.define_label("end").unwrap();
        asm.emit(Opcode::Return);
        let body = asm.finish().unwrap();

        let cfg = CfgBuilder::build(&method(), &body).unwrap();
        let dead: Vec<_> = cfg
            .blocks()
            .filter(|(node, _)| !cfg.is_reachable(*node))
            .collect();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].1.first_instruction().unwrap().opcode, Opcode::Nop);
    }

    #[test]
    fn test_switch_edges() {
        let mut asm = BodyAssembler::new(1, 1);
        asm.emit_load(0);
        asm.emit_switch(&["a", "b"], "d");
        asm.define_label("a").unwrap();
        asm.emit(Opcode::Return);
        asm.define_label("b").unwrap();
        asm.emit(Opcode::Return);
        asm.define_label("d").unwrap();
        asm.emit(Opcode::Return);
        let body = asm.finish().unwrap();

        let cfg = CfgBuilder::build(&method(), &body).unwrap();
        let kinds: Vec<_> = cfg
            .outgoing(cfg.entry())
            .map(|(_, _, e)| e.kind.clone())
            .collect();
        assert!(kinds.contains(&CfgEdgeKind::SwitchCase { index: 0 }));
        assert!(kinds.contains(&CfgEdgeKind::SwitchCase { index: 1 }));
        assert!(kinds.contains(&CfgEdgeKind::SwitchDefault));
    }
}
