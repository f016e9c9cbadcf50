//! Worklist-based fixed-point solver.
//!
//! # Algorithm
//!
//! 1. Initialize every node with the analysis's initial fact and set the
//!    boundary fact at the entry (forward) or the synthetic exit (backward).
//! 2. Seed the worklist with the reachable nodes in reverse postorder
//!    (forward) or postorder (backward) - the order in which a node's
//!    upstream neighbors tend to be processed first, minimizing passes.
//! 3. Pop a node; recompute its input by joining the edge-refined output
//!    facts of its upstream neighbors; apply the block transfer; if the
//!    output changed, enqueue the downstream neighbors.
//! 4. Stop when the worklist drains. A monotone analysis over a finite
//!    lattice always drains; a sanity bound converts a broken analysis into
//!    the fatal [`Error::Convergence`](crate::Error::Convergence) instead of
//!    a hang.
//!
//! The solver is oblivious to fact representation: the engine runs it with
//! bit-set facts and with structured frame facts without modification.

use std::collections::VecDeque;

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        dataflow::framework::{DataflowAnalysis, DataflowResult, Direction},
    },
    descriptor::MethodDescriptor,
    utils::graph::{algorithms, NodeId, TraversalDirection},
    Error, Result,
};

/// Iteration bound factor; see [`DataflowSolver::execute`].
const ITERATION_BOUND_PER_NODE: usize = 64;
/// Flat iteration allowance added on top of the per-node factor.
const ITERATION_BOUND_BASE: usize = 1024;

/// The generic fixed-point solver.
///
/// Stateless; `execute` owns all per-run state, so one solver value can be
/// reused across analyses and methods.
pub struct DataflowSolver;

impl DataflowSolver {
    /// Runs `analysis` over `cfg` to a fixed point.
    ///
    /// `method` provides error context only.
    ///
    /// # Errors
    ///
    /// - [`Error::Dataflow`] if a transfer or join reports a failure
    ///   (e.g. operand stack underflow); local to the method.
    /// - [`Error::Convergence`] if iteration exceeds
    ///   `64 x node_count + 1024` node visits - a programming error in the
    ///   analysis, fatal to the run.
    pub fn execute<A: DataflowAnalysis>(
        cfg: &ControlFlowGraph,
        analysis: &mut A,
        method: &MethodDescriptor,
    ) -> Result<DataflowResult<A::Fact>> {
        let seed_order = match A::DIRECTION {
            Direction::Forward => {
                algorithms::reverse_postorder(cfg.graph(), cfg.entry(), TraversalDirection::Forward)
            }
            Direction::Backward => {
                algorithms::reverse_postorder(cfg.graph(), cfg.exit(), TraversalDirection::Backward)
            }
        };
        Self::execute_seeded(cfg, analysis, method, &seed_order)
    }

    /// Runs `analysis` over `cfg` with an explicit worklist seed order.
    ///
    /// The cache-registered engines pass the reverse postorder of the cached
    /// [`DepthFirstSearch`](crate::analysis::orders::DepthFirstSearch) (or its
    /// reverse counterpart for backward analyses), so the ordering analyses
    /// are computed once per method and shared. The order only affects how
    /// fast the fixed point is reached, never what it is.
    ///
    /// # Errors
    ///
    /// As [`execute`](Self::execute).
    pub fn execute_seeded<A: DataflowAnalysis>(
        cfg: &ControlFlowGraph,
        analysis: &mut A,
        method: &MethodDescriptor,
        seed_order: &[NodeId],
    ) -> Result<DataflowResult<A::Fact>> {
        let node_count = cfg.node_count();
        let initial = analysis.initial_fact(cfg);
        let boundary = analysis.boundary_fact(cfg)?;

        let mut entry_facts: Vec<A::Fact> = vec![initial.clone(); node_count];
        let mut exit_facts: Vec<A::Fact> = vec![initial; node_count];

        match A::DIRECTION {
            Direction::Forward => entry_facts[cfg.entry().index()] = boundary,
            Direction::Backward => exit_facts[cfg.exit().index()] = boundary,
        }

        let mut worklist: VecDeque<NodeId> = VecDeque::with_capacity(seed_order.len());
        let mut queued = vec![false; node_count];
        for &node in seed_order {
            if node.index() < node_count && !queued[node.index()] {
                worklist.push_back(node);
                queued[node.index()] = true;
            }
        }

        let iteration_bound = ITERATION_BOUND_PER_NODE * node_count + ITERATION_BOUND_BASE;
        let mut iterations = 0usize;

        while let Some(node) = worklist.pop_front() {
            queued[node.index()] = false;
            iterations += 1;
            if iterations > iteration_bound {
                return Err(Error::Convergence {
                    analysis: analysis.name(),
                    iterations,
                });
            }

            let changed = match A::DIRECTION {
                Direction::Forward => Self::process_forward(
                    cfg,
                    analysis,
                    method,
                    node,
                    &mut entry_facts,
                    &mut exit_facts,
                )?,
                Direction::Backward => Self::process_backward(
                    cfg,
                    analysis,
                    method,
                    node,
                    &mut entry_facts,
                    &mut exit_facts,
                )?,
            };

            if changed {
                let downstream: Vec<NodeId> = match A::DIRECTION {
                    Direction::Forward => cfg.successors(node).collect(),
                    Direction::Backward => cfg.predecessors(node).collect(),
                };
                for next in downstream {
                    if !queued[next.index()] {
                        queued[next.index()] = true;
                        worklist.push_back(next);
                    }
                }
            }
        }

        Ok(DataflowResult::new(entry_facts, exit_facts, iterations))
    }

    /// Recomputes one node forward; returns `true` if its exit fact changed.
    fn process_forward<A: DataflowAnalysis>(
        cfg: &ControlFlowGraph,
        analysis: &mut A,
        method: &MethodDescriptor,
        node: NodeId,
        entry_facts: &mut [A::Fact],
        exit_facts: &mut [A::Fact],
    ) -> Result<bool> {
        // Join the edge-refined exit facts of all predecessors. The entry
        // node additionally keeps its boundary fact as a join contribution
        // (a loop may branch back to offset 0).
        let mut input = if node == cfg.entry() {
            entry_facts[node.index()].clone()
        } else {
            analysis.initial_fact(cfg)
        };
        let incoming: Vec<_> = cfg
            .incoming(node)
            .map(|(_, source, edge)| (source, edge.clone()))
            .collect();
        for (source, edge) in incoming {
            let mut contribution = exit_facts[source.index()].clone();
            analysis.transfer_edge(source, &edge, &mut contribution)?;
            analysis
                .join_into(&contribution, &mut input, node)
                .map_err(|e| Self::with_context(e, analysis.name(), method))?;
        }
        entry_facts[node.index()] = input.clone();

        let Some(block) = cfg.block(node) else {
            return Ok(false);
        };
        let mut output = input;
        analysis
            .transfer_block(node, block, &mut output)
            .map_err(|e| Self::with_context(e, analysis.name(), method))?;

        let changed = output != exit_facts[node.index()];
        exit_facts[node.index()] = output;
        Ok(changed)
    }

    /// Recomputes one node backward; returns `true` if its entry fact changed.
    fn process_backward<A: DataflowAnalysis>(
        cfg: &ControlFlowGraph,
        analysis: &mut A,
        method: &MethodDescriptor,
        node: NodeId,
        entry_facts: &mut [A::Fact],
        exit_facts: &mut [A::Fact],
    ) -> Result<bool> {
        let mut output = if node == cfg.exit() {
            exit_facts[node.index()].clone()
        } else {
            analysis.initial_fact(cfg)
        };
        let outgoing: Vec<_> = cfg
            .outgoing(node)
            .map(|(_, target, edge)| (target, edge.clone()))
            .collect();
        for (target, edge) in outgoing {
            let mut contribution = entry_facts[target.index()].clone();
            analysis.transfer_edge(node, &edge, &mut contribution)?;
            analysis
                .join_into(&contribution, &mut output, node)
                .map_err(|e| Self::with_context(e, analysis.name(), method))?;
        }
        exit_facts[node.index()] = output.clone();

        let Some(block) = cfg.block(node) else {
            return Ok(false);
        };
        let mut input = output;
        analysis
            .transfer_block(node, block, &mut input)
            .map_err(|e| Self::with_context(e, analysis.name(), method))?;

        let changed = input != entry_facts[node.index()];
        entry_facts[node.index()] = input;
        Ok(changed)
    }

    /// Attaches analysis and method context to bare dataflow failures.
    fn with_context(error: Error, analysis: &'static str, method: &MethodDescriptor) -> Error {
        match error {
            Error::Dataflow {
                analysis: existing,
                method: m,
                message,
            } => Error::Dataflow {
                analysis: existing,
                method: m,
                message,
            },
            Error::GraphError(message) => Error::Dataflow {
                analysis,
                method: method.clone(),
                message,
            },
            other => other,
        }
    }
}
