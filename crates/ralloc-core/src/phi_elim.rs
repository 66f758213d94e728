//! φ-elimination: parallel-copy ordering, critical-edge splitting, and cycle
//! resolution, following the topological-order-then-break-cycles shape common to
//! SSA-out algorithms and checked against the dataflow facts `ralloc-analysis` caches
//! onto the IR.

use std::collections::HashSet;

use ralloc_ir::{Allocation, BlockId, Function, Inst, Opcode, Operand, Uses, VarId};

use crate::error::AllocError;

#[derive(Debug, Clone, Copy)]
struct Edge {
    dst_alloc: Allocation,
    src_alloc: Allocation,
    dst_var: VarId,
    src_var: VarId,
}

/// Eliminate every φ in `function`, replacing incoming values with ordered moves on the
/// predecessor edges. `k` bounds the register budget available for scratch resources.
///
/// Fails if some parallel-copy move in a predecessor edge needs a scratch register that
/// the budget cannot supply; the caller retries with a different (typically smaller)
/// `first_K`.
pub fn eliminate_phi(function: &mut Function, k: u32) -> Result<(), AllocError> {
    let block_ids: Vec<BlockId> = function.block_ids().collect();
    for block in block_ids {
        if function.block(block).phis().next().is_none() {
            continue;
        }
        eliminate_block_phis(function, block, k)?;
    }
    Ok(())
}

fn eliminate_block_phis(function: &mut Function, block: BlockId, k: u32) -> Result<(), AllocError> {
    let preds: Vec<BlockId> = function.block(block).predecessors.clone();
    let phi_count = function.block(block).phis().count();

    for pred in preds {
        let mut edges = Vec::new();
        for idx in 0..phi_count {
            let (def, incoming) = match &function.block(block).insts[idx].uses {
                Uses::Phi(m) => (function.block(block).insts[idx].def.unwrap(), m.clone()),
                _ => continue,
            };
            if let Some(&src) = incoming.get(&pred) {
                if src != def {
                    edges.push((def, src));
                }
            }
        }
        if edges.is_empty() {
            continue;
        }

        let target_block =
            if function.block(pred).successors.len() > 1 { split_critical_edge(function, pred, block) } else { pred };

        let edges: Vec<Edge> = edges
            .into_iter()
            .map(|(dst_var, src_var)| Edge {
                dst_alloc: function.variable(dst_var).allocation,
                src_alloc: function.variable(src_var).allocation,
                dst_var,
                src_var,
            })
            .filter(|e| e.dst_alloc != e.src_alloc)
            .collect();

        sequence_parallel_copy(function, target_block, edges, k)?;
    }

    function.block_mut(block).insts.retain(|i| !i.is_phi());
    Ok(())
}

/// Materialise a fresh block on the edge `pred -> succ`, rewiring the CFG and rewriting
/// `succ`'s φs to reference the new block instead of `pred`.
fn split_critical_edge(function: &mut Function, pred: BlockId, succ: BlockId) -> BlockId {
    let new_block = function.add_block();

    for s in function.block_mut(pred).successors.iter_mut() {
        if *s == succ {
            *s = new_block;
        }
    }
    function.block_mut(new_block).predecessors.push(pred);
    function.block_mut(new_block).successors.push(succ);
    for p in function.block_mut(succ).predecessors.iter_mut() {
        if *p == pred {
            *p = new_block;
        }
    }

    let phi_count = function.block(succ).phis().count();
    for idx in 0..phi_count {
        if let Uses::Phi(map) = &mut function.block_mut(succ).insts[idx].uses {
            if let Some(v) = map.remove(&pred) {
                map.insert(new_block, v);
            }
        }
    }

    new_block
}

fn find_scratch_register(function: &Function, block: BlockId, k: u32) -> Option<u32> {
    let occupied: HashSet<u32> = function
        .block(block)
        .insts
        .last()
        .map(|i| i.live_out.iter().filter_map(|&v| function.variable(v).allocation.register()).collect())
        .unwrap_or_default();
    (1..=k).find(|r| !occupied.contains(r))
}

fn append_at_tail(function: &mut Function, block: BlockId, mut moves: Vec<Inst>) {
    let insts = &mut function.block_mut(block).insts;
    let insert_at = if insts.last().map_or(false, |i| i.opcode == Opcode::Branch) { insts.len() - 1 } else { insts.len() };
    for inst in moves.drain(..).rev() {
        insts.insert(insert_at, inst);
    }
}

/// Emit a single `dst ← src` move, choosing `MOV`/`LOAD`/`STORE` by the pair's
/// allocation kind, or a scratch-mediated load/store pair for `mem ← mem`.
fn materialize_move(
    function: &mut Function,
    block: BlockId,
    dst: VarId,
    src: VarId,
    k: u32,
    out: &mut Vec<Inst>,
) -> Result<(), AllocError> {
    let dst_alloc = function.variable(dst).allocation;
    let src_alloc = function.variable(src).allocation;

    match (dst_alloc, src_alloc) {
        (Allocation::Register(_), Allocation::Register(_)) | (Allocation::Register(_), Allocation::Unallocated) => {
            let id = function.next_inst_id();
            out.push(Inst::new(id, block, Opcode::Mov, Some(dst), Uses::List(vec![src])));
        }
        (Allocation::Register(_), Allocation::Slot(_)) => {
            let id = function.next_inst_id();
            let mut inst = Inst::new(id, block, Opcode::Load, Some(dst), Uses::List(vec![]));
            inst.debug_uses.push(Operand::Var(src));
            out.push(inst);
        }
        (Allocation::Slot(_), Allocation::Register(_)) => {
            let id = function.next_inst_id();
            let mut inst = Inst::new(id, block, Opcode::Store, None, Uses::List(vec![src]));
            inst.debug_uses.push(Operand::Var(dst));
            out.push(inst);
        }
        (Allocation::Slot(_), Allocation::Slot(_)) => match find_scratch_register(function, block, k) {
            Some(reg) => {
                let scratch = function.fresh_variable();
                function.variable_mut(scratch).allocation = Allocation::Register(reg);

                let id1 = function.next_inst_id();
                let mut load = Inst::new(id1, block, Opcode::Load, Some(scratch), Uses::List(vec![]));
                load.debug_uses.push(Operand::Var(src));
                out.push(load);

                let id2 = function.next_inst_id();
                let mut store = Inst::new(id2, block, Opcode::Store, None, Uses::List(vec![scratch]));
                store.debug_uses.push(Operand::Var(dst));
                out.push(store);
            }
            None => return Err(AllocError::NoScratchForMemToMem { dst, src }),
        },
        _ => {
            let id = function.next_inst_id();
            out.push(Inst::new(id, block, Opcode::Mov, Some(dst), Uses::List(vec![src])));
        }
    }
    Ok(())
}

/// Sequence a set of conceptually-simultaneous moves into an ordered list, breaking any
/// cycles with a scratch variable, and splice the result into `block`'s tail.
///
/// Acyclic edges propagate whichever specific pair `materialize_move` failed on; a move
/// that fails while breaking a cycle is reported as [`AllocError::NoScratchForCycle`]
/// instead, since by that point three moves are cooperating to resolve one cycle and no
/// single pair is the culprit.
fn sequence_parallel_copy(function: &mut Function, block: BlockId, mut pending: Vec<Edge>, k: u32) -> Result<(), AllocError> {
    let mut moves = Vec::new();

    loop {
        let ready = pending
            .iter()
            .enumerate()
            .find(|(i, e)| !pending.iter().enumerate().any(|(j, other)| j != *i && other.src_alloc == e.dst_alloc))
            .map(|(i, _)| i);
        let Some(i) = ready else { break };
        let edge = pending.remove(i);
        materialize_move(function, block, edge.dst_var, edge.src_var, k, &mut moves)?;
    }

    while !pending.is_empty() {
        let start = pending[0].dst_alloc;
        let mut cycle = Vec::new();
        let mut current = start;
        loop {
            let idx = pending.iter().position(|e| e.dst_alloc == current).expect("cycle must close");
            let edge = pending[idx];
            cycle.push(idx);
            current = edge.src_alloc;
            if current == start {
                break;
            }
        }
        // remove in descending index order so earlier indices stay valid
        let mut cycle_edges: Vec<Edge> = cycle.iter().map(|&i| pending[i]).collect();
        let mut sorted_indices = cycle.clone();
        sorted_indices.sort_unstable_by(|a, b| b.cmp(a));
        for idx in sorted_indices {
            pending.remove(idx);
        }

        let last = cycle_edges.pop().expect("cycle is non-empty");
        let scratch = function.fresh_variable();
        if let Some(reg) = find_scratch_register(function, block, k) {
            function.variable_mut(scratch).allocation = Allocation::Register(reg);
        } else {
            function.variable_mut(scratch).allocation = Allocation::Slot(scratch);
        }

        materialize_move(function, block, scratch, last.src_var, k, &mut moves).map_err(|_| AllocError::NoScratchForCycle)?;
        for edge in &cycle_edges {
            materialize_move(function, block, edge.dst_var, edge.src_var, k, &mut moves)
                .map_err(|_| AllocError::NoScratchForCycle)?;
        }
        materialize_move(function, block, last.dst_var, scratch, k, &mut moves).map_err(|_| AllocError::NoScratchForCycle)?;
    }

    append_at_tail(function, block, moves);
    Ok(())
}
