//! The graph-coloring allocator, grounded directly in the chordality and pressure facts
//! `interference.rs`/`ralloc-analysis` establish — greedy coloring over a perfect
//! elimination order never backtracks on a chordal graph once pressure already fits the
//! budget.

use std::collections::BTreeSet;

use ralloc_ir::{Allocation, BlockId, Function, VarId};

use crate::{
    belady::furthest_next_use_spill,
    error::AllocError,
    interference::{build_interference_graph, is_chordal, lex_bfs_order},
    pressure_exceeds_k,
    regset::RegisterSet,
};

/// Attempt to color `function` at budget `k`.
///
/// If any instruction's pressure already exceeds `k`, this invokes the Belady spiller
/// to reduce it and returns `Ok(false)` without attempting to color — the caller
/// re-analyses and retries. Fails with [`AllocError::NotChordal`] if pressure fits but
/// the interference graph isn't chordal, since the greedy pass below relies on a perfect
/// elimination order to never backtrack. Otherwise this always succeeds.
pub fn allocate_coloring(function: &mut Function, order: &[BlockId], k: u32, loop_biased: bool) -> Result<bool, AllocError> {
    if pressure_exceeds_k(function, k) {
        furthest_next_use_spill(function, k, loop_biased);
        return Ok(false);
    }

    let graph = build_interference_graph(function);
    let elimination_order = lex_bfs_order(&graph);
    if !is_chordal(&graph, &elimination_order) {
        return Err(AllocError::NotChordal);
    }

    for &block in order {
        let mut regs = RegisterSet::new(k);
        for &v in &function.block(block).live_in.clone() {
            if let Some(reg) = function.variable(v).allocation.register() {
                regs.occupy(reg);
            }
        }

        let insts_len = function.block(block).insts.len();
        for idx in 0..insts_len {
            let (is_phi, uses, def, live_out): (bool, Vec<VarId>, Option<VarId>, BTreeSet<VarId>) = {
                let inst = &function.block(block).insts[idx];
                (inst.is_phi(), inst.uses.variables(), inst.def, inst.live_out.clone())
            };
            if is_phi {
                continue;
            }

            for v in uses {
                if !live_out.contains(&v) {
                    if let Some(reg) = function.variable(v).allocation.register() {
                        regs.release(reg);
                    }
                }
            }

            if let Some(d) = def {
                if live_out.contains(&d) && function.variable(d).allocation == Allocation::Unallocated {
                    if let Some(reg) = regs.acquire() {
                        function.variable_mut(d).allocation = Allocation::Register(reg);
                    }
                }
            }
        }
    }

    log::debug!("graph-coloring allocation succeeded at k={k}");
    Ok(true)
}
