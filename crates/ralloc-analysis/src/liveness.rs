//! Liveness analysis: a block-level backward dataflow fixpoint, needed once the CFG
//! carries loops and explicit φ-instructions. A single forward walk over a loop body
//! never reaches a fixpoint, since a back edge's live-out set depends on live-in sets
//! computed later in the same pass.
//!
//! The fixpoint itself works over dense [`bitvec`] sets indexed by variable id — cheap
//! union/difference/compare per iteration — and only the final per-block and
//! per-instruction results are materialized as `BTreeSet<VarId>` onto the IR.

use std::collections::{BTreeSet, HashMap};

use bitvec::vec::BitVec;
use ralloc_ir::{BlockId, Function, VarId};

use crate::error::AnalysisError;

const MAX_ITERATIONS: usize = 1000;

fn is_spilled(function: &Function, v: VarId) -> bool {
    function.variable(v).allocation.is_slot()
}

fn to_bits(vars: impl IntoIterator<Item = VarId>, len: usize) -> BitVec {
    let mut bits = BitVec::repeat(false, len);
    for v in vars {
        bits.set(v.index() as usize, true);
    }
    bits
}

fn to_var_set(bits: &BitVec) -> BTreeSet<VarId> {
    bits.iter_ones().map(|i| VarId::new(i as u32)).collect()
}

/// Populate `defs`/`uevs` for every block by a single forward walk of its instructions.
///
/// φ-defined variables count as definitions of their block; their uses belong to the
/// predecessor named by the φ, never to the block itself, so they never contribute to
/// `uevs`.
fn compute_defs_and_uevs(function: &mut Function) {
    for block in &mut function.blocks {
        let mut defs = BTreeSet::new();
        let mut uevs = BTreeSet::new();
        for inst in &block.insts {
            if inst.is_phi() {
                if let Some(d) = inst.def {
                    defs.insert(d);
                }
                continue;
            }
            for used in inst.uses.variables() {
                if !defs.contains(&used) {
                    uevs.insert(used);
                }
            }
            if let Some(d) = inst.def {
                defs.insert(d);
            }
        }
        block.defs = defs;
        block.uevs = uevs;
    }
}

/// What a successor `s`'s φ reads along the edge from `from`, and `s`'s own φ
/// destination (to be excluded from what `from` inherits via `live_in(s)`).
fn phi_contribution(function: &Function, from: BlockId, succ: BlockId) -> (BitVec, BitVec) {
    let len = function.variable_count();
    let mut incoming = BitVec::repeat(false, len);
    let mut phi_defs = BitVec::repeat(false, len);
    for inst in function.block(succ).phis() {
        if let Some(d) = inst.def {
            phi_defs.set(d.index() as usize, true);
        }
        if let ralloc_ir::Uses::Phi(map) = &inst.uses {
            if let Some(&v) = map.get(&from) {
                incoming.set(v.index() as usize, true);
            }
        }
    }
    (incoming, phi_defs)
}

/// Run the block-level liveness fixpoint and the per-instruction backward pass, writing
/// results into every block's and instruction's `live_in`/`live_out` fields.
///
/// `order` should be a reverse postorder (see [`crate::rpo::reverse_postorder`]); the
/// fixpoint converges in fewer iterations when blocks are visited roughly
/// predecessors-before-successors on the way down and the reverse on the way up, but
/// correctness does not depend on the visitation order, only on iterating to a
/// fixpoint.
pub fn compute_liveness(function: &mut Function, order: &[BlockId]) -> Result<(), AnalysisError> {
    compute_defs_and_uevs(function);

    let len = function.variable_count();
    let spilled: BitVec = {
        let mut bits = BitVec::repeat(false, len);
        for i in 0..len {
            if is_spilled(function, VarId::new(i as u32)) {
                bits.set(i, true);
            }
        }
        bits
    };
    let not_spilled = |bits: &mut BitVec| {
        for i in spilled.iter_ones() {
            bits.set(i, false);
        }
    };

    let mut live_in: HashMap<BlockId, BitVec> =
        order.iter().map(|&b| (b, BitVec::repeat(false, len))).collect();
    let mut live_out: HashMap<BlockId, BitVec> =
        order.iter().map(|&b| (b, BitVec::repeat(false, len))).collect();

    let mut changed = true;
    let mut iterations = 0;
    while changed {
        changed = false;
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            return Err(AnalysisError::LivenessDidNotConverge(iterations));
        }

        for &block in order.iter().rev() {
            let mut out_bits = BitVec::repeat(false, len);
            for &succ in &function.block(block).successors.clone() {
                let (incoming, phi_defs) = phi_contribution(function, block, succ);
                for i in 0..len {
                    let from_succ = live_in[&succ][i] && !phi_defs[i];
                    if from_succ || incoming[i] {
                        out_bits.set(i, true);
                    }
                }
            }
            not_spilled(&mut out_bits);

            let b = function.block(block);
            let defs_bits = to_bits(b.defs.iter().copied(), len);
            let mut in_bits = to_bits(b.uevs.iter().copied(), len);
            for i in 0..len {
                if out_bits[i] && !defs_bits[i] {
                    in_bits.set(i, true);
                }
            }
            for phi in b.phis() {
                if let Some(d) = phi.def {
                    in_bits.set(d.index() as usize, true);
                }
            }
            not_spilled(&mut in_bits);

            if in_bits != live_in[&block] || out_bits != live_out[&block] {
                changed = true;
            }
            live_in.insert(block, in_bits);
            live_out.insert(block, out_bits);
        }
    }

    log::debug!("liveness fixpoint converged after {iterations} iteration(s) over {} blocks", order.len());

    for &block in order {
        let block_mut = function.block_mut(block);
        block_mut.live_in = to_var_set(&live_in[&block]);
        block_mut.live_out = to_var_set(&live_out[&block]);
    }

    for block in &mut function.blocks {
        let mut running = block.live_out.clone();
        for inst in block.insts.iter_mut().rev() {
            if inst.is_phi() {
                continue;
            }
            inst.live_out = running.clone();
            if let Some(d) = inst.def {
                running.remove(&d);
            }
            for used in inst.uses.variables() {
                running.insert(used);
            }
            inst.live_in = running.clone();
        }
    }

    Ok(())
}
