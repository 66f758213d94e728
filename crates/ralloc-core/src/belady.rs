//! The Belady ("furthest-next-use") spiller invoked by the graph-coloring allocator
//! when register pressure at some point exceeds the budget.
//!
//! Next-use distance here is a flat scan over each variable's sorted use-position list
//! in the function's linear instruction numbering, not a branch-aware walk of the CFG
//! from the spill point. On a diamond or loop this can pick a use down an untaken
//! branch as "next", undercounting the true distance along the path actually taken;
//! see the Open Question entry on this in the design notes.

use std::collections::{BTreeSet, HashMap};

use ralloc_ir::{Allocation, BlockId, Function, VarId};

fn use_positions(function: &Function) -> HashMap<VarId, Vec<f64>> {
    let mut map: HashMap<VarId, Vec<f64>> = HashMap::new();
    for block in &function.blocks {
        for inst in &block.insts {
            if inst.is_phi() {
                if let ralloc_ir::Uses::Phi(m) = &inst.uses {
                    for (&pred, &v) in m {
                        if let Some(last) = function.block(pred).last_num() {
                            map.entry(v).or_default().push(last + 0.5);
                        }
                    }
                }
                continue;
            }
            let num = inst.num.unwrap_or(0.0);
            for v in inst.uses.variables() {
                map.entry(v).or_default().push(num);
            }
        }
    }
    for positions in map.values_mut() {
        positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
    }
    map
}

fn next_use_after(positions: &[f64], pos: f64) -> Option<f64> {
    positions.iter().copied().find(|&p| p >= pos)
}

/// Walk every instruction; wherever the live set at that point exceeds `k`, spill the
/// variables whose next use is furthest away until it no longer does.
///
/// When `loop_biased`, the next-use distance is divided by the loop depth enclosing the
/// *spill decision point itself* (not each use individually), biasing the spiller
/// against evicting values that are about to be reused inside a hot loop.
///
/// Returns `true` iff at least one variable was spilled.
pub fn furthest_next_use_spill(function: &mut Function, k: u32, loop_biased: bool) -> bool {
    let positions = use_positions(function);
    let mut spilled_any = false;
    let block_ids: Vec<BlockId> = function.block_ids().collect();

    for block_id in block_ids {
        let loop_depth = function
            .block(block_id)
            .loop_id
            .and_then(|lid| function.loops.iter().find(|l| l.id == lid))
            .map(|l| l.depth)
            .unwrap_or(0);
        let divisor = if loop_biased { loop_depth.max(1) as f64 } else { 1.0 };

        let insts_len = function.block(block_id).insts.len();
        for idx in 0..insts_len {
            let (pos, live_set): (f64, BTreeSet<VarId>) = {
                let inst = &function.block(block_id).insts[idx];
                let pos = inst.num.unwrap_or(0.0);
                let mut set = inst.live_out.clone();
                set.extend(inst.live_in.iter().copied());
                (pos, set)
            };

            let non_spilled: Vec<VarId> =
                live_set.into_iter().filter(|&v| !function.variable(v).allocation.is_slot()).collect();
            if non_spilled.len() as u32 <= k {
                continue;
            }

            let mut costed: Vec<(VarId, f64)> = non_spilled
                .iter()
                .map(|&v| {
                    let empty = Vec::new();
                    let uses = positions.get(&v).unwrap_or(&empty);
                    let cost = next_use_after(uses, pos).map(|nu| nu - pos).unwrap_or(f64::INFINITY);
                    (v, cost / divisor)
                })
                .collect();
            costed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

            let mut count = non_spilled.len();
            for (v, _) in costed {
                if count as u32 <= k {
                    break;
                }
                function.variable_mut(v).allocation = Allocation::Slot(v);
                spilled_any = true;
                count -= 1;
            }
        }
    }

    if spilled_any {
        log::debug!("belady spiller reduced pressure to fit k={k} (loop_biased={loop_biased})");
    }
    spilled_any
}
