//! Spill-code insertion: turns a spilled variable's definition and uses into explicit
//! `STORE`/`LOAD` instructions spliced over the arena IR.
//!
//! Memory slots are identified by the spilled variable's own id (`Allocation::Slot(v)`
//! means "the slot for `v`"); a `LOAD`/`STORE`'s slot operand rides along in
//! `debug_uses` as an `Operand::Var`, since it is never itself register-resident.

use std::collections::HashMap;

use ralloc_ir::{BlockId, Function, Inst, Opcode, Operand, Uses, VarId};

fn is_spilled(function: &Function, v: VarId) -> bool {
    function.variable(v).allocation.is_slot()
}

/// Insert loads, stores, and materialized φ-operand loads for every spilled variable.
pub fn insert_spill_code(function: &mut Function) {
    rewrite_phi_spill_uses(function);
    rewrite_nonphi_spill_occurrences(function);
}

fn rewrite_phi_spill_uses(function: &mut Function) {
    let block_ids: Vec<BlockId> = function.block_ids().collect();
    let mut rewrites: Vec<(BlockId, usize, BlockId, VarId)> = Vec::new();

    for &succ in &block_ids {
        let phi_count = function.block(succ).phis().count();
        for idx in 0..phi_count {
            let map = match &function.block(succ).insts[idx].uses {
                Uses::Phi(m) => m.clone(),
                _ => continue,
            };
            for (&pred, &v) in &map {
                if is_spilled(function, v) {
                    rewrites.push((succ, idx, pred, v));
                }
            }
        }
    }

    for (succ, idx, pred, old_var) in rewrites {
        let fresh = function.fresh_variable();
        let id = function.next_inst_id();
        let mut load = Inst::new(id, pred, Opcode::Load, Some(fresh), Uses::List(vec![]));
        load.debug_uses.push(Operand::Var(old_var));

        let insts = &mut function.block_mut(pred).insts;
        let insert_at = if insts.last().map_or(false, |i| i.opcode == Opcode::Branch) {
            insts.len() - 1
        } else {
            insts.len()
        };
        insts.insert(insert_at, load);

        if let Uses::Phi(map) = &mut function.block_mut(succ).insts[idx].uses {
            map.insert(pred, fresh);
        }
    }
}

fn rewrite_nonphi_spill_occurrences(function: &mut Function) {
    let block_ids: Vec<BlockId> = function.block_ids().collect();
    for block_id in block_ids {
        let old_insts = std::mem::take(&mut function.block_mut(block_id).insts);
        let mut new_insts = Vec::with_capacity(old_insts.len());

        for mut inst in old_insts {
            if inst.is_phi() {
                new_insts.push(inst);
                continue;
            }

            if let Uses::List(vars) = inst.uses.clone() {
                let mut replacements: HashMap<VarId, VarId> = HashMap::new();
                for v in vars {
                    if is_spilled(function, v) && !replacements.contains_key(&v) {
                        let fresh = function.fresh_variable();
                        let id = function.next_inst_id();
                        let mut load = Inst::new(id, block_id, Opcode::Load, Some(fresh), Uses::List(vec![]));
                        load.debug_uses.push(Operand::Var(v));
                        new_insts.push(load);
                        replacements.insert(v, fresh);
                    }
                }
                if !replacements.is_empty() {
                    if let Uses::List(vars_mut) = &mut inst.uses {
                        for v in vars_mut.iter_mut() {
                            if let Some(&fresh) = replacements.get(v) {
                                *v = fresh;
                            }
                        }
                    }
                }
            }

            let mut store_needed = None;
            if let Some(d) = inst.def {
                if is_spilled(function, d) {
                    let fresh = function.fresh_variable();
                    store_needed = Some((d, fresh));
                    inst.def = Some(fresh);
                }
            }

            new_insts.push(inst);

            if let Some((old_var, fresh)) = store_needed {
                let id = function.next_inst_id();
                let mut store = Inst::new(id, block_id, Opcode::Store, None, Uses::List(vec![fresh]));
                store.debug_uses.push(Operand::Var(old_var));
                new_insts.push(store);
            }
        }

        function.block_mut(block_id).insts = new_insts;
    }
}
