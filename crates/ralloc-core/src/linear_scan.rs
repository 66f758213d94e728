//! Basic and extended (Wimmer–Franz-style SSA) linear-scan allocation, driven off
//! interval actions rather than a single forward instruction walk, since the extended
//! variant's intervals may have holes.

use ralloc_ir::{Allocation, Function, VarId};

use crate::{
    interval::{BasicInterval, ExtendedInterval},
    regset::RegisterSet,
};

/// Which active interval to evict when a definition needs a register and none is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpillPolicy {
    /// Evict whichever active interval ends latest; steal its register if that's later
    /// than the interval being allocated, otherwise spill the new interval instead.
    FurthestFirst,
    /// Always spill the interval currently being allocated.
    CurrentFirst,
    /// Evict whichever active interval has the fewest recorded uses. Ties break by the
    /// largest `to`, then by the smallest variable id.
    LessUsedFirst,
    /// Evict whichever active interval's next use (after the current position) is
    /// latest; falls back to furthest-first when the new interval's own next use is
    /// later still.
    FurthestNextUseFirst,
}

fn spill(function: &mut Function, var: VarId) {
    function.variable_mut(var).allocation = Allocation::Slot(var);
}

fn next_use_after(function: &Function, iv: &BasicInterval, pos: f64) -> Option<f64> {
    iv.uses
        .iter()
        .filter_map(|&id| find_inst_num(function, id))
        .filter(|&n| n >= pos)
        .fold(None, |acc, n| Some(acc.map_or(n, |a: f64| a.min(n))))
}

fn extended_next_use_after(iv: &ExtendedInterval, pos: f64) -> Option<f64> {
    iv.uses.iter().map(|&(p, _)| p).filter(|&p| p >= pos).fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.min(p))))
}

fn find_inst_num(function: &Function, id: u32) -> Option<f64> {
    function.blocks.iter().flat_map(|b| b.insts.iter()).find(|i| i.id == id).and_then(|i| i.num)
}

/// Run one basic linear-scan pass. Returns `true` iff no interval was spilled.
///
/// When `spilling` is `false`, any definition that would otherwise need a spill
/// decision instead returns `false` immediately, since a non-spilling pass is only
/// meant to confirm that the prior spilling pass's choices already fit in `k`.
pub fn allocate_basic(
    function: &mut Function,
    intervals: &mut [BasicInterval],
    k: u32,
    spilling: bool,
    policy: SpillPolicy,
) -> bool {
    let mut order: Vec<usize> = (0..intervals.len()).collect();
    order.sort_by(|&a, &b| intervals[a].fr.partial_cmp(&intervals[b].fr).unwrap());

    let mut regs = RegisterSet::new(k);
    let mut active: Vec<usize> = Vec::new();
    let mut assigned: Vec<Option<u32>> = vec![None; intervals.len()];
    let mut clean = true;

    for &i in &order {
        let fr = intervals[i].fr;

        active.retain(|&a| {
            if intervals[a].to <= fr {
                if let Some(reg) = assigned[a] {
                    regs.release(reg);
                }
                false
            } else {
                true
            }
        });

        if let Some(reg) = regs.acquire() {
            assigned[i] = Some(reg);
            active.push(i);
            active.sort_by(|&a, &b| intervals[a].to.partial_cmp(&intervals[b].to).unwrap());
            continue;
        }

        if !spilling {
            return false;
        }

        clean = false;
        match policy {
            SpillPolicy::CurrentFirst => {
                spill(function, intervals[i].var);
            }
            SpillPolicy::FurthestFirst => {
                let victim = *active.last().unwrap();
                if intervals[victim].to > intervals[i].to {
                    let reg = assigned[victim].unwrap();
                    spill(function, intervals[victim].var);
                    active.retain(|&a| a != victim);
                    assigned[i] = Some(reg);
                    active.push(i);
                    active.sort_by(|&a, &b| intervals[a].to.partial_cmp(&intervals[b].to).unwrap());
                } else {
                    spill(function, intervals[i].var);
                }
            }
            SpillPolicy::LessUsedFirst => {
                let victim = *active
                    .iter()
                    .min_by(|&&a, &&b| {
                        intervals[a]
                            .len()
                            .cmp(&intervals[b].len())
                            .then(intervals[b].to.partial_cmp(&intervals[a].to).unwrap())
                            .then(intervals[a].var.cmp(&intervals[b].var))
                    })
                    .unwrap();
                let reg = assigned[victim].unwrap();
                spill(function, intervals[victim].var);
                active.retain(|&a| a != victim);
                assigned[i] = Some(reg);
                active.push(i);
                active.sort_by(|&a, &b| intervals[a].to.partial_cmp(&intervals[b].to).unwrap());
            }
            SpillPolicy::FurthestNextUseFirst => {
                let mine = next_use_after(function, &intervals[i], fr).unwrap_or(f64::INFINITY);
                let victim = *active
                    .iter()
                    .max_by(|&&a, &&b| {
                        let na = next_use_after(function, &intervals[a], fr).unwrap_or(f64::INFINITY);
                        let nb = next_use_after(function, &intervals[b], fr).unwrap_or(f64::INFINITY);
                        na.partial_cmp(&nb).unwrap()
                    })
                    .unwrap();
                let victim_next = next_use_after(function, &intervals[victim], fr).unwrap_or(f64::INFINITY);
                if mine > victim_next {
                    spill(function, intervals[i].var);
                } else {
                    let reg = assigned[victim].unwrap();
                    spill(function, intervals[victim].var);
                    active.retain(|&a| a != victim);
                    assigned[i] = Some(reg);
                    active.push(i);
                    active.sort_by(|&a, &b| intervals[a].to.partial_cmp(&intervals[b].to).unwrap());
                }
            }
        }
    }

    for (i, reg) in assigned.iter().enumerate() {
        if let Some(reg) = reg {
            function.variable_mut(intervals[i].var).allocation = Allocation::Register(*reg);
        }
    }

    log::debug!("basic linear scan finished, clean={clean}, k={k}");
    clean
}

/// An action in the extended linear-scan sweep: a subinterval starting or ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionKind {
    End,
    Start,
}

/// Run one extended (hole-aware) linear-scan pass. Returns `true` iff no interval was
/// spilled.
pub fn allocate_extended(
    function: &mut Function,
    intervals: &mut [ExtendedInterval],
    k: u32,
    spilling: bool,
    policy: SpillPolicy,
) -> bool {
    #[derive(Clone, Copy)]
    struct Action {
        pos: f64,
        kind: ActionKind,
        interval: usize,
        sub_index: usize,
    }

    let mut actions: Vec<Action> = Vec::new();
    for (i, iv) in intervals.iter().enumerate() {
        for (s, &(fr, to)) in iv.subintervals.iter().enumerate() {
            actions.push(Action { pos: fr, kind: ActionKind::Start, interval: i, sub_index: s });
            actions.push(Action { pos: to, kind: ActionKind::End, interval: i, sub_index: s });
        }
    }
    actions.sort_by(|a, b| {
        a.pos
            .partial_cmp(&b.pos)
            .unwrap()
            .then(if a.kind == ActionKind::End && b.kind == ActionKind::Start {
                std::cmp::Ordering::Less
            } else if a.kind == ActionKind::Start && b.kind == ActionKind::End {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            })
    });

    let mut regs = RegisterSet::new(k);
    let mut assigned: Vec<Option<u32>> = vec![None; intervals.len()];
    let mut active: Vec<usize> = Vec::new();
    let mut inactive: Vec<usize> = Vec::new();
    let mut clean = true;

    for action in actions {
        let iv_idx = action.interval;
        match action.kind {
            ActionKind::End => {
                let is_last = action.sub_index + 1 == intervals[iv_idx].subintervals.len();
                if is_last {
                    active.retain(|&a| a != iv_idx);
                    if let Some(reg) = assigned[iv_idx].take() {
                        regs.release(reg);
                    }
                } else {
                    active.retain(|&a| a != iv_idx);
                    inactive.push(iv_idx);
                    if let Some(reg) = assigned[iv_idx] {
                        regs.release(reg);
                    }
                }
            }
            ActionKind::Start => {
                if action.sub_index == 0 {
                    let mut got = regs.acquire();
                    if got.is_none() {
                        let candidate = inactive.iter().copied().find(|&cand| {
                            assigned[cand].is_some() && !active.iter().any(|&a| assigned[a] == assigned[cand])
                        });
                        if let Some(cand) = candidate {
                            inactive.retain(|&x| x != cand);
                            got = assigned[cand].take();
                        }
                    }

                    match got {
                        Some(reg) => {
                            assigned[iv_idx] = Some(reg);
                            active.push(iv_idx);
                        }
                        None => {
                            if !spilling {
                                return false;
                            }
                            clean = false;
                            match policy {
                                SpillPolicy::CurrentFirst => spill(function, intervals[iv_idx].var),
                                SpillPolicy::FurthestFirst => {
                                    if let Some(&victim) =
                                        active.iter().max_by(|&&a, &&b| intervals[a].to.partial_cmp(&intervals[b].to).unwrap())
                                    {
                                        if intervals[victim].to > intervals[iv_idx].to {
                                            let reg = assigned[victim].take().unwrap();
                                            spill(function, intervals[victim].var);
                                            active.retain(|&a| a != victim);
                                            assigned[iv_idx] = Some(reg);
                                            active.push(iv_idx);
                                        } else {
                                            spill(function, intervals[iv_idx].var);
                                        }
                                    } else {
                                        spill(function, intervals[iv_idx].var);
                                    }
                                }
                                SpillPolicy::LessUsedFirst => {
                                    if let Some(&victim) = active.iter().min_by(|&&a, &&b| {
                                        intervals[a]
                                            .uses
                                            .len()
                                            .cmp(&intervals[b].uses.len())
                                            .then(intervals[b].to.partial_cmp(&intervals[a].to).unwrap())
                                            .then(intervals[a].var.cmp(&intervals[b].var))
                                    }) {
                                        let reg = assigned[victim].take().unwrap();
                                        spill(function, intervals[victim].var);
                                        active.retain(|&a| a != victim);
                                        assigned[iv_idx] = Some(reg);
                                        active.push(iv_idx);
                                    } else {
                                        spill(function, intervals[iv_idx].var);
                                    }
                                }
                                SpillPolicy::FurthestNextUseFirst => {
                                    let mine = extended_next_use_after(&intervals[iv_idx], action.pos).unwrap_or(f64::INFINITY);
                                    let victim = active.iter().copied().max_by(|&a, &b| {
                                        let na = extended_next_use_after(&intervals[a], action.pos).unwrap_or(f64::INFINITY);
                                        let nb = extended_next_use_after(&intervals[b], action.pos).unwrap_or(f64::INFINITY);
                                        na.partial_cmp(&nb).unwrap()
                                    });
                                    match victim {
                                        Some(victim) => {
                                            let victim_next =
                                                extended_next_use_after(&intervals[victim], action.pos).unwrap_or(f64::INFINITY);
                                            if mine > victim_next {
                                                spill(function, intervals[iv_idx].var);
                                            } else {
                                                let reg = assigned[victim].take().unwrap();
                                                spill(function, intervals[victim].var);
                                                active.retain(|&a| a != victim);
                                                assigned[iv_idx] = Some(reg);
                                                active.push(iv_idx);
                                            }
                                        }
                                        None => spill(function, intervals[iv_idx].var),
                                    }
                                }
                            }
                        }
                    }
                } else {
                    active.push(iv_idx);
                    inactive.retain(|&x| x != iv_idx);
                    if assigned[iv_idx].is_none() {
                        if let Some(reg) = regs.acquire() {
                            assigned[iv_idx] = Some(reg);
                        }
                    } else if let Some(reg) = assigned[iv_idx] {
                        regs.occupy(reg);
                    }
                }
            }
        }
    }

    for (i, reg) in assigned.iter().enumerate() {
        if let Some(reg) = reg {
            function.variable_mut(intervals[i].var).allocation = Allocation::Register(*reg);
        }
    }

    log::debug!("extended linear scan finished, clean={clean}, k={k}");
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::build_basic_intervals;
    use ralloc_analysis::{liveness::compute_liveness, numbering::number_instructions, rpo::reverse_postorder};
    use ralloc_ir::builder::FunctionBuilder;

    fn three_variable_function() -> Function {
        let mut builder = FunctionBuilder::new("f");
        let entry = builder.create_block();
        builder.set_entry(entry);
        let v0 = builder.new_variable();
        let v1 = builder.new_variable();
        let v2 = builder.new_variable();
        {
            let mut bb = builder.block_builder(entry);
            bb.op("iconst", Some(v0), vec![]);
            bb.op("iconst", Some(v1), vec![]);
            bb.op("iadd", Some(v2), vec![v0, v1]);
            bb.op("ret", None, vec![v2]);
        }
        builder.finish()
    }

    #[test]
    fn enough_registers_allocates_cleanly() {
        let mut f = three_variable_function();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        let mut intervals = build_basic_intervals(&f, &order);
        let clean = allocate_basic(&mut f, &mut intervals, 3, true, SpillPolicy::FurthestFirst);
        assert!(clean);
        for v in f.variables() {
            assert!(v.allocation.is_register());
        }
    }

    #[test]
    fn insufficient_registers_forces_a_spill() {
        let mut f = three_variable_function();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        let mut intervals = build_basic_intervals(&f, &order);
        let clean = allocate_basic(&mut f, &mut intervals, 1, true, SpillPolicy::CurrentFirst);
        assert!(!clean);
        assert!(f.variables().any(|v| v.allocation.is_slot()));
    }

    #[test]
    fn non_spilling_pass_fails_fast_when_short_on_registers() {
        let mut f = three_variable_function();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();
        let mut intervals = build_basic_intervals(&f, &order);
        let ok = allocate_basic(&mut f, &mut intervals, 1, false, SpillPolicy::CurrentFirst);
        assert!(!ok);
    }
}
