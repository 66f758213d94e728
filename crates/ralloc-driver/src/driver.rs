//! The two-phase allocation pipeline: a spilling pass establishes which variables need
//! memory, a non-spilling confirmation pass checks the result actually fits the budget,
//! and φ-elimination resolves the allocation into executable moves. Composes
//! `ralloc-core`'s allocator families and resolution passes the way `ralloc-analysis`
//! composes its own dataflow passes under `analyze()`.

use std::collections::BTreeMap;

use ralloc_core::{
    interval::{build_basic_intervals, build_extended_intervals},
    linear_scan::{allocate_basic, allocate_extended, SpillPolicy},
    phi_elim::eliminate_phi,
    spill_code::insert_spill_code,
    AllocError,
};
use ralloc_ir::{BlockId, Function, Module};

use crate::{error::DriverError, sanity};

/// Which allocator family (and, for linear scan, which spill policy) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    LinearScanBasic(SpillPolicy),
    LinearScanExtended(SpillPolicy),
    GraphColoring { loop_biased: bool },
}

/// Why an allocation attempt failed, distinguishing the three causes the driver can
/// tell apart (see the retry logic in [`allocate_function`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The spilling-disabled confirmation pass ran out of registers at a `first_K`
    /// still above zero; the driver had room to retry with a tighter budget.
    NoRegisterAvailable,
    /// φ-elimination could not resolve every move cycle (no scratch register or slot).
    PhiEliminationImpossible,
    /// The confirmation pass still could not fit the allocation even once `first_K`
    /// was driven all the way down to zero.
    PressureExceedsKAfterSpill,
    /// Graph coloring was asked to color an interference graph with no perfect
    /// elimination order; a tighter `first_K` doesn't fix this, so the driver doesn't
    /// retry once it sees this reason.
    NonChordalInterferenceGraph,
}

/// The outcome of attempting to allocate one function at budget `k`.
#[derive(Debug, Clone)]
pub enum AllocResult {
    Allocated { function: Function, spill_count: usize, max_pressure: u32 },
    Failed { reason: FailureReason },
}

fn run_allocator(
    function: &mut Function,
    order: &[BlockId],
    k: u32,
    spilling: bool,
    strategy: Strategy,
) -> Result<bool, AllocError> {
    match strategy {
        Strategy::LinearScanBasic(policy) => {
            let mut intervals = build_basic_intervals(function, order);
            Ok(allocate_basic(function, &mut intervals, k, spilling, policy))
        }
        Strategy::LinearScanExtended(policy) => {
            let mut intervals = build_extended_intervals(function, order);
            Ok(allocate_extended(function, &mut intervals, k, spilling, policy))
        }
        Strategy::GraphColoring { loop_biased } => ralloc_core::coloring::allocate_coloring(function, order, k, loop_biased),
    }
}

fn max_pressure(function: &Function) -> u32 {
    ralloc_analysis::pressure::function_pressure(function) as u32
}

fn spill_count(function: &Function) -> usize {
    function.variables().filter(|v| v.is_spilled()).count()
}

fn finish(mut g: Function) -> Result<AllocResult, DriverError> {
    ralloc_analysis::analyze(&mut g)?;
    sanity::allocation_is_correct(&g)?;
    Ok(AllocResult::Allocated { spill_count: spill_count(&g), max_pressure: max_pressure(&g), function: g })
}

/// Run the two-phase allocation pipeline for one function at register budget `k`,
/// descending `first_K` from `k` down to `0` whenever the spilling pass, the
/// confirmation pass, or φ-elimination itself needs a tighter budget to stabilise.
pub fn allocate_function(f: &Function, k: u32, strategy: Strategy) -> Result<AllocResult, DriverError> {
    let original = f.clone();
    let mut last_reason = FailureReason::PressureExceedsKAfterSpill;

    for first_k in (0..=k).rev() {
        let mut g = f.deep_copy();
        ralloc_analysis::analyze(&mut g)?;
        let order = ralloc_analysis::rpo::reverse_postorder(&g);

        let clean = match run_allocator(&mut g, &order, first_k, true, strategy) {
            Ok(clean) => clean,
            Err(AllocError::NotChordal) => {
                log::debug!("{}: interference graph at first_k={first_k} has no perfect elimination order", f.name);
                return Ok(AllocResult::Failed { reason: FailureReason::NonChordalInterferenceGraph });
            }
            Err(e) => unreachable!("first pass never resolves moves, only colors or spills: {e}"),
        };
        if clean {
            match eliminate_phi(&mut g, k) {
                Ok(()) => {
                    ralloc_analysis::analyze(&mut g)?;
                    sanity::data_flow_is_correct(&g, &original)?;
                    return finish(g);
                }
                Err(e) => {
                    log::debug!("{}: phi elimination failed at first_k={first_k} ({e}), retrying with a tighter budget", f.name);
                    last_reason = FailureReason::PhiEliminationImpossible;
                    continue;
                }
            }
        }

        log::debug!("{}: spilling pass at first_k={first_k} needed to spill, inserting spill code", f.name);
        insert_spill_code(&mut g);
        let mut h = g.deep_copy();
        ralloc_analysis::analyze(&mut h)?;
        let order_h = ralloc_analysis::rpo::reverse_postorder(&h);

        let clean2 = match run_allocator(&mut h, &order_h, k, false, strategy) {
            Ok(clean2) => clean2,
            Err(AllocError::NotChordal) => {
                log::debug!("{}: interference graph after spilling has no perfect elimination order", f.name);
                return Ok(AllocResult::Failed { reason: FailureReason::NonChordalInterferenceGraph });
            }
            Err(e) => unreachable!("confirmation pass never resolves moves, only colors or spills: {e}"),
        };
        if clean2 {
            match eliminate_phi(&mut h, k) {
                Ok(()) => {
                    ralloc_analysis::analyze(&mut h)?;
                    sanity::data_flow_is_correct(&h, &original)?;
                    return finish(h);
                }
                Err(e) => {
                    log::debug!("{}: phi elimination failed after spilling at first_k={first_k} ({e})", f.name);
                    last_reason = FailureReason::PhiEliminationImpossible;
                }
            }
        } else if first_k == 0 {
            log::debug!("{}: confirmation pass still short of registers at first_k=0", f.name);
            last_reason = FailureReason::PressureExceedsKAfterSpill;
        } else {
            log::debug!("{}: confirmation pass at first_k={first_k} ran short of registers, retrying", f.name);
            last_reason = FailureReason::NoRegisterAvailable;
        }
    }

    Ok(AllocResult::Failed { reason: last_reason })
}

/// Allocate every function in `module` independently at budget `k`. Each function's
/// deep copy is private to its own attempt, so these are safe to dispatch across a
/// thread pool; this entry point itself just runs them in sequence.
pub fn allocate_module(module: &Module, k: u32, strategy: Strategy) -> BTreeMap<String, Result<AllocResult, DriverError>> {
    module.function_names().map(|name| (name.to_string(), allocate_function(module.function(name).unwrap(), k, strategy))).collect()
}
