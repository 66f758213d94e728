//! Dataflow analyses over the CFG IR defined in `ralloc-ir`: reverse postorder,
//! instruction numbering, liveness, dominance, natural loops, and register pressure.
//!
//! These analyses mutate the IR in place (writing into the `live_in`/`live_out`/
//! `dominators`/`loop_id` fields `ralloc-ir` already reserves for them) rather than
//! returning a side table, so downstream allocator and resolution passes in
//! `ralloc-core` read them directly off blocks and instructions.

pub mod dominance;
pub mod error;
pub mod liveness;
pub mod loops;
pub mod numbering;
pub mod pressure;
pub mod rpo;

pub use error::AnalysisError;

use ralloc_ir::Function;

/// Run every analysis over `function` in dependency order: reverse postorder,
/// numbering, liveness, dominance, loops. Register pressure is computed on demand from
/// the results, so it has no step here.
pub fn analyze(function: &mut Function) -> Result<(), AnalysisError> {
    let order = rpo::reverse_postorder(function);
    numbering::number_instructions(function, &order);
    liveness::compute_liveness(function, &order)?;
    dominance::compute_dominators(function, &order)?;
    loops::find_loops(function, &order);
    Ok(())
}
