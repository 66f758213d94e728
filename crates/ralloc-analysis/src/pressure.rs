//! Register pressure: how many variables are simultaneously live at a point. Computed
//! from the `live_in`/`live_out` sets liveness analysis already cached onto the IR.

use ralloc_ir::{BlockId, Function, Inst};

/// Pressure at a single instruction: the larger of its live-in and live-out set sizes,
/// since a value can be live across the instruction on either side of it.
pub fn instruction_pressure(inst: &Inst) -> usize {
    inst.live_in.len().max(inst.live_out.len())
}

/// The maximum instruction pressure within one block.
pub fn block_pressure(function: &Function, block: BlockId) -> usize {
    function
        .block(block)
        .insts
        .iter()
        .map(instruction_pressure)
        .max()
        .unwrap_or(0)
}

/// The maximum instruction pressure across the whole function.
pub fn function_pressure(function: &Function) -> usize {
    function.block_ids().map(|b| block_pressure(function, b)).max().unwrap_or(0)
}

/// The largest number of non-φ uses at any single instruction: the lower bound any
/// allocator must respect even if it spills every value it legally can.
pub fn minimal_register_pressure(function: &Function) -> usize {
    function
        .blocks
        .iter()
        .flat_map(|b| b.non_phis())
        .map(|inst| inst.uses.variables().len())
        .max()
        .unwrap_or(0)
}
