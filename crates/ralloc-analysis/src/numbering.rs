//! Instruction numbering: consecutive integers in listing order over a given block
//! order, with the `±0.5` convention for interval endpoints that must sit strictly
//! between two blocks (used by lifetime-interval construction in `ralloc-core`).

use ralloc_ir::{BlockId, Function};

/// Number every instruction in `order` consecutively starting at 0, writing the result
/// into each instruction's `num` field.
pub fn number_instructions(function: &mut Function, order: &[BlockId]) {
    let mut n = 0.0;
    for &block in order {
        for inst in &mut function.block_mut(block).insts {
            inst.num = Some(n);
            n += 1.0;
        }
    }
}

/// The position just before the first instruction of `block`, or `None` if the block
/// hasn't been numbered or has no instructions.
pub fn block_start(function: &Function, block: BlockId) -> Option<f64> {
    function.block(block).first_num().map(|n| n - 0.5)
}

/// The position just after the last instruction of `block`.
pub fn block_end(function: &Function, block: BlockId) -> Option<f64> {
    function.block(block).last_num().map(|n| n + 0.5)
}
