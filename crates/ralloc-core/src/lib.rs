//! Register sets, lifetime intervals, the two allocator families, and the resolution
//! passes that turn an allocation into executable code.

pub mod belady;
pub mod coloring;
pub mod error;
pub mod interference;
pub mod interval;
pub mod linear_scan;
pub mod phi_elim;
pub mod regset;
pub mod spill_code;

pub use error::AllocError;

use ralloc_analysis::pressure::instruction_pressure;
use ralloc_ir::Function;

/// Whether any instruction's register pressure already exceeds the budget `k`.
pub fn pressure_exceeds_k(function: &Function, k: u32) -> bool {
    function.blocks.iter().flat_map(|b| b.insts.iter()).any(|i| instruction_pressure(i) as u32 > k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralloc_analysis::{liveness::compute_liveness, numbering::number_instructions, rpo::reverse_postorder};
    use ralloc_ir::builder::FunctionBuilder;

    #[test]
    fn pressure_exceeds_k_reflects_the_busiest_instruction() {
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
            bb.op("iconst", Some(v2), vec![]);
            bb.op("combine", None, vec![v0, v1, v2]);
        }
        let mut f = builder.finish();
        let order = reverse_postorder(&f);
        number_instructions(&mut f, &order);
        compute_liveness(&mut f, &order).unwrap();

        assert!(pressure_exceeds_k(&f, 2));
        assert!(!pressure_exceeds_k(&f, 3));
    }
}
