//! Post-allocation sanity checks: re-verify, after the fact, that an allocation the
//! pluggable allocators and resolution passes produced is actually injective and that
//! resolution didn't corrupt data flow, grounded in the dataflow facts `ralloc-analysis`
//! and the graph facts `ralloc-core::interference` already expose.

use std::collections::{BTreeSet, HashSet};

use ralloc_ir::{Function, Opcode, Operand};

use crate::error::DriverError;

fn violation(function: &Function, block: ralloc_ir::BlockId, detail: impl Into<String>) -> DriverError {
    DriverError::SanityViolation { function: function.name.clone(), block: block.to_string(), detail: detail.into() }
}

/// For every instruction, every live variable must carry a register, and distinct live
/// variables must never share one.
pub fn allocation_is_correct(function: &Function) -> Result<(), DriverError> {
    for block in &function.blocks {
        for inst in &block.insts {
            let mut live: BTreeSet<_> = inst.live_in.clone();
            live.extend(inst.live_out.iter().copied());

            let mut seen_registers = HashSet::new();
            for v in live {
                let variable = function.variable(v);
                if variable.is_spilled() {
                    continue;
                }
                match variable.allocation.register() {
                    Some(reg) => {
                        if !seen_registers.insert(reg) {
                            return Err(violation(function, block.id, format!("register reg{reg} is bound to more than one simultaneously-live variable")));
                        }
                    }
                    None => {
                        return Err(violation(function, block.id, format!("{v} is live but carries no allocation")));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Structural checks on a transformed function against the function it was allocated
/// from: every instruction that survived from `original` must still exist there, spill
/// stores never redefine an SSA variable, and spill loads carry exactly one memory-slot
/// operand.
pub fn data_flow_is_correct(transformed: &Function, original: &Function) -> Result<(), DriverError> {
    for block in &transformed.blocks {
        for inst in &block.insts {
            if inst.opcode == Opcode::Store && inst.def.is_some() {
                return Err(violation(transformed, block.id, "a store instruction must not define an SSA variable"));
            }
            if inst.opcode == Opcode::Load {
                let slot_operands = inst.debug_uses.iter().filter(|o| matches!(o, Operand::Var(_))).count();
                if slot_operands != 1 {
                    return Err(violation(
                        transformed,
                        block.id,
                        "a load instruction must carry exactly one memory-slot operand",
                    ));
                }
            }
            if let Some(orig_id) = inst.original {
                let found = original.blocks.iter().flat_map(|b| b.insts.iter()).any(|i| i.id == orig_id);
                if !found {
                    return Err(violation(
                        transformed,
                        block.id,
                        format!("instruction {} claims an original id {orig_id} absent from the source function", inst.id),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Re-verify that `function`'s interference graph is chordal (the property the
/// graph-coloring allocator relies on to never backtrack).
pub fn is_chordal(function: &Function) -> bool {
    let graph = ralloc_core::interference::build_interference_graph(function);
    let order = ralloc_core::interference::lex_bfs_order(&graph);
    ralloc_core::interference::is_chordal(&graph, &order)
}
