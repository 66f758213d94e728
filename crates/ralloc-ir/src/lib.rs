//! SSA control-flow-graph IR for the register allocation research framework.
//!
//! This crate defines the core data model the rest of the framework operates on:
//! - [`VarId`] / [`Variable`]: SSA value identifiers and their allocation slot
//! - [`Allocation`] / [`Operand`]: the tagged sums used instead of string tags
//! - [`Inst`] / [`Opcode`]: instructions, including the distinguished PHI/LOAD/STORE/
//!   MOV/BRANCH opcodes
//! - [`BasicBlock`] / [`BlockId`]: basic blocks and their CFG edges
//! - [`Loop`]: natural loops (populated by `ralloc-analysis`)
//! - [`Function`] / [`Module`]: the top-level units of compilation
//!
//! Dataflow analyses and allocation live in the `ralloc-analysis` and `ralloc-core`
//! crates; this crate owns only the representation and structural operations
//! (construction, deep copy) that those crates operate on.

mod alloc;
mod block;
pub mod builder;
mod error;
mod function;
mod inst;
mod loops;
mod module;
mod value;

pub use alloc::{Allocation, Operand};
pub use block::{BasicBlock, BlockId};
pub use error::IrError;
pub use function::Function;
pub use inst::{Inst, Opcode, Uses};
pub use loops::{Loop, LoopId};
pub use module::Module;
pub use value::{VarId, Variable};
