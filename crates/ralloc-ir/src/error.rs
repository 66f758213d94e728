use thiserror::Error;

use crate::{block::BlockId, value::VarId};

/// Errors raised while building or mutating IR, as opposed to errors raised while
/// allocating or analyzing it (those live in their owning crates).
#[derive(Debug, Error)]
pub enum IrError {
    #[error("block {0} has no predecessor corresponding to phi operand for {1}")]
    UnknownPhiPredecessor(BlockId, VarId),

    #[error("variable {0} referenced before it was created in this function")]
    UnknownVariable(VarId),

    #[error("block {0} referenced before it was created in this function")]
    UnknownBlock(BlockId),

    #[error("function has no instructions in block {0}, but one was expected")]
    EmptyBlock(BlockId),
}
