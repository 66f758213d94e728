use thiserror::Error;

use ralloc_ir::VarId;

#[derive(Debug, Error)]
pub enum AllocError {
    #[error("no scratch register or memory slot available to resolve a move cycle")]
    NoScratchForCycle,

    #[error("mem-to-mem move for {dst} <- {src} requires a scratch register that the budget does not provide")]
    NoScratchForMemToMem { dst: VarId, src: VarId },

    #[error("graph coloring was asked to color a non-chordal interference graph")]
    NotChordal,
}
