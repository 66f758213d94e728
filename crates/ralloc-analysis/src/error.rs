use thiserror::Error;

use ralloc_ir::BlockId;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("block {0} is unreachable from the entry block")]
    UnreachableBlock(BlockId),

    #[error("liveness fixpoint did not converge after {0} iterations")]
    LivenessDidNotConverge(usize),

    #[error("dominance computation found no idom for block {0}, which is not the entry")]
    MissingDominator(BlockId),
}
