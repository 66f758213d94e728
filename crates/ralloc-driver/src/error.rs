use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{file}: {detail}")]
    Input { file: String, detail: String },

    #[error("sanity check failed in {function}::{block}: {detail}")]
    SanityViolation { function: String, block: String, detail: String },

    #[error(transparent)]
    Analysis(#[from] ralloc_analysis::AnalysisError),
}
