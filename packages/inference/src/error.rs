use miniscript_catalog::CatalogError;
use thiserror::Error;

/// Document-level failures. Resolution itself never fails; a missing
/// member degrades to `any`.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Block '{0}' does not belong to this document")]
    UnknownBlock(String),

    #[error("Block '{0}' has not been analyzed")]
    BlockNotAnalyzed(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

pub type InferenceResult<T> = Result<T, InferenceError>;
