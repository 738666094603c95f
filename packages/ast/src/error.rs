use thiserror::Error;

pub type AstResult<T> = Result<T, AstError>;

#[derive(Error, Debug)]
pub enum AstError {
    #[error("Malformed AST payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Node id '{0}' is used by more than one block")]
    DuplicateBlockId(String),
}
