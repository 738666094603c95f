use thiserror::Error;

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog load failures. All of them are fatal configuration errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Malformed catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Member '{member}' of type '{type_name}' has no type")]
    MissingType { type_name: String, member: String },

    #[error("Argument '{argument}' of '{type_name}.{member}' has no label")]
    MissingArgumentLabel {
        type_name: String,
        member: String,
        argument: usize,
    },
}

impl CatalogError {
    pub fn missing_type(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        Self::MissingType {
            type_name: type_name.into(),
            member: member.into(),
        }
    }
}
