use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Empty input: nothing left to embed")]
    EmptyInput,

    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Collection '{collection}' already exists with dimension {existing}, requested {requested}"
    )]
    DimensionalityConflict {
        collection: String,
        existing: usize,
        requested: usize,
    },

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VectorStoreError {
    /// Failures of an external collaborator (model or store) rather than of the request.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_) | Self::StoreUnavailable(_))
    }

    pub(crate) fn store_io(context: impl std::fmt::Display, error: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable(format!("{context}: {error}"))
    }
}
