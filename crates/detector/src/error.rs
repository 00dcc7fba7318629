use dupgate_vector_store::VectorStoreError;
use thiserror::Error;

/// Result type for detector operations
pub type Result<T> = std::result::Result<T, DetectorError>;

#[derive(Error, Debug)]
pub enum DetectorError {
    /// Detector configuration failed validation
    #[error("Invalid detector configuration: {0}")]
    InvalidConfig(String),

    /// Embedding or storage failure that the unavailability policy does not cover
    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

impl DetectorError {
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_unavailable(),
            Self::InvalidConfig(_) => false,
        }
    }
}
