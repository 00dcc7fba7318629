use dupgate_code_chunker::ChunkerError;
use dupgate_detector::DetectorError;
use dupgate_vector_store::VectorStoreError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuardError>;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Chunker(#[from] ChunkerError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

impl GuardError {
    /// Model or store outage, as opposed to a configuration or input problem.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_unavailable(),
            Self::Detector(err) => err.is_unavailable(),
            Self::ConfigRead { .. }
            | Self::ConfigParse { .. }
            | Self::InvalidConfig(_)
            | Self::Chunker(_) => false,
        }
    }
}
