use crate::embeddings::EmbeddingAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Embedding generator settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub algorithm: EmbeddingAlgorithm,

    /// Vector width; must equal the collection dimensionality
    pub dimension: usize,

    /// Directory holding `model.onnx` and `tokenizer.json` (onnx only)
    pub model_dir: PathBuf,

    /// Identifier recorded for the loaded model; defaults to the directory name
    pub model_id: Option<String>,

    /// Tokenizer truncation length (onnx only)
    pub max_length: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            algorithm: EmbeddingAlgorithm::Lexical,
            dimension: 384,
            model_dir: PathBuf::from("models"),
            model_id: None,
            max_length: 256,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.dimension == 0 {
            return Err("embedding dimension must be > 0".to_string());
        }
        if self.max_length == 0 {
            return Err("max_length must be > 0".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.model_dir.join("model.onnx")
    }

    #[must_use]
    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir.join("tokenizer.json")
    }
}

/// Local vector store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one `<collection>.json` per collection
    pub dir: PathBuf,

    /// Keep collections in memory only
    pub in_memory: bool,

    /// Longest wait for another writer's collection lock
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".dupgate").join("store"),
            in_memory: false,
            lock_timeout_ms: 1000,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.in_memory && self.dir.as_os_str().is_empty() {
            return Err("store dir must not be empty".to_string());
        }
        if self.lock_timeout_ms == 0 {
            return Err("lock_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
