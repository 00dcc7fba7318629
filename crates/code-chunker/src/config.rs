use serde::{Deserialize, Serialize};

/// Configuration for fragment extraction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Extract methods from classes, impl and trait blocks
    pub include_methods: bool,

    /// Emit the whole file as one chunk when no functions are found
    pub whole_file_fallback: bool,

    /// Upper bound on chunks returned for one file
    pub max_chunks: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            include_methods: true,
            whole_file_fallback: true,
            max_chunks: 64,
        }
    }
}

impl ChunkerConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunks == 0 {
            return Err("max_chunks must be > 0".to_string());
        }
        Ok(())
    }
}
