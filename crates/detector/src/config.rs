use crate::fragment::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// What a check reports when the model or store cannot be reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailabilityPolicy {
    /// Report "not a duplicate" and let the edit proceed
    #[default]
    FailOpen,
    /// Report "duplicate" and stop the edit
    FailClosed,
}

impl UnavailabilityPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailOpen => "fail_open",
            Self::FailClosed => "fail_closed",
        }
    }
}

impl Display for UnavailabilityPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnavailabilityPolicy {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_open" | "open" => Ok(Self::FailOpen),
            "fail_closed" | "closed" => Ok(Self::FailClosed),
            other => Err(format!(
                "unsupported unavailability policy '{other}' (expected 'fail_open' or 'fail_closed')"
            )),
        }
    }
}

/// Decision policy and collection binding for [`crate::DuplicateDetector`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Best score at or above this value is a duplicate
    pub similarity_threshold: f32,

    /// Fragments with fewer normalized tokens are never checked
    pub minimum_fragment_size: usize,

    /// Neighbors considered per check
    pub top_k: usize,

    pub unavailability_policy: UnavailabilityPolicy,

    pub collection_name: String,

    /// Must match the embedder's output width
    pub dimensionality: usize,

    /// Only compare against fragments of the same language
    pub same_language_only: bool,

    pub hash_algorithm: HashAlgorithm,

    pub embed_timeout_ms: u64,

    pub store_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.85,
            minimum_fragment_size: 16,
            top_k: 5,
            unavailability_policy: UnavailabilityPolicy::FailOpen,
            collection_name: "code_fragments".to_string(),
            dimensionality: 384,
            same_language_only: true,
            hash_algorithm: HashAlgorithm::Sha256,
            embed_timeout_ms: 2_000,
            store_timeout_ms: 1_000,
        }
    }
}

impl DetectorConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            ));
        }
        if self.top_k == 0 {
            return Err("top_k must be >= 1".to_string());
        }
        if self.dimensionality == 0 {
            return Err("dimensionality must be >= 1".to_string());
        }
        if self.collection_name.trim().is_empty() {
            return Err("collection_name must not be empty".to_string());
        }
        if self.embed_timeout_ms == 0 || self.store_timeout_ms == 0 {
            return Err("timeouts must be > 0 ms".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub const fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
