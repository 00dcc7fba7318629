use crate::error::{GuardError, Result};
use crate::event::Decision;
use dupgate_code_chunker::ChunkerConfig;
use dupgate_detector::{DetectorConfig, UnavailabilityPolicy};
use dupgate_vector_store::{EmbeddingAlgorithm, EmbeddingConfig, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file used when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = ".dupgate/config.toml";

pub const ENV_EMBEDDING_MODE: &str = "DUPGATE_EMBEDDING_MODE";
pub const ENV_MODEL_DIR: &str = "DUPGATE_MODEL_DIR";
pub const ENV_STORE_DIR: &str = "DUPGATE_STORE_DIR";
pub const ENV_UNAVAILABILITY_POLICY: &str = "DUPGATE_UNAVAILABILITY_POLICY";

/// How hook events are turned into decisions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuardConfig {
    /// Upper bound on the whole evaluation of one event
    pub latency_budget_ms: u64,

    /// Decision for a confirmed duplicate: `block` or `warn`
    pub on_duplicate: Decision,

    /// Best scores from here up to the similarity threshold produce a warning
    pub warn_threshold: Option<f32>,

    /// Tool names that write code; other events are allowed untouched
    pub write_tools: Vec<String>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            latency_budget_ms: 5_000,
            on_duplicate: Decision::Block,
            warn_threshold: Some(0.75),
            write_tools: vec![
                "Write".to_string(),
                "Edit".to_string(),
                "MultiEdit".to_string(),
            ],
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.latency_budget_ms == 0 {
            return Err("latency_budget_ms must be > 0".to_string());
        }
        if self.on_duplicate == Decision::Allow {
            return Err("on_duplicate must be 'block' or 'warn'".to_string());
        }
        if let Some(warn) = self.warn_threshold {
            if !(0.0..=1.0).contains(&warn) {
                return Err(format!("warn_threshold must be in [0, 1], got {warn}"));
            }
        }
        Ok(())
    }

    #[must_use]
    pub const fn latency_budget(&self) -> Duration {
        Duration::from_millis(self.latency_budget_ms)
    }

    #[must_use]
    pub fn is_write_tool(&self, tool_name: &str) -> bool {
        self.write_tools.iter().any(|tool| tool == tool_name)
    }
}

/// Everything the `dupgate` binary needs, as read from `config.toml`
///
/// ```toml
/// [detector]
/// similarity_threshold = 0.9
/// unavailability_policy = "fail_closed"
///
/// [embedding]
/// algorithm = "onnx"
/// model_dir = "models/minilm"
///
/// [guard]
/// on_duplicate = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GateConfig {
    pub detector: DetectorConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub chunker: ChunkerConfig,
    pub guard: GuardConfig,
}

impl GateConfig {
    /// Load from `path` (which must exist) or from [`DEFAULT_CONFIG_PATH`]
    /// when present, apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)?
                } else {
                    log::debug!("No {DEFAULT_CONFIG_PATH}, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| GuardError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&raw).map_err(|source| GuardError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Apply `DUPGATE_*` overrides; `lookup` returns the variable's value.
    /// Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(mode) = get(ENV_EMBEDDING_MODE) {
            self.embedding.algorithm = mode
                .parse::<EmbeddingAlgorithm>()
                .map_err(|err| GuardError::InvalidConfig(format!("{ENV_EMBEDDING_MODE}: {err}")))?;
        }
        if let Some(dir) = get(ENV_MODEL_DIR) {
            self.embedding.model_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(ENV_STORE_DIR) {
            self.store.dir = PathBuf::from(dir);
            self.store.in_memory = false;
        }
        if let Some(policy) = get(ENV_UNAVAILABILITY_POLICY) {
            self.detector.unavailability_policy = policy
                .parse::<UnavailabilityPolicy>()
                .map_err(|err| {
                    GuardError::InvalidConfig(format!("{ENV_UNAVAILABILITY_POLICY}: {err}"))
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let sections = [
            ("detector", self.detector.validate()),
            ("embedding", self.embedding.validate()),
            ("store", self.store.validate()),
            ("chunker", self.chunker.validate()),
            ("guard", self.guard.validate()),
        ];
        for (section, outcome) in sections {
            outcome.map_err(|msg| GuardError::InvalidConfig(format!("[{section}] {msg}")))?;
        }

        if self.embedding.dimension != self.detector.dimensionality {
            return Err(GuardError::InvalidConfig(format!(
                "embedding.dimension ({}) must equal detector.dimensionality ({})",
                self.embedding.dimension, self.detector.dimensionality
            )));
        }
        if let Some(warn) = self.guard.warn_threshold {
            if warn > self.detector.similarity_threshold {
                return Err(GuardError::InvalidConfig(format!(
                    "guard.warn_threshold ({warn}) must not exceed detector.similarity_threshold ({})",
                    self.detector.similarity_threshold
                )));
            }
        }
        Ok(())
    }
}
