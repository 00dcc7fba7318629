//! # dupgate guard
//!
//! Hook-facing side of dupgate: takes a proposed code write, checks each of
//! its functions against the index and answers `allow`, `warn` or `block`.
//!
//! ```text
//! HookEvent ──> write tool? ──no──> allow
//!                  │
//!                  └─> Chunker (functions / methods / whole file)
//!                        └─> DuplicateDetector::check × N  (JoinSet, latency budget)
//!                              └─> aggregate ──> GuardResponse
//! ```
//!
//! Configuration comes from `.dupgate/config.toml` (see [`GateConfig`]) with
//! `DUPGATE_*` environment overrides.

mod adapter;
mod config;
mod error;
mod event;

pub use adapter::{degraded_response, GuardAdapter};
pub use config::{
    GateConfig, GuardConfig, DEFAULT_CONFIG_PATH, ENV_EMBEDDING_MODE, ENV_MODEL_DIR,
    ENV_STORE_DIR, ENV_UNAVAILABILITY_POLICY,
};
pub use error::{GuardError, Result};
pub use event::{Decision, Finding, GuardResponse, HookEvent};
