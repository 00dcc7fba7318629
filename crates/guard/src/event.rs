use dupgate_detector::{UnavailabilityPolicy, VerdictReason};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// A proposed code write, as reported by the hook host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookEvent {
    pub tool_name: String,
    pub file_path: String,
    #[serde(alias = "content")]
    pub proposed_content: String,
    /// Language tag; detected from `file_path` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    #[default]
    Allow,
    Warn,
    Block,
}

impl Decision {
    /// Decision taken when the duplicate check could not run.
    #[must_use]
    pub const fn when_unavailable(policy: UnavailabilityPolicy) -> Self {
        match policy {
            UnavailabilityPolicy::FailClosed => Self::Block,
            UnavailabilityPolicy::FailOpen => Self::Warn,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-fragment outcome reported alongside the decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// `<file_path>:<symbol>`, `<file_path>:<file>` or `<file_path>:L<start>-<end>`
    pub origin: String,
    pub reason: VerdictReason,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardResponse {
    pub decision: Decision,
    pub rationale: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Fragments past `max_chunks` that were never checked
    #[serde(default)]
    pub unchecked: usize,
}

impl GuardResponse {
    pub fn allow(rationale: impl Into<String>) -> Self {
        Self {
            decision: Decision::Allow,
            rationale: rationale.into(),
            findings: Vec::new(),
            unchecked: 0,
        }
    }

    pub fn unavailable(policy: UnavailabilityPolicy, detail: impl Display) -> Self {
        Self {
            decision: Decision::when_unavailable(policy),
            rationale: format!("Duplicate check unavailable ({policy}): {detail}"),
            findings: Vec::new(),
            unchecked: 0,
        }
    }

    /// Record fragments that were dropped before checking.
    #[must_use]
    pub fn with_unchecked(mut self, unchecked: usize) -> Self {
        if unchecked > 0 {
            self.unchecked = unchecked;
            self.rationale.push_str(&format!(
                "; {unchecked} fragment(s) beyond max_chunks were not checked"
            ));
        }
        self
    }
}
