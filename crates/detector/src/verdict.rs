use dupgate_vector_store::SimilarityMatch;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    /// Too few tokens to be worth checking; nothing was embedded or queried
    BelowMinSize,
    /// Best match scored under the threshold (0.0 when nothing matched)
    BelowThreshold,
    /// Every candidate came from the fragment's own origin
    SelfMatchExcluded,
    /// Model or store unreachable; `is_duplicate` follows the policy
    StoreUnavailable,
    /// Best match from another origin scored at or above the threshold
    AboveThreshold,
    /// Nothing left after normalization
    EmptyInput,
}

impl VerdictReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BelowMinSize => "below_min_size",
            Self::BelowThreshold => "below_threshold",
            Self::SelfMatchExcluded => "self_match_excluded",
            Self::StoreUnavailable => "store_unavailable",
            Self::AboveThreshold => "above_threshold",
            Self::EmptyInput => "empty_input",
        }
    }
}

impl Display for VerdictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one duplicate check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub best_match: Option<SimilarityMatch>,
    pub score: f32,
    pub reason: VerdictReason,
    /// Whether this call wrote the fragment to the store
    pub indexed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl DuplicateVerdict {
    /// Verdict reached without consulting the store
    #[must_use]
    pub const fn skipped(reason: VerdictReason) -> Self {
        Self {
            is_duplicate: false,
            best_match: None,
            score: 0.0,
            reason,
            indexed: false,
            detail: None,
        }
    }

    #[must_use]
    pub fn unavailable(is_duplicate: bool, detail: impl Into<String>) -> Self {
        Self {
            is_duplicate,
            detail: Some(detail.into()),
            ..Self::skipped(VerdictReason::StoreUnavailable)
        }
    }

    #[must_use]
    pub fn matched(best_match: SimilarityMatch) -> Self {
        Self {
            is_duplicate: true,
            score: best_match.score,
            best_match: Some(best_match),
            reason: VerdictReason::AboveThreshold,
            indexed: false,
            detail: None,
        }
    }

    #[must_use]
    pub fn not_duplicate(reason: VerdictReason, best_match: Option<SimilarityMatch>) -> Self {
        Self {
            is_duplicate: false,
            score: best_match.as_ref().map_or(0.0, |m| m.score),
            best_match,
            reason,
            indexed: false,
            detail: None,
        }
    }
}
