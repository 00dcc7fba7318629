use crate::config::{GateConfig, GuardConfig};
use crate::error::{GuardError, Result};
use crate::event::{Decision, Finding, GuardResponse, HookEvent};
use dupgate_code_chunker::{Chunker, ChunkerError, Language};
use dupgate_detector::{
    CodeFragment, DetectorError, DuplicateDetector, DuplicateVerdict, FragmentOrigin,
    UnavailabilityPolicy, VerdictReason,
};
use dupgate_vector_store::{build_embedder, LocalVectorStore};
use std::fmt::Display;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Turns proposed writes into allow/warn/block decisions.
///
/// Each event is split into function-level fragments which are checked
/// concurrently; the whole evaluation runs under the latency budget.
pub struct GuardAdapter {
    config: GuardConfig,
    chunker: Chunker,
    detector: Arc<DuplicateDetector>,
}

impl GuardAdapter {
    pub fn new(
        config: GuardConfig,
        chunker: Chunker,
        detector: Arc<DuplicateDetector>,
    ) -> Result<Self> {
        config.validate().map_err(GuardError::InvalidConfig)?;
        Ok(Self {
            config,
            chunker,
            detector,
        })
    }

    /// Open the configured store and embedder and bind a detector to them.
    /// The store is returned so the caller can shut it down.
    pub async fn open(config: &GateConfig) -> Result<(LocalVectorStore, Self)> {
        let store = LocalVectorStore::from_config(&config.store)?;
        let embedder = build_embedder(&config.embedding)?;
        let detector = DuplicateDetector::connect(config.detector.clone(), embedder, &store).await?;
        let chunker = Chunker::new(config.chunker.clone())?;
        let adapter = Self::new(config.guard.clone(), chunker, Arc::new(detector))?;
        Ok((store, adapter))
    }

    #[must_use]
    pub fn detector(&self) -> &DuplicateDetector {
        &self.detector
    }

    pub async fn evaluate(&self, event: &HookEvent) -> GuardResponse {
        if !self.config.is_write_tool(&event.tool_name) {
            log::debug!("{} is not a write tool, allowing", event.tool_name);
            return GuardResponse::allow(format!("{} does not write code", event.tool_name));
        }

        let language = event_language(event);
        let (fragments, unchecked) =
            match self.extract(&event.file_path, &event.proposed_content, language) {
                Ok((fragments, _)) if fragments.is_empty() => {
                    return GuardResponse::allow("no fragments to check");
                }
                Ok(extracted) => extracted,
                Err(GuardError::Chunker(ChunkerError::EmptyContent)) => {
                    return GuardResponse::allow("no code to check");
                }
                Err(err) => {
                    return self.unavailable(format!("could not extract fragments: {err}"));
                }
            };

        let budget = self.config.latency_budget();
        log::debug!(
            "Checking {} fragment(s) from {} within {} ms",
            fragments.len(),
            event.file_path,
            budget.as_millis()
        );
        let response = match tokio::time::timeout(budget, self.check_all(fragments)).await {
            Ok(findings) => decide(&self.config, self.policy(), findings),
            Err(_) => self.unavailable(format!(
                "duplicate check exceeded the {} ms latency budget",
                budget.as_millis()
            )),
        };
        response.with_unchecked(unchecked)
    }

    /// Split `content` into fragments ready for checking or indexing, plus
    /// the number of fragments dropped by `max_chunks`.
    pub fn extract(
        &self,
        file_path: &str,
        content: &str,
        language: Language,
    ) -> Result<(Vec<CodeFragment>, usize)> {
        let batch = self
            .chunker
            .chunk_with_language(content, file_path, language)?;
        let fragments = batch
            .chunks
            .into_iter()
            .map(|chunk| {
                let origin = FragmentOrigin::from_chunk(&chunk);
                self.detector.fragment(chunk.content, language, origin)
            })
            .collect();
        Ok((fragments, batch.skipped))
    }

    /// Index every fragment of a file without checking it; returns how many
    /// were written.
    pub async fn index_content(&self, file_path: &str, content: &str) -> Result<usize> {
        let language = Language::from_path(file_path);
        let (fragments, _) = match self.extract(file_path, content, language) {
            Ok(extracted) => extracted,
            Err(GuardError::Chunker(ChunkerError::EmptyContent)) => return Ok(0),
            Err(err) => return Err(err),
        };

        let mut written = 0;
        for fragment in &fragments {
            if self.detector.index(fragment).await? {
                written += 1;
            }
        }
        log::info!("Indexed {written}/{} fragments from {file_path}", fragments.len());
        Ok(written)
    }

    /// Dropping the `JoinSet` (budget expiry) aborts unfinished checks.
    async fn check_all(&self, fragments: Vec<CodeFragment>) -> Vec<Finding> {
        let mut set = JoinSet::new();
        for (slot, fragment) in fragments.into_iter().enumerate() {
            let detector = Arc::clone(&self.detector);
            set.spawn(async move {
                let outcome = detector.check(&fragment).await;
                (slot, finding(&fragment, outcome))
            });
        }

        let mut findings = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(found) => findings.push(found),
                Err(err) => {
                    log::error!("Duplicate check task failed: {err}");
                    findings.push((
                        usize::MAX,
                        Finding {
                            origin: "<unknown>".to_string(),
                            reason: VerdictReason::StoreUnavailable,
                            score: 0.0,
                            matched_origin: None,
                            detail: Some(format!("check task failed: {err}")),
                        },
                    ));
                }
            }
        }
        findings.sort_by_key(|(slot, _)| *slot);
        findings.into_iter().map(|(_, found)| found).collect()
    }

    fn policy(&self) -> UnavailabilityPolicy {
        self.detector.config().unavailability_policy
    }

    fn unavailable(&self, detail: String) -> GuardResponse {
        let policy = self.policy();
        log::warn!("{detail} ({policy})");
        GuardResponse::unavailable(policy, detail)
    }
}

/// Answer for an event when the gate itself could not be opened (store or
/// model outage at startup). Non-write tools are still allowed.
pub fn degraded_response(
    config: &GateConfig,
    event: &HookEvent,
    detail: impl Display,
) -> GuardResponse {
    if !config.guard.is_write_tool(&event.tool_name) {
        return GuardResponse::allow(format!("{} does not write code", event.tool_name));
    }
    let policy = config.detector.unavailability_policy;
    log::warn!("Duplicate index could not be opened ({policy}): {detail}");
    GuardResponse::unavailable(policy, detail)
}

fn event_language(event: &HookEvent) -> Language {
    event
        .language
        .as_deref()
        .map_or_else(|| Language::from_path(&event.file_path), Language::from_tag)
}

fn finding(
    fragment: &CodeFragment,
    outcome: std::result::Result<DuplicateVerdict, DetectorError>,
) -> Finding {
    let origin = fragment.origin().to_string();
    match outcome {
        Ok(verdict) => Finding {
            origin,
            reason: verdict.reason,
            score: verdict.score,
            matched_origin: verdict.best_match.map(|best| best.metadata.origin),
            detail: verdict.detail,
        },
        Err(err) => {
            log::error!("{origin}: duplicate check failed: {err}");
            Finding {
                origin,
                reason: VerdictReason::StoreUnavailable,
                score: 0.0,
                matched_origin: None,
                detail: Some(err.to_string()),
            }
        }
    }
}

/// Duplicates outrank failed checks, which outrank near misses.
fn decide(
    config: &GuardConfig,
    policy: UnavailabilityPolicy,
    findings: Vec<Finding>,
) -> GuardResponse {
    let mut duplicates = Vec::new();
    let mut failures = Vec::new();
    let mut near_misses = Vec::new();

    for found in &findings {
        let matched = found.matched_origin.as_deref().unwrap_or("indexed code");
        match found.reason {
            VerdictReason::AboveThreshold => duplicates.push(format!(
                "{} duplicates {matched} (score {:.3})",
                found.origin, found.score
            )),
            VerdictReason::StoreUnavailable => failures.push(format!(
                "{}: {}",
                found.origin,
                found.detail.as_deref().unwrap_or("check could not run")
            )),
            VerdictReason::BelowThreshold
                if found.matched_origin.is_some()
                    && config.warn_threshold.is_some_and(|warn| found.score >= warn) =>
            {
                near_misses.push(format!(
                    "{} resembles {matched} (score {:.3})",
                    found.origin, found.score
                ));
            }
            _ => {}
        }
    }

    let (decision, rationale) = if !duplicates.is_empty() {
        (
            config.on_duplicate,
            format!("Duplicate code: {}", duplicates.join("; ")),
        )
    } else if !failures.is_empty() {
        (
            Decision::when_unavailable(policy),
            format!("Duplicate check unavailable ({policy}): {}", failures.join("; ")),
        )
    } else if !near_misses.is_empty() {
        (
            Decision::Warn,
            format!("Similar code exists: {}", near_misses.join("; ")),
        )
    } else {
        (
            Decision::Allow,
            format!("No duplicates among {} fragment(s)", findings.len()),
        )
    };

    if decision != Decision::Allow {
        log::info!("{decision}: {rationale}");
    }
    GuardResponse {
        decision,
        rationale,
        findings,
        unchecked: 0,
    }
}
