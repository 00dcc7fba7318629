use crate::config::{DetectorConfig, UnavailabilityPolicy};
use crate::error::{DetectorError, Result};
use crate::fragment::{CodeFragment, FragmentOrigin};
use crate::verdict::{DuplicateVerdict, VerdictReason};
use dupgate_code_chunker::Language;
use dupgate_vector_store::{
    Embedder, RecordFilter, RecordMetadata, VectorCollection, VectorStore, VectorStoreError,
};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Orchestrates normalization, embedding and nearest-neighbor lookup, and
/// applies the duplicate decision policy.
///
/// Stateless between calls; share it behind an `Arc`.
pub struct DuplicateDetector {
    config: DetectorConfig,
    embedder: Arc<dyn Embedder>,
    collection: Arc<dyn VectorCollection>,
}

impl DuplicateDetector {
    /// Validate `config`, check that the embedder and the collection agree on
    /// dimensionality, and bind the collection.
    pub async fn connect(
        config: DetectorConfig,
        embedder: Arc<dyn Embedder>,
        store: &dyn VectorStore,
    ) -> Result<Self> {
        config.validate().map_err(DetectorError::InvalidConfig)?;
        if embedder.dimension() != config.dimensionality {
            return Err(VectorStoreError::DimensionMismatch {
                expected: config.dimensionality,
                actual: embedder.dimension(),
            }
            .into());
        }

        let collection = within(
            config.store_timeout(),
            "ensure collection",
            VectorStoreError::StoreUnavailable,
            store.ensure_collection(&config.collection_name, config.dimensionality),
        )
        .await?;

        log::debug!(
            "Duplicate detector bound to '{}' (dim {}, model {}, threshold {})",
            collection.name(),
            collection.dimension(),
            embedder.model_id(),
            config.similarity_threshold
        );

        Ok(Self {
            config,
            embedder,
            collection,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Build a fragment hashed with the configured algorithm.
    pub fn fragment(
        &self,
        raw: impl Into<String>,
        language: Language,
        origin: FragmentOrigin,
    ) -> CodeFragment {
        CodeFragment::new(raw, language, origin, self.config.hash_algorithm)
    }

    /// Decide whether `fragment` duplicates indexed code. Non-duplicates that
    /// pass the size filter are indexed before returning.
    ///
    /// Model and store outages become a `store_unavailable` verdict shaped by
    /// the unavailability policy; other failures (dimension mismatch) are
    /// returned as errors.
    pub async fn check(&self, fragment: &CodeFragment) -> Result<DuplicateVerdict> {
        let origin = fragment.origin().to_string();
        let tokens = fragment.token_count();
        if tokens < self.config.minimum_fragment_size {
            log::debug!(
                "{origin}: {tokens} tokens < {}, skipped",
                self.config.minimum_fragment_size
            );
            return Ok(DuplicateVerdict::skipped(VerdictReason::BelowMinSize));
        }

        let vector = match self.embed(fragment).await {
            Ok(vector) => vector,
            Err(VectorStoreError::EmptyInput) => {
                return Ok(DuplicateVerdict::skipped(VerdictReason::EmptyInput));
            }
            Err(err) if err.is_unavailable() => return Ok(self.unavailable(&origin, &err)),
            Err(err) => return Err(err.into()),
        };

        // One extra neighbor so an excluded self-match does not shrink the candidate set.
        let filter = self
            .config
            .same_language_only
            .then(|| RecordFilter::default().language(fragment.language().as_str()));
        let neighbors = match self
            .store_call(
                "query",
                self.collection
                    .query_nearest(&vector, self.config.top_k + 1, filter.as_ref()),
            )
            .await
        {
            Ok(neighbors) => neighbors,
            Err(err) if err.is_unavailable() => return Ok(self.unavailable(&origin, &err)),
            Err(err) => return Err(err.into()),
        };

        let found = neighbors.len();
        let best = neighbors
            .into_iter()
            .find(|candidate| candidate.metadata.origin != origin);

        let mut verdict = match best {
            Some(best) if best.score >= self.config.similarity_threshold => {
                log::info!(
                    "{origin} duplicates {} (score {:.3})",
                    best.metadata.origin,
                    best.score
                );
                return Ok(DuplicateVerdict::matched(best));
            }
            Some(best) => {
                DuplicateVerdict::not_duplicate(VerdictReason::BelowThreshold, Some(best))
            }
            None if found > 0 => {
                DuplicateVerdict::not_duplicate(VerdictReason::SelfMatchExcluded, None)
            }
            None => DuplicateVerdict::not_duplicate(VerdictReason::BelowThreshold, None),
        };

        log::debug!(
            "{origin}: not a duplicate ({}, score {:.3})",
            verdict.reason,
            verdict.score
        );
        verdict.indexed = self.index_vector(fragment, vector).await;
        Ok(verdict)
    }

    /// Upsert `fragment` without checking it. Returns `false` when the
    /// fragment is below the minimum size and was skipped.
    pub async fn index(&self, fragment: &CodeFragment) -> Result<bool> {
        if fragment.token_count() < self.config.minimum_fragment_size {
            return Ok(false);
        }
        let vector = self.embed(fragment).await?;
        let collection = Arc::clone(&self.collection);
        replace_origin_record(
            collection,
            self.config.store_timeout(),
            fragment.record_id(),
            vector,
            self.metadata_for(fragment),
        )
        .await?;
        Ok(true)
    }

    /// Delete every record that came from `file_path`.
    pub async fn forget_file(&self, file_path: &str) -> Result<usize> {
        let filter = RecordFilter::default().file_path(file_path);
        let removed = self
            .store_call("delete", self.collection.delete_matching(&filter))
            .await?;
        log::info!("Forgot {removed} records from {file_path}");
        Ok(removed)
    }

    /// Delete records whose source file `is_live` reports as gone.
    pub async fn reconcile<F>(&self, is_live: F) -> Result<usize>
    where
        F: Fn(&str) -> bool + Send + Sync,
    {
        let records = self.store_call("list", self.collection.list()).await?;
        let dead: BTreeSet<String> = records
            .into_iter()
            .map(|(_, metadata)| metadata.file_path)
            .filter(|path| !is_live(path))
            .collect();

        let mut removed = 0;
        for path in dead {
            removed += self.forget_file(&path).await?;
        }
        Ok(removed)
    }

    async fn embed(
        &self,
        fragment: &CodeFragment,
    ) -> std::result::Result<Vec<f32>, VectorStoreError> {
        let vector = within(
            self.config.embed_timeout(),
            "embed",
            VectorStoreError::ModelUnavailable,
            self.embedder.embed(fragment.normalized(), fragment.language()),
        )
        .await?;
        if vector.len() != self.config.dimensionality {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.config.dimensionality,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    async fn store_call<T>(
        &self,
        what: &str,
        call: impl Future<Output = std::result::Result<T, VectorStoreError>>,
    ) -> std::result::Result<T, VectorStoreError> {
        within(
            self.config.store_timeout(),
            what,
            VectorStoreError::StoreUnavailable,
            call,
        )
        .await
    }

    /// Runs on a spawned task so a caller that stops waiting does not abort
    /// a half-finished write.
    async fn index_vector(&self, fragment: &CodeFragment, vector: Vec<f32>) -> bool {
        let origin = fragment.origin().to_string();
        let task = tokio::spawn(replace_origin_record(
            Arc::clone(&self.collection),
            self.config.store_timeout(),
            fragment.record_id(),
            vector,
            self.metadata_for(fragment),
        ));

        match task.await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                log::warn!("Failed to index {origin}: {err}");
                false
            }
            Err(err) => {
                log::warn!("Indexing task for {origin} failed: {err}");
                false
            }
        }
    }

    fn metadata_for(&self, fragment: &CodeFragment) -> RecordMetadata {
        RecordMetadata {
            language: fragment.language().as_str().to_string(),
            origin: fragment.origin().to_string(),
            file_path: fragment.origin().file_path.clone(),
            normalized_len: fragment.normalized().len(),
            inserted_at_ms: now_ms(),
            content_hash: fragment.content_hash().to_string(),
        }
    }

    fn unavailable(&self, origin: &str, err: &VectorStoreError) -> DuplicateVerdict {
        let policy = self.config.unavailability_policy;
        let is_duplicate = policy == UnavailabilityPolicy::FailClosed;
        log::warn!(
            "{origin}: duplicate check could not run ({err}); {policy} -> duplicate={is_duplicate}"
        );
        DuplicateVerdict::unavailable(is_duplicate, err.to_string())
    }
}

/// A changed fragment is a delete + insert: drop whatever the origin stored
/// before, then write the record under its new id.
async fn replace_origin_record(
    collection: Arc<dyn VectorCollection>,
    limit: Duration,
    id: String,
    vector: Vec<f32>,
    metadata: RecordMetadata,
) -> std::result::Result<(), VectorStoreError> {
    let filter = RecordFilter::default().origin(metadata.origin.clone());
    let removed = within(
        limit,
        "delete",
        VectorStoreError::StoreUnavailable,
        collection.delete_matching(&filter),
    )
    .await?;
    if removed > 0 {
        log::debug!("Replacing {removed} record(s) for {}", metadata.origin);
    }
    within(
        limit,
        "upsert",
        VectorStoreError::StoreUnavailable,
        collection.upsert(&id, vector, metadata),
    )
    .await
}

async fn within<T>(
    limit: Duration,
    what: &str,
    on_timeout: fn(String) -> VectorStoreError,
    call: impl Future<Output = std::result::Result<T, VectorStoreError>>,
) -> std::result::Result<T, VectorStoreError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(format!(
            "{what} timed out after {} ms",
            limit.as_millis()
        ))),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
