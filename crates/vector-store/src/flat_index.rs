use crate::embeddings::cosine_similarity;
use crate::error::{Result, VectorStoreError};
use crate::types::{RecordFilter, RecordMetadata, SimilarityMatch, StoredRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Exact nearest-neighbor index over one collection (brute-force cosine scan).
///
/// This is also the on-disk shape of a persisted collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    records: BTreeMap<String, StoredRecord>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: BTreeMap::new(),
        }
    }

    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    const fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace
    pub fn upsert(&mut self, id: &str, vector: Vec<f32>, metadata: RecordMetadata) -> Result<()> {
        self.check_dimension(&vector)?;
        self.records.insert(
            id.to_string(),
            StoredRecord {
                id: id.to_string(),
                vector,
                metadata,
            },
        );
        Ok(())
    }

    /// Top `k` by score descending, ties broken by id
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<SimilarityMatch>> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scores: Vec<(&StoredRecord, f32)> = self
            .records
            .values()
            .filter(|record| filter.map_or(true, |f| f.matches(&record.metadata)))
            .map(|record| {
                let similarity = cosine_similarity(query, &record.vector);
                (record, similarity.clamp(0.0, 1.0))
            })
            .collect();

        scores.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.id.cmp(&b.0.id))
        });
        scores.truncate(k);

        Ok(scores
            .into_iter()
            .map(|(record, score)| SimilarityMatch {
                id: record.id.clone(),
                metadata: record.metadata.clone(),
                score,
            })
            .collect())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.records.remove(id).is_some()
    }

    pub fn remove_matching(&mut self, filter: &RecordFilter) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| !filter.matches(&record.metadata));
        before - self.records.len()
    }

    pub fn entries(&self) -> Vec<(String, RecordMetadata)> {
        self.records
            .values()
            .map(|record| (record.id.clone(), record.metadata.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}
