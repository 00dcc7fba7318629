use serde::{Deserialize, Serialize};

/// Source identity attached to every stored vector
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordMetadata {
    pub language: String,
    /// `path:symbol` or `path:Lstart-end`
    pub origin: String,
    pub file_path: String,
    pub normalized_len: usize,
    pub inserted_at_ms: u64,
    pub content_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// A nearest-neighbor hit. `score` is cosine similarity clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityMatch {
    pub id: String,
    pub metadata: RecordMetadata,
    pub score: f32,
}

/// Conjunctive metadata filter; unset fields match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordFilter {
    pub language: Option<String>,
    pub origin: Option<String>,
    pub file_path: Option<String>,
}

impl RecordFilter {
    #[must_use]
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    #[must_use]
    pub fn file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    #[must_use]
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        self.language
            .as_deref()
            .map_or(true, |language| language == metadata.language)
            && self
                .origin
                .as_deref()
                .map_or(true, |origin| origin == metadata.origin)
            && self
                .file_path
                .as_deref()
                .map_or(true, |path| path == metadata.file_path)
    }
}
