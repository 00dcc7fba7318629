use dupgate_code_chunker::{count_tokens, normalize, CodeChunk, Language};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Display;
use std::str::FromStr;

/// Algorithm used to derive content hashes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    /// `<algorithm>:<hex digest>`
    #[must_use]
    pub fn digest(self, bytes: &[u8]) -> String {
        let hex = match self {
            Self::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            Self::Blake3 => blake3::hash(bytes).to_hex().to_string(),
        };
        format!("{}:{hex}", self.as_str())
    }
}

impl Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "unsupported hash algorithm '{other}' (expected 'sha256' or 'blake3')"
            )),
        }
    }
}

/// Where a fragment lives: a file plus a symbol name or line range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentOrigin {
    pub file_path: String,
    /// Symbol name (`sum_total`, `Parser::parse`), `<file>` for whole-file
    /// fragments, or line range (`L3-9`)
    pub locator: String,
}

impl FragmentOrigin {
    pub fn symbol(file_path: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            locator: symbol.into(),
        }
    }

    #[must_use]
    pub fn from_chunk(chunk: &CodeChunk) -> Self {
        Self {
            file_path: chunk.file_path.clone(),
            locator: chunk.locator(),
        }
    }
}

impl Display for FragmentOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.file_path, self.locator)
    }
}

/// A unit of code submitted for duplicate checking. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    raw: String,
    normalized: String,
    language: Language,
    origin: FragmentOrigin,
    content_hash: String,
}

impl CodeFragment {
    pub fn new(
        raw: impl Into<String>,
        language: Language,
        origin: FragmentOrigin,
        hash_algorithm: HashAlgorithm,
    ) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw, language);
        let content_hash =
            hash_algorithm.digest(format!("{}\n{normalized}", language.as_str()).as_bytes());
        Self {
            raw,
            normalized,
            language,
            origin,
            content_hash,
        }
    }

    /// Fragment for a chunk; the language comes from the chunk metadata or
    /// the file extension.
    #[must_use]
    pub fn from_chunk(chunk: &CodeChunk, hash_algorithm: HashAlgorithm) -> Self {
        let language = chunk
            .metadata
            .language
            .as_deref()
            .map_or_else(|| Language::from_path(&chunk.file_path), Language::from_tag);
        Self::new(
            chunk.content.clone(),
            language,
            FragmentOrigin::from_chunk(chunk),
            hash_algorithm,
        )
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    #[must_use]
    pub const fn origin(&self) -> &FragmentOrigin {
        &self.origin
    }

    /// Stable external key shared by every copy of the same code.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Id of the stored record: one record per content hash and origin, so
    /// the same code indexed at two origins yields two records.
    #[must_use]
    pub fn record_id(&self) -> String {
        format!("{}@{}", self.content_hash, self.origin)
    }

    #[must_use]
    pub fn token_count(&self) -> usize {
        count_tokens(&self.normalized)
    }
}
