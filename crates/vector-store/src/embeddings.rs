use crate::config::EmbeddingConfig;
use crate::error::{Result, VectorStoreError};
use async_trait::async_trait;
use dupgate_code_chunker::lexer::{split_identifier, tokenize, TokenKind};
use dupgate_code_chunker::Language;
use ndarray::{Array, Axis, Ix2, Ix3};
use once_cell::sync::OnceCell;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputs};
use ort::value::{DynTensor, Tensor};
use ort::Error as OrtError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokenizers::{Tokenizer, TruncationParams};
use tokio::task::spawn_blocking;

/// Maps a normalized fragment to a fixed-width, L2-normalized vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// Stable identifier of the model producing the vectors
    fn model_id(&self) -> &str;

    /// Fails with `EmptyInput` on whitespace-only text and `ModelUnavailable`
    /// when the model cannot be loaded or run.
    async fn embed(&self, text: &str, language: Language) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingAlgorithm {
    /// Feature-hashed token n-grams; no model files required
    #[default]
    Lexical,
    /// Sentence-embedding model through ONNX Runtime
    Onnx,
}

impl EmbeddingAlgorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Onnx => "onnx",
        }
    }
}

impl Display for EmbeddingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmbeddingAlgorithm {
    type Err = VectorStoreError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "onnx" => Ok(Self::Onnx),
            other => Err(VectorStoreError::InvalidConfig(format!(
                "Unsupported embedding algorithm '{other}' (expected 'lexical' or 'onnx')"
            ))),
        }
    }
}

/// Construct the embedder selected by `config`. Model files are not touched
/// until the first `embed` call.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    config.validate().map_err(VectorStoreError::InvalidConfig)?;
    let embedder: Arc<dyn Embedder> = match config.algorithm {
        EmbeddingAlgorithm::Lexical => Arc::new(LexicalEmbedder::new(config.dimension)),
        EmbeddingAlgorithm::Onnx => Arc::new(OnnxEmbedder::new(config.clone())),
    };
    log::debug!(
        "Embedder '{}' ({}, dim {})",
        embedder.model_id(),
        config.algorithm,
        embedder.dimension()
    );
    Ok(embedder)
}

const NGRAM_WEIGHTS: [f32; 4] = [0.25, 1.0, 1.0, 1.0];
const SUBWORD_WEIGHT: f32 = 0.3;

/// Deterministic structural embedder.
///
/// Identifiers are abstracted to `ID` and literals to `STR`/`NUM`, so a renamed
/// copy of a function keeps its n-gram profile; identifier subwords add a
/// small naming signal on top. Features are hashed into signed buckets.
#[derive(Debug, Clone)]
pub struct LexicalEmbedder {
    dimension: usize,
    model_id: String,
}

impl LexicalEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_id: format!("lexical-v1-d{dimension}"),
        }
    }
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str, _language: Language) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(VectorStoreError::EmptyInput);
        }
        Ok(lexical_embed(text, self.dimension))
    }
}

fn lexical_embed(text: &str, dimension: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    let tokens = tokenize(text);
    let mut abstracted: Vec<&str> = Vec::with_capacity(tokens.len());

    for token in &tokens {
        match token.kind {
            TokenKind::Identifier => {
                abstracted.push("ID");
                for word in split_identifier(token.text) {
                    add_feature(&mut vec, &format!("i:{word}"), SUBWORD_WEIGHT);
                }
            }
            TokenKind::Number => abstracted.push("NUM"),
            TokenKind::Str => abstracted.push("STR"),
            TokenKind::Keyword | TokenKind::Punct => abstracted.push(token.text),
        }
    }

    for (n, weight) in (1..=NGRAM_WEIGHTS.len()).zip(NGRAM_WEIGHTS) {
        for window in abstracted.windows(n) {
            add_feature(&mut vec, &format!("{n}:{}", window.join(" ")), weight);
        }
    }

    normalize(&mut vec);
    vec
}

fn add_feature(vec: &mut [f32], feature: &str, weight: f32) {
    if vec.is_empty() {
        return;
    }
    let hash = fnv1a_64(feature.as_bytes());
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (hash % vec.len() as u64) as usize;
    let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
    vec[bucket] += sign * weight;
}

/// ONNX sentence-embedding model, loaded on first use.
pub struct OnnxEmbedder {
    config: Arc<EmbeddingConfig>,
    model_id: String,
    backend: Arc<OnceCell<Arc<OrtBackend>>>,
}

impl OnnxEmbedder {
    #[must_use]
    pub fn new(config: EmbeddingConfig) -> Self {
        let model_id = config.model_id.clone().unwrap_or_else(|| {
            config
                .model_dir
                .file_name()
                .map_or_else(|| "onnx".to_string(), |name| name.to_string_lossy().into_owned())
        });
        Self {
            config: Arc::new(config),
            model_id,
            backend: Arc::new(OnceCell::new()),
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.backend.get().is_some()
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str, _language: Language) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(VectorStoreError::EmptyInput);
        }

        let cell = Arc::clone(&self.backend);
        let config = Arc::clone(&self.config);
        let text = text.to_string();
        spawn_blocking(move || {
            let backend = load_once(&cell, || OrtBackend::new(&config))?;
            backend.embed_blocking(&text)
        })
        .await
        .map_err(|e| VectorStoreError::ModelUnavailable(format!("Embedding task failed: {e}")))?
    }
}

/// Single-flight initialization: concurrent first callers block on the same
/// load. A failed load is not cached, so a later call retries.
fn load_once<B>(cell: &OnceCell<Arc<B>>, load: impl FnOnce() -> Result<B>) -> Result<Arc<B>> {
    cell.get_or_try_init(|| load().map(Arc::new)).map(Arc::clone)
}

struct OrtBackend {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimension: usize,
}

impl OrtBackend {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        if !tokenizers::utils::parallelism::is_parallelism_configured() {
            tokenizers::utils::parallelism::set_parallelism(false);
        }

        let model_path = config.model_path();
        let tokenizer_path = config.tokenizer_path();
        if !model_path.exists() || !tokenizer_path.exists() {
            return Err(VectorStoreError::ModelUnavailable(format!(
                "Model files are missing. Expected ONNX at {} and tokenizer at {} (set DUPGATE_MODEL_DIR or embedding.model_dir).",
                model_path.display(),
                tokenizer_path.display(),
            )));
        }

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            VectorStoreError::ModelUnavailable(format!("Tokenizer load failed: {e}"))
        })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..TruncationParams::default()
            }))
            .map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("Tokenizer truncation failed: {e}"))
            })?;

        let session = Session::builder()
            .map_err(|e| to_unavailable(&e))?
            .with_intra_threads(default_intra_threads())
            .map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("Failed to set ORT intra threads: {e}"))
            })?
            .with_inter_threads(1)
            .map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("Failed to set ORT inter threads: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("Failed to set optimization level: {e}"))
            })?
            .commit_from_file(&model_path)
            .map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("Failed to load ONNX model: {e}"))
            })?;

        log::info!(
            "Loaded ONNX model from {} (dim {}, max_length {})",
            model_path.display(),
            config.dimension,
            config.max_length
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimension: config.dimension,
        })
    }

    fn embed_blocking(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| VectorStoreError::ModelUnavailable(format!("Tokenization failed: {e}")))?;

        let seq_len = encoding.len();
        if seq_len == 0 {
            return Err(VectorStoreError::EmptyInput);
        }
        let to_i64 = |values: &[u32]| values.iter().map(|v| i64::from(*v)).collect::<Vec<_>>();
        let mask = to_i64(encoding.get_attention_mask());

        let ids_array = Array::from_shape_vec((1, seq_len), to_i64(encoding.get_ids()))
            .map_err(|e| VectorStoreError::ModelUnavailable(format!("IDs shape error: {e}")))?;
        let mask_array = Array::from_shape_vec((1, seq_len), mask.clone())
            .map_err(|e| VectorStoreError::ModelUnavailable(format!("Mask shape error: {e}")))?;
        let type_array = Array::from_shape_vec((1, seq_len), to_i64(encoding.get_type_ids()))
            .map_err(|e| VectorStoreError::ModelUnavailable(format!("Types shape error: {e}")))?;

        let mut available: HashMap<String, DynTensor> = HashMap::new();
        available.insert(
            "input_ids".to_string(),
            Tensor::from_array(ids_array.into_dyn())
                .map_err(|e| to_unavailable(&e))?
                .upcast(),
        );
        available.insert(
            "attention_mask".to_string(),
            Tensor::from_array(mask_array.into_dyn())
                .map_err(|e| to_unavailable(&e))?
                .upcast(),
        );
        available.insert(
            "token_type_ids".to_string(),
            Tensor::from_array(type_array.into_dyn())
                .map_err(|e| to_unavailable(&e))?
                .upcast(),
        );

        let array = {
            let mut session = self.session.lock().map_err(|_| {
                VectorStoreError::ModelUnavailable("Failed to lock ONNX session".into())
            })?;

            let mut feed: HashMap<String, DynTensor> = HashMap::new();
            for input in &session.inputs {
                let key = input.name.clone();
                let value = available.remove(&key).ok_or_else(|| {
                    VectorStoreError::ModelUnavailable(format!("Unsupported ONNX input '{key}'"))
                })?;
                feed.insert(key, value);
            }

            let outputs = session.run(SessionInputs::from(feed)).map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("ONNX forward failed: {e}"))
            })?;
            if outputs.len() == 0 {
                return Err(VectorStoreError::ModelUnavailable(
                    "ONNX returned no outputs".to_string(),
                ));
            }

            let array = outputs[0]
                .try_extract_array::<f32>()
                .map_err(|e| {
                    VectorStoreError::ModelUnavailable(format!("Failed to decode ONNX output: {e}"))
                })?
                .to_owned();
            drop(outputs);
            array
        };

        embedding_from_output(array, &mask, self.dimension)
    }
}

fn default_intra_threads() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    // A hook check embeds a handful of fragments; keep inference polite.
    if cpus <= 4 {
        1
    } else {
        2
    }
}

const fn ensure_dimension(vec: &[f32], expected: usize) -> Result<()> {
    if vec.len() != expected {
        return Err(VectorStoreError::DimensionMismatch {
            expected,
            actual: vec.len(),
        });
    }
    Ok(())
}

fn embedding_from_output(
    array: ndarray::ArrayD<f32>,
    mask: &[i64],
    expected_dimension: usize,
) -> Result<Vec<f32>> {
    let mut emb = match array.ndim() {
        2 => {
            let pooled = array.into_dimensionality::<Ix2>().map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("Bad output shape: {e}"))
            })?;
            pooled
                .outer_iter()
                .next()
                .map(|row| row.to_vec())
                .unwrap_or_default()
        }
        3 => {
            let hidden = array.into_dimensionality::<Ix3>().map_err(|e| {
                VectorStoreError::ModelUnavailable(format!("Bad output shape: {e}"))
            })?;
            hidden
                .outer_iter()
                .next()
                .map(|sample| mean_pool(sample, mask))
                .unwrap_or_default()
        }
        _ => {
            return Err(VectorStoreError::ModelUnavailable(format!(
                "Unexpected ONNX output dims: {:?}",
                array.shape()
            )));
        }
    };
    ensure_dimension(&emb, expected_dimension)?;
    normalize(&mut emb);
    Ok(emb)
}

fn mean_pool(sample: ndarray::ArrayView2<'_, f32>, mask: &[i64]) -> Vec<f32> {
    if sample.is_empty() {
        return vec![];
    }

    let hidden = sample.len_of(Axis(1));
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (token_idx, token) in sample.outer_iter().enumerate() {
        if *mask.get(token_idx).unwrap_or(&0) == 0 {
            continue;
        }
        count += 1.0;
        for (dim, value) in token.iter().enumerate() {
            sum[dim] += value;
        }
    }

    if count == 0.0 {
        return sum;
    }

    for value in &mut sum {
        *value /= count;
    }

    sum
}

fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vec {
        *value /= norm;
    }
}

fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn to_unavailable(error: &OrtError) -> VectorStoreError {
    VectorStoreError::ModelUnavailable(format!("{error}"))
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    const SUM_TOTAL: &str = "def sum_total(items):\n    total = 0\n    for item in items:\n        total += item\n    return total";
    const RENAMED: &str = "def total(values):\n    acc = 0\n    for v in values:\n        acc += v\n    return acc";
    const FIND_MAX: &str = "def find_max(values):\n    best = values[0]\n    for v in values:\n        if v > best:\n            best = v\n    return best";

    async fn embed(text: &str) -> Vec<f32> {
        LexicalEmbedder::new(384)
            .embed(text, Language::Python)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn lexical_embedding_is_deterministic_and_normalized() {
        let a = embed(SUM_TOTAL).await;
        let b = embed(SUM_TOTAL).await;
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn renamed_copy_scores_high_and_different_logic_scores_low() {
        let original = embed(SUM_TOTAL).await;
        let renamed = embed(RENAMED).await;
        let other = embed(FIND_MAX).await;

        let same = cosine_similarity(&original, &renamed);
        let different = cosine_similarity(&original, &other);
        assert!(same > 0.9, "renamed copy scored {same}");
        assert!(different < 0.7, "unrelated function scored {different}");
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let embedder = LexicalEmbedder::new(16);
        let err = embedder.embed(" \n\t", Language::Rust).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::EmptyInput));
    }

    #[tokio::test]
    async fn missing_onnx_model_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = OnnxEmbedder::new(EmbeddingConfig {
            algorithm: EmbeddingAlgorithm::Onnx,
            model_dir: dir.path().join("absent"),
            ..EmbeddingConfig::default()
        });
        let err = embedder.embed("fn f() {}", Language::Rust).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::ModelUnavailable(_)), "{err}");
        assert!(!embedder.is_loaded());
        assert_eq!(embedder.model_id(), "absent");
    }

    #[test]
    fn algorithm_parses_case_insensitively() {
        assert_eq!("ONNX".parse::<EmbeddingAlgorithm>().unwrap(), EmbeddingAlgorithm::Onnx);
        assert_eq!(" lexical ".parse::<EmbeddingAlgorithm>().unwrap(), EmbeddingAlgorithm::Lexical);
        assert!("fast".parse::<EmbeddingAlgorithm>().is_err());
    }

    #[test]
    fn build_embedder_rejects_invalid_config() {
        let config = EmbeddingConfig {
            dimension: 0,
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            build_embedder(&config),
            Err(VectorStoreError::InvalidConfig(_))
        ));
        let embedder = build_embedder(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.model_id(), "lexical-v1-d384");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![1.0, 0.0];
        let d = vec![0.0, 1.0];
        assert!(cosine_similarity(&c, &d).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &c), 0.0);
    }

    #[test]
    fn mean_pool_ignores_masked_tokens() {
        let sample = ndarray::arr2(&[[1.0f32, 3.0], [3.0, 5.0], [100.0, 100.0]]);
        assert_eq!(mean_pool(sample.view(), &[1, 1, 0]), vec![2.0, 4.0]);
    }

    #[test]
    fn output_width_mismatch_is_reported() {
        let array = ndarray::arr2(&[[1.0f32, 0.0, 0.0]]).into_dyn();
        let err = embedding_from_output(array, &[1], 4).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn single_flight_loads_once() {
        let cell: Arc<OnceCell<Arc<usize>>> = Arc::new(OnceCell::new());
        let loads = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let loads = Arc::clone(&loads);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    load_once(&cell, || {
                        loads.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        Ok(7usize)
                    })
                    .map(|backend| *backend)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_retried() {
        let cell: OnceCell<Arc<usize>> = OnceCell::new();
        let first = load_once(&cell, || {
            Err(VectorStoreError::ModelUnavailable("boom".to_string()))
        });
        assert!(first.is_err());
        assert_eq!(*load_once(&cell, || Ok(3usize)).unwrap(), 3);
    }
}
