#![allow(dead_code)]

use async_trait::async_trait;
use dupgate_code_chunker::Language;
use dupgate_detector::{CodeFragment, DuplicateDetector, FragmentOrigin};
use dupgate_vector_store::{
    Embedder, LexicalEmbedder, LocalVectorStore, RecordFilter, RecordMetadata, Result,
    SimilarityMatch, VectorCollection, VectorStore, VectorStoreError,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SUM_TOTAL: &str = "def sum_total(items):\n    total = 0\n    for item in items:\n        total += item\n    return total\n";

pub const RENAMED_TOTAL: &str = "def total(values):\n    # accumulate\n    acc = 0\n    for v in values:\n        acc += v\n    return acc\n";

pub const FIND_MAX: &str = "def find_max(values):\n    best = values[0]\n    for v in values:\n        if v > best:\n            best = v\n    return best\n";

pub const FIND_MAXIMUM: &str = "def find_maximum(numbers):\n    largest = numbers[0]\n    for n in numbers:\n        if n > largest:\n            largest = n\n    return largest\n";

pub fn python(detector: &DuplicateDetector, raw: &str, path: &str, symbol: &str) -> CodeFragment {
    detector.fragment(raw, Language::Python, FragmentOrigin::symbol(path, symbol))
}

/// Lexical embedder that counts calls and can be slowed down.
pub struct CountingEmbedder {
    inner: LexicalEmbedder,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: LexicalEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
            delay: None,
        })
    }

    pub fn slow(dimension: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: LexicalEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn embed(&self, text: &str, language: Language) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.embed(text, language).await
    }
}

/// Returns fixed vectors for known texts and `ModelUnavailable` otherwise.
pub struct ScriptedEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl ScriptedEmbedder {
    pub fn new(dimension: usize, vectors: &[(&str, Vec<f32>)]) -> Arc<Self> {
        Arc::new(Self {
            dimension,
            vectors: vectors
                .iter()
                .map(|(text, vector)| ((*text).to_string(), vector.clone()))
                .collect(),
        })
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn embed(&self, text: &str, _language: Language) -> Result<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| VectorStoreError::ModelUnavailable(format!("no vector for {text:?}")))
    }
}

/// Switches and counters shared with a [`InstrumentedStore`].
#[derive(Default)]
pub struct StoreSwitches {
    calls: AtomicUsize,
    offline: AtomicBool,
    fail_writes: AtomicBool,
}

impl StoreSwitches {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn enter(&self, write: bool) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst)
            || (write && self.fail_writes.load(Ordering::SeqCst))
        {
            return Err(VectorStoreError::StoreUnavailable(
                "injected outage".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory store whose collections report every call to a [`StoreSwitches`].
pub struct InstrumentedStore {
    inner: LocalVectorStore,
    switches: Arc<StoreSwitches>,
}

impl InstrumentedStore {
    pub fn new() -> (Self, Arc<StoreSwitches>) {
        let switches = Arc::new(StoreSwitches::default());
        (
            Self {
                inner: LocalVectorStore::in_memory(),
                switches: Arc::clone(&switches),
            },
            switches,
        )
    }
}

#[async_trait]
impl VectorStore for InstrumentedStore {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<Arc<dyn VectorCollection>> {
        let inner = self.inner.ensure_collection(name, dimension).await?;
        Ok(Arc::new(InstrumentedCollection {
            inner,
            switches: Arc::clone(&self.switches),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }
}

struct InstrumentedCollection {
    inner: Arc<dyn VectorCollection>,
    switches: Arc<StoreSwitches>,
}

#[async_trait]
impl VectorCollection for InstrumentedCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: RecordMetadata) -> Result<()> {
        self.switches.enter(true)?;
        self.inner.upsert(id, vector, metadata).await
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<SimilarityMatch>> {
        self.switches.enter(false)?;
        self.inner.query_nearest(vector, k, filter).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.switches.enter(true)?;
        self.inner.delete(id).await
    }

    async fn delete_matching(&self, filter: &RecordFilter) -> Result<usize> {
        self.switches.enter(true)?;
        self.inner.delete_matching(filter).await
    }

    async fn list(&self) -> Result<Vec<(String, RecordMetadata)>> {
        self.switches.enter(false)?;
        self.inner.list().await
    }

    async fn len(&self) -> Result<usize> {
        self.switches.enter(false)?;
        self.inner.len().await
    }
}
