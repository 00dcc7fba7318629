use crate::collection_lock::acquire_collection_write_lock;
use crate::config::StoreConfig;
use crate::error::{Result, VectorStoreError};
use crate::flat_index::FlatIndex;
use crate::types::{RecordFilter, RecordMetadata, SimilarityMatch};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

/// Client owning the lifecycle of named collections.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent. Fails with `DimensionalityConflict` when `name` exists with
    /// a different dimensionality.
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<Arc<dyn VectorCollection>>;

    /// Flush and close; later operations fail with `StoreUnavailable`.
    async fn shutdown(&self) -> Result<()>;
}

/// Operations scoped to one collection of fixed dimensionality.
#[async_trait]
pub trait VectorCollection: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: RecordMetadata) -> Result<()>;

    /// At most `k` matches, best first.
    async fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<SimilarityMatch>>;

    /// No-op when `id` is absent.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn delete_matching(&self, filter: &RecordFilter) -> Result<usize>;

    async fn list(&self) -> Result<Vec<(String, RecordMetadata)>>;

    async fn len(&self) -> Result<usize>;
}

/// Embedded store: in memory, or one JSON file per collection on disk.
pub struct LocalVectorStore {
    dir: Option<PathBuf>,
    lock_timeout: Duration,
    collections: Mutex<HashMap<String, Arc<LocalCollection>>>,
    closed: Arc<AtomicBool>,
}

impl LocalVectorStore {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            lock_timeout: StoreConfig::default().lock_timeout(),
            collections: Mutex::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Persist collections under `dir` (created when missing).
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|err| {
            VectorStoreError::store_io(format!("create store dir {}", dir.display()), err)
        })?;
        log::debug!("Opened local vector store at {}", dir.display());
        Ok(Self {
            dir: Some(dir),
            lock_timeout: StoreConfig::default().lock_timeout(),
            collections: Mutex::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate().map_err(VectorStoreError::InvalidConfig)?;
        let store = if config.in_memory {
            Self::in_memory()
        } else {
            Self::open(&config.dir)?
        };
        Ok(store.with_lock_timeout(config.lock_timeout()))
    }

    /// Longest wait for a collection lock held by another writer.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    fn ensure_open(&self) -> Result<()> {
        ensure_open(&self.closed)
    }

    fn cached(&self, name: &str) -> Option<Arc<LocalCollection>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
    ) -> Result<Arc<dyn VectorCollection>> {
        self.ensure_open()?;
        validate_collection_name(name)?;
        if dimension == 0 {
            return Err(VectorStoreError::InvalidConfig(
                "collection dimensionality must be > 0".to_string(),
            ));
        }

        let collection = match self.cached(name) {
            Some(existing) => existing,
            None => {
                let backing = match &self.dir {
                    None => Backing::Memory(Mutex::new(FlatIndex::new(dimension))),
                    Some(dir) => {
                        let path = dir.join(format!("{name}.json"));
                        let lock_path = dir.join(format!("{name}.lock"));
                        create_collection_file(
                            path.clone(),
                            lock_path.clone(),
                            self.lock_timeout,
                            name,
                            dimension,
                        )
                        .await?;
                        Backing::File {
                            path,
                            lock_path,
                            lock_timeout: self.lock_timeout,
                            cache: Arc::new(Mutex::new(None)),
                        }
                    }
                };
                let created = Arc::new(LocalCollection {
                    name: name.to_string(),
                    dimension,
                    backing,
                    closed: Arc::clone(&self.closed),
                });
                self.collections
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(name.to_string())
                    .or_insert(created)
                    .clone()
            }
        };

        if collection.dimension != dimension {
            return Err(VectorStoreError::DimensionalityConflict {
                collection: name.to_string(),
                existing: collection.dimension,
                requested: dimension,
            });
        }
        Ok(collection)
    }

    async fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let count = {
            let mut collections = self
                .collections
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let count = collections.len();
            collections.clear();
            count
        };
        log::info!("Local vector store shut down ({count} collections)");
        Ok(())
    }
}

enum Backing {
    Memory(Mutex<FlatIndex>),
    File {
        path: PathBuf,
        lock_path: PathBuf,
        lock_timeout: Duration,
        cache: Arc<Mutex<Option<CachedIndex>>>,
    },
}

/// Last parsed collection file, keyed by its modification time and length.
struct CachedIndex {
    modified: SystemTime,
    len: u64,
    index: Arc<FlatIndex>,
}

struct LocalCollection {
    name: String,
    dimension: usize,
    backing: Backing,
    closed: Arc<AtomicBool>,
}

impl LocalCollection {
    /// Apply `change` atomically. On disk: lock, reload, apply, write.
    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FlatIndex) -> Result<T> + Send + 'static,
    {
        ensure_open(&self.closed)?;
        match &self.backing {
            Backing::Memory(index) => {
                let mut index = index.lock().unwrap_or_else(PoisonError::into_inner);
                change(&mut index)
            }
            Backing::File {
                path,
                lock_path,
                lock_timeout,
                cache,
            } => {
                let path = path.clone();
                let lock_path = lock_path.clone();
                let lock_timeout = *lock_timeout;
                let cache = Arc::clone(cache);
                let name = self.name.clone();
                let dimension = self.dimension;
                tokio::task::spawn_blocking(move || {
                    let _lock = acquire_collection_write_lock(&lock_path, lock_timeout)?;
                    let mut index = read_index(&path, &name, dimension)?;
                    let out = change(&mut index)?;
                    write_index(&path, &index)?;
                    remember_index(&path, &cache, index);
                    Ok(out)
                })
                .await
                .map_err(|err| VectorStoreError::store_io("join collection write task", err))?
            }
        }
    }

    async fn read<T, F>(&self, inspect: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&FlatIndex) -> Result<T> + Send + 'static,
    {
        ensure_open(&self.closed)?;
        match &self.backing {
            Backing::Memory(index) => {
                let index = index.lock().unwrap_or_else(PoisonError::into_inner);
                inspect(&index)
            }
            Backing::File { path, cache, .. } => {
                let path = path.clone();
                let cache = Arc::clone(cache);
                let name = self.name.clone();
                let dimension = self.dimension;
                tokio::task::spawn_blocking(move || {
                    let index = load_cached(&path, &name, dimension, &cache)?;
                    inspect(index.as_ref())
                })
                .await
                .map_err(|err| VectorStoreError::store_io("join collection read task", err))?
            }
        }
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
}

#[async_trait]
impl VectorCollection for LocalCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: RecordMetadata) -> Result<()> {
        self.check_dimension(&vector)?;
        let id = id.to_string();
        self.mutate(move |index| index.upsert(&id, vector, metadata))
            .await
    }

    async fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<SimilarityMatch>> {
        self.check_dimension(vector)?;
        let query = vector.to_vec();
        let filter = filter.cloned();
        self.read(move |index| index.search(&query, k, filter.as_ref()))
            .await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let removed = self.mutate(move |index| Ok(index.remove(&id))).await?;
        if !removed {
            log::debug!("Delete of absent record in '{}' ignored", self.name);
        }
        Ok(())
    }

    async fn delete_matching(&self, filter: &RecordFilter) -> Result<usize> {
        let filter = filter.clone();
        self.mutate(move |index| Ok(index.remove_matching(&filter)))
            .await
    }

    async fn list(&self) -> Result<Vec<(String, RecordMetadata)>> {
        self.read(|index| Ok(index.entries())).await
    }

    async fn len(&self) -> Result<usize> {
        self.read(|index| Ok(index.len())).await
    }
}

fn ensure_open(closed: &AtomicBool) -> Result<()> {
    if closed.load(Ordering::SeqCst) {
        return Err(VectorStoreError::StoreUnavailable(
            "vector store has been shut down".to_string(),
        ));
    }
    Ok(())
}

fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(VectorStoreError::InvalidConfig(format!(
            "invalid collection name '{name}' (use ASCII letters, digits, '-', '_', '.')"
        )))
    }
}

async fn create_collection_file(
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    name: &str,
    dimension: usize,
) -> Result<()> {
    let name = name.to_string();
    tokio::task::spawn_blocking(move || {
        let _lock = acquire_collection_write_lock(&lock_path, lock_timeout)?;
        if path.exists() {
            // Validates the stored dimensionality.
            read_index(&path, &name, dimension)?;
            return Ok(());
        }
        log::info!("Creating collection '{name}' (dim {dimension}) at {}", path.display());
        write_index(&path, &FlatIndex::new(dimension))
    })
    .await
    .map_err(|err| VectorStoreError::store_io("join collection create task", err))?
}

fn read_index(path: &Path, name: &str, dimension: usize) -> Result<FlatIndex> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(FlatIndex::new(dimension));
        }
        Err(err) => {
            return Err(VectorStoreError::store_io(
                format!("read collection {}", path.display()),
                err,
            ));
        }
    };
    let index: FlatIndex = serde_json::from_slice(&bytes).map_err(|err| {
        VectorStoreError::store_io(format!("corrupt collection file {}", path.display()), err)
    })?;
    if index.dimension() != dimension {
        return Err(VectorStoreError::DimensionalityConflict {
            collection: name.to_string(),
            existing: index.dimension(),
            requested: dimension,
        });
    }
    Ok(index)
}

fn file_stamp(path: &Path) -> std::io::Result<(SystemTime, u64)> {
    let metadata = std::fs::metadata(path)?;
    Ok((metadata.modified()?, metadata.len()))
}

/// Parse the collection file only when its modification time or length
/// changed since the last load.
fn load_cached(
    path: &Path,
    name: &str,
    dimension: usize,
    cache: &Mutex<Option<CachedIndex>>,
) -> Result<Arc<FlatIndex>> {
    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
    let (modified, len) = match file_stamp(path) {
        Ok(stamp) => stamp,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            *cache = None;
            return Ok(Arc::new(FlatIndex::new(dimension)));
        }
        Err(err) => {
            return Err(VectorStoreError::store_io(
                format!("stat collection {}", path.display()),
                err,
            ));
        }
    };
    if let Some(cached) = cache.as_ref() {
        if cached.modified == modified && cached.len == len {
            return Ok(Arc::clone(&cached.index));
        }
    }

    let index = Arc::new(read_index(path, name, dimension)?);
    *cache = Some(CachedIndex {
        modified,
        len,
        index: Arc::clone(&index),
    });
    Ok(index)
}

fn remember_index(path: &Path, cache: &Mutex<Option<CachedIndex>>, index: FlatIndex) {
    let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
    *cache = file_stamp(path).ok().map(|(modified, len)| CachedIndex {
        modified,
        len,
        index: Arc::new(index),
    });
}

fn write_index(path: &Path, index: &FlatIndex) -> Result<()> {
    let bytes = serde_json::to_vec(index)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &bytes).map_err(|err| {
        VectorStoreError::store_io(format!("write collection {}", tmp.display()), err)
    })?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(VectorStoreError::store_io(
            format!("replace collection {}", path.display()),
            err,
        ));
    }
    Ok(())
}
