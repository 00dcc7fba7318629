//! # dupgate vector store
//!
//! Embedding generation and vector storage for duplicate detection.
//!
//! ## Architecture
//!
//! ```text
//! normalized fragment + language
//!     │
//!     ├──> Embedder (lexical feature hashing | ONNX model)
//!     │      └─> Vector[D], L2-normalized
//!     │
//!     └──> VectorStore::ensure_collection(name, D)
//!            └─> VectorCollection
//!                  ├─> upsert / delete / delete_matching
//!                  └─> query_nearest (exact cosine, ties by id)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use dupgate_vector_store::{
//!     Embedder, LexicalEmbedder, LocalVectorStore, RecordMetadata, VectorStore,
//! };
//! use dupgate_code_chunker::Language;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let embedder = LexicalEmbedder::new(384);
//!     let store = LocalVectorStore::open(".dupgate/store")?;
//!     let collection = store.ensure_collection("code", embedder.dimension()).await?;
//!
//!     let vector = embedder.embed("fn add(a: i32, b: i32) -> i32 { a + b }", Language::Rust).await?;
//!     collection.upsert("sha256:…", vector.clone(), RecordMetadata::default()).await?;
//!
//!     for hit in collection.query_nearest(&vector, 5, None).await? {
//!         println!("{}: {:.3}", hit.metadata.origin, hit.score);
//!     }
//!
//!     store.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod collection_lock;
mod config;
mod embeddings;
mod error;
mod flat_index;
mod store;
mod types;

pub use config::{EmbeddingConfig, StoreConfig};
pub use embeddings::{
    build_embedder, cosine_similarity, Embedder, EmbeddingAlgorithm, LexicalEmbedder,
    OnnxEmbedder,
};
pub use error::{Result, VectorStoreError};
pub use store::{LocalVectorStore, VectorCollection, VectorStore};
pub use types::{RecordFilter, RecordMetadata, SimilarityMatch, StoredRecord};
