//! # dupgate detector
//!
//! Decides whether a code fragment duplicates code already indexed.
//!
//! ```text
//! CodeFragment (raw → normalized, origin, content hash)
//!     │
//!     ├──> size filter ─────────────> below_min_size
//!     ├──> Embedder::embed ─(outage)─> store_unavailable (policy)
//!     ├──> VectorCollection::query_nearest(k + 1, same language)
//!     ├──> drop self-matches (same origin)
//!     └──> best >= threshold ? above_threshold
//!                            : below_threshold + upsert
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use dupgate_code_chunker::Language;
//! use dupgate_detector::{DetectorConfig, DuplicateDetector, FragmentOrigin};
//! use dupgate_vector_store::{LexicalEmbedder, LocalVectorStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = LocalVectorStore::open(".dupgate/store")?;
//!     let detector = DuplicateDetector::connect(
//!         DetectorConfig::default(),
//!         Arc::new(LexicalEmbedder::new(384)),
//!         &store,
//!     )
//!     .await?;
//!
//!     let fragment = detector.fragment(
//!         "def total(values):\n    acc = 0\n    for v in values:\n        acc += v\n    return acc",
//!         Language::Python,
//!         FragmentOrigin::symbol("b.py", "total"),
//!     );
//!     let verdict = detector.check(&fragment).await?;
//!     println!("{} ({:.3})", verdict.reason, verdict.score);
//!     Ok(())
//! }
//! ```

mod config;
mod detector;
mod error;
mod fragment;
mod verdict;

pub use config::{DetectorConfig, UnavailabilityPolicy};
pub use detector::DuplicateDetector;
pub use error::{DetectorError, Result};
pub use fragment::{CodeFragment, FragmentOrigin, HashAlgorithm};
pub use verdict::{DuplicateVerdict, VerdictReason};
