//! # dupgate code chunker
//!
//! Source-level preprocessing for duplicate detection.
//!
//! ## Architecture
//!
//! ```text
//! Source Code
//!     │
//!     ├──> Language Detection (from extension or tag)
//!     │
//!     ├──> Tree-sitter Parsing → AST
//!     │    ├─> Function / method fragments (CodeChunk[])
//!     │    └─> Comment spans
//!     │
//!     ├──> Normalizer
//!     │    ├─> Strip comments (AST spans or delimiter scanner)
//!     │    └─> Tidy whitespace (trailing, blank runs, trim)
//!     │
//!     └──> Lexer (size estimation, lexical features)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use dupgate_code_chunker::{normalize, Chunker, ChunkerConfig, Language};
//!
//! let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
//! let code = "def total(xs):\n    # running sum\n    acc = 0\n    for x in xs:\n        acc += x\n    return acc\n";
//!
//! for chunk in chunker.chunk_str(code, Some("stats.py")).unwrap().chunks {
//!     let normalized = normalize(&chunk.content, Language::Python);
//!     assert!(!normalized.contains("running sum"));
//! }
//! ```

mod ast_analyzer;
mod chunker;
mod config;
mod error;
mod language;
pub mod lexer;
mod normalizer;
mod types;

pub use chunker::Chunker;
pub use config::ChunkerConfig;
pub use error::{ChunkerError, Result};
pub use language::{CommentSyntax, Language};
pub use lexer::count_tokens;
pub use normalizer::{normalize, strip_comments};
pub use types::{ChunkBatch, ChunkMetadata, ChunkType, CodeChunk, WHOLE_FILE_LOCATOR};
