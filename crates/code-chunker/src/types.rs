use serde::{Deserialize, Serialize};

/// Locator shared by every whole-file chunk
pub const WHOLE_FILE_LOCATOR: &str = "<file>";

/// A function-level code fragment with metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeChunk {
    /// Source file path
    pub file_path: String,

    /// Start line (1-indexed)
    pub start_line: usize,

    /// End line (1-indexed, inclusive)
    pub end_line: usize,

    /// The actual code content
    pub content: String,

    /// Metadata about this chunk
    pub metadata: ChunkMetadata,
}

impl CodeChunk {
    /// Create a new code chunk
    #[must_use]
    pub const fn new(
        file_path: String,
        start_line: usize,
        end_line: usize,
        content: String,
        metadata: ChunkMetadata,
    ) -> Self {
        Self {
            file_path,
            start_line,
            end_line,
            content,
            metadata,
        }
    }

    /// Symbol used to identify the chunk inside its file: the qualified name
    /// when known, `<file>` for whole-file chunks, otherwise the line range
    /// (`L3-9`).
    ///
    /// Whole-file chunks get a fixed locator so the same file keeps the same
    /// origin as it grows or shrinks.
    #[must_use]
    pub fn locator(&self) -> String {
        if self.metadata.chunk_type == Some(ChunkType::File) {
            return WHOLE_FILE_LOCATOR.to_string();
        }
        self.metadata
            .qualified_name
            .clone()
            .or_else(|| self.metadata.symbol_name.clone())
            .unwrap_or_else(|| format!("L{}-{}", self.start_line, self.end_line))
    }
}

/// Chunks extracted from one file, plus the number dropped by `max_chunks`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkBatch {
    pub chunks: Vec<CodeChunk>,
    pub skipped: usize,
}

/// Metadata about a code chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Programming language
    pub language: Option<String>,

    /// Chunk type (function, method, whole file)
    pub chunk_type: Option<ChunkType>,

    /// Symbol name (function name, method name)
    pub symbol_name: Option<String>,

    /// Full qualified name (e.g., "Class.method", "module::function")
    pub qualified_name: Option<String>,

    /// Parent scope (class name for methods, module for functions)
    pub parent_scope: Option<String>,
}

impl ChunkMetadata {
    /// Create metadata with language only
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }

    /// Builder: set chunk type
    #[must_use]
    pub const fn chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = Some(chunk_type);
        self
    }

    /// Builder: set symbol name
    #[must_use]
    pub fn symbol_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.qualified_name = Some(name.clone());
        self.symbol_name = Some(name);
        self
    }
}

/// Granularity of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Standalone function
    Function,
    /// Method inside a class, impl or trait
    Method,
    /// Whole file (no function-level structure found)
    File,
}

impl ChunkType {
    /// Get human-readable name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::File => "file",
        }
    }
}
