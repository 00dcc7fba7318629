use crate::ast_analyzer::AstAnalyzer;
use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::types::{ChunkBatch, ChunkMetadata, ChunkType, CodeChunk};

/// Main chunker interface: splits a source file into function-level fragments
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    /// Create a new chunker with configuration
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::invalid_config)?;
        Ok(Self { config })
    }

    /// Chunk code from a string
    pub fn chunk_str(&self, content: &str, file_path: Option<&str>) -> Result<ChunkBatch> {
        let file_path = file_path.unwrap_or("unknown");
        let language = Language::from_path(file_path);

        self.chunk_with_language(content, file_path, language)
    }

    /// Chunk code with explicit language
    pub fn chunk_with_language(
        &self,
        content: &str,
        file_path: &str,
        language: Language,
    ) -> Result<ChunkBatch> {
        if content.trim().is_empty() {
            return Err(ChunkerError::EmptyContent);
        }

        let mut chunks = Vec::new();
        if language.supports_ast() {
            match self.chunk_with_ast(content, file_path, language) {
                Ok(found) => chunks = found,
                Err(e) => {
                    log::warn!(
                        "AST chunking failed for {file_path}, falling back to whole file: {e}"
                    );
                }
            }
        }

        if chunks.is_empty() && self.config.whole_file_fallback {
            chunks.push(Self::whole_file_chunk(content, file_path, language));
        }

        Ok(self.post_process_chunks(chunks, file_path))
    }

    /// Chunk using AST analysis
    fn chunk_with_ast(
        &self,
        content: &str,
        file_path: &str,
        language: Language,
    ) -> Result<Vec<CodeChunk>> {
        let mut analyzer = AstAnalyzer::new(self.config.clone(), language)?;
        analyzer.chunk(content, file_path)
    }

    fn whole_file_chunk(content: &str, file_path: &str, language: Language) -> CodeChunk {
        CodeChunk::new(
            file_path.to_string(),
            1,
            content.lines().count().max(1),
            content.to_string(),
            ChunkMetadata::with_language(language.as_str()).chunk_type(ChunkType::File),
        )
    }

    fn post_process_chunks(&self, mut chunks: Vec<CodeChunk>, file_path: &str) -> ChunkBatch {
        chunks.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then_with(|| a.end_line.cmp(&b.end_line))
        });

        let skipped = chunks.len().saturating_sub(self.config.max_chunks);
        if skipped > 0 {
            log::warn!(
                "Keeping {} of {} chunks from {file_path}; {skipped} left unchecked",
                self.config.max_chunks,
                chunks.len()
            );
            chunks.truncate(self.config.max_chunks);
        }

        ChunkBatch { chunks, skipped }
    }
}
