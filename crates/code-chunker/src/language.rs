use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported programming language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Ruby,
    Swift,
    Kotlin,
    Unknown,
}

/// Comment delimiters used by the fallback comment scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSyntax {
    /// Line comment markers (comment runs to end of line)
    pub line: &'static [&'static str],
    /// Block comment open/close delimiters
    pub block: Option<(&'static str, &'static str)>,
    /// Whether block comments nest (`/* /* */ */`)
    pub nested_blocks: bool,
    /// Single-line string/char literal quotes
    pub quotes: &'static [char],
}

const C_FAMILY: CommentSyntax = CommentSyntax {
    line: &["//"],
    block: Some(("/*", "*/")),
    nested_blocks: false,
    quotes: &['"', '\''],
};

impl Language {
    /// Detect language from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyw" => Language::Python,
            "js" | "mjs" | "cjs" | "jsx" => Language::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Language::Cpp,
            "cs" => Language::CSharp,
            "rb" => Language::Ruby,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            _ => Language::Unknown,
        }
    }

    /// Detect language from file path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Parse a language tag (`"python"`, `"py"`, `"c++"`, ...)
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_lowercase();
        match tag.as_str() {
            "rust" => Language::Rust,
            "python" => Language::Python,
            "javascript" | "node" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "go" | "golang" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "csharp" | "c#" => Language::CSharp,
            "ruby" => Language::Ruby,
            "swift" => Language::Swift,
            "kotlin" => Language::Kotlin,
            other => Self::from_extension(other),
        }
    }

    /// Get language name as string
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Rust => "rust",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Unknown => "unknown",
        }
    }

    /// Check if this language is supported for AST parsing
    pub fn supports_ast(self) -> bool {
        matches!(
            self,
            Language::Rust | Language::Python | Language::JavaScript | Language::TypeScript
        )
    }

    /// Get Tree-sitter language instance
    pub fn tree_sitter_language(self) -> Result<tree_sitter::Language> {
        match self {
            Language::Rust => Ok(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Ok(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Ok(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            _ => Err(ChunkerError::unsupported_language(self.as_str())),
        }
    }

    /// Comment delimiters for the scanner. `None` means comments are not
    /// recognized and text passes through untouched.
    pub fn comment_syntax(self) -> Option<CommentSyntax> {
        match self {
            // Lifetimes ('a) make single quotes ambiguous in Rust.
            Language::Rust => Some(CommentSyntax {
                nested_blocks: true,
                quotes: &['"'],
                ..C_FAMILY
            }),
            Language::JavaScript | Language::TypeScript => Some(CommentSyntax {
                quotes: &['"', '\'', '`'],
                ..C_FAMILY
            }),
            Language::Go => Some(CommentSyntax {
                quotes: &['"', '\'', '`'],
                ..C_FAMILY
            }),
            Language::Java | Language::C | Language::Cpp | Language::CSharp => Some(C_FAMILY),
            Language::Swift | Language::Kotlin => Some(CommentSyntax {
                nested_blocks: true,
                quotes: &['"'],
                ..C_FAMILY
            }),
            Language::Python | Language::Ruby => Some(CommentSyntax {
                line: &["#"],
                block: None,
                nested_blocks: false,
                quotes: &['"', '\''],
            }),
            Language::Unknown => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(Language::from_extension("rs"), Language::Rust);
        assert_eq!(Language::from_extension("RS"), Language::Rust);
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("js"), Language::JavaScript);
        assert_eq!(Language::from_extension("ts"), Language::TypeScript);
        assert_eq!(Language::from_extension("unknown"), Language::Unknown);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Language::from_path("test.rs"), Language::Rust);
        assert_eq!(Language::from_path("src/main.py"), Language::Python);
        assert_eq!(Language::from_path("index.ts"), Language::TypeScript);
        assert_eq!(Language::from_path("no_extension"), Language::Unknown);
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(Language::from_tag("Python"), Language::Python);
        assert_eq!(Language::from_tag("py"), Language::Python);
        assert_eq!(Language::from_tag("c++"), Language::Cpp);
        assert_eq!(Language::from_tag("golang"), Language::Go);
        assert_eq!(Language::from_tag("cobol"), Language::Unknown);
        for lang in [Language::Rust, Language::Kotlin, Language::CSharp] {
            assert_eq!(Language::from_tag(lang.as_str()), lang);
        }
    }

    #[test]
    fn test_tree_sitter_language() {
        assert!(Language::Rust.tree_sitter_language().is_ok());
        assert!(Language::Python.tree_sitter_language().is_ok());
        assert!(Language::JavaScript.tree_sitter_language().is_ok());
        assert!(Language::TypeScript.tree_sitter_language().is_ok());
        assert!(Language::Go.tree_sitter_language().is_err());
    }

    #[test]
    fn test_comment_syntax() {
        assert!(Language::Unknown.comment_syntax().is_none());
        let py = Language::Python.comment_syntax().unwrap();
        assert_eq!(py.line, &["#"]);
        assert!(py.block.is_none());
        assert!(Language::Swift.comment_syntax().unwrap().nested_blocks);
        assert!(!Language::Java.comment_syntax().unwrap().nested_blocks);
    }
}
