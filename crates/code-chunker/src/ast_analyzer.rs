use crate::config::ChunkerConfig;
use crate::error::{ChunkerError, Result};
use crate::language::Language;
use crate::types::{ChunkMetadata, ChunkType, CodeChunk};
use tree_sitter::{Node, Parser, Tree};

/// Byte range of a comment found in the syntax tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentSpan {
    pub start: usize,
    pub end: usize,
    pub kind: CommentKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Line,
    Block,
}

/// AST-based analyzer: extracts function-level fragments and locates comments
pub struct AstAnalyzer {
    config: ChunkerConfig,
    parser: Parser,
    language: Language,
}

impl AstAnalyzer {
    /// Create new AST analyzer for a language
    pub fn new(config: ChunkerConfig, language: Language) -> Result<Self> {
        if !language.supports_ast() {
            return Err(ChunkerError::unsupported_language(language.as_str()));
        }

        let ts_language = language.tree_sitter_language()?;
        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| ChunkerError::tree_sitter(format!("Failed to set language: {e}")))?;

        Ok(Self {
            config,
            parser,
            language,
        })
    }

    fn parse(&mut self, content: &str) -> Result<Tree> {
        self.parser
            .parse(content, None)
            .ok_or_else(|| ChunkerError::parse("Failed to parse source code"))
    }

    /// Parse and extract function/method fragments
    pub fn chunk(&mut self, content: &str, file_path: &str) -> Result<Vec<CodeChunk>> {
        let tree = self.parse(content)?;
        let root = tree.root_node();

        let mut chunks = Vec::new();
        match self.language {
            Language::Rust => self.extract_rust_chunks(content, file_path, root, None, &mut chunks),
            Language::Python => self.extract_python_chunks(content, file_path, root, &mut chunks),
            Language::JavaScript | Language::TypeScript => {
                self.extract_js_chunks(content, file_path, root, &mut chunks);
            }
            _ => {}
        }
        Ok(chunks)
    }

    /// Locate comments in document order. Scanning stops at the first block
    /// comment that is not closed, so the remainder of the text is kept as is.
    pub fn comment_spans(&mut self, content: &str) -> Result<Vec<CommentSpan>> {
        let tree = self.parse(content)?;
        let mut spans = Vec::new();
        let mut cursor = tree.walk();

        loop {
            let node = cursor.node();
            let mut descend = true;
            if is_comment_kind(node.kind()) {
                descend = false;
                let (start, end) = (node.start_byte(), node.end_byte());
                let text = &content[start..end];
                if text.starts_with("/*") {
                    if text.len() < 4 || !text.ends_with("*/") {
                        return Ok(spans);
                    }
                    spans.push(CommentSpan {
                        start,
                        end,
                        kind: CommentKind::Block,
                    });
                } else if !text.is_empty() {
                    spans.push(CommentSpan {
                        start,
                        end,
                        kind: CommentKind::Line,
                    });
                }
            }

            if descend && cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return Ok(spans);
                }
            }
        }
    }

    /// Extract functions from Rust code (recursing into inline modules)
    fn extract_rust_chunks(
        &self,
        content: &str,
        file_path: &str,
        node: Node,
        module: Option<&str>,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "function_item" => {
                    let mut chunk =
                        self.node_to_chunk(content, file_path, child, ChunkType::Function);
                    if let Some(module) = module {
                        set_parent(&mut chunk, module, "::");
                    }
                    chunks.push(chunk);
                }
                "impl_item" | "trait_item" if self.config.include_methods => {
                    self.extract_rust_methods(content, file_path, child, chunks);
                }
                "mod_item" => {
                    let name = Self::extract_symbol_name(content, child);
                    let scope = match (module, name.as_deref()) {
                        (Some(outer), Some(inner)) => Some(format!("{outer}::{inner}")),
                        (None, Some(inner)) => Some(inner.to_string()),
                        (outer, None) => outer.map(str::to_string),
                    };
                    if let Some(body) = child.child_by_field_name("body") {
                        self.extract_rust_chunks(
                            content,
                            file_path,
                            body,
                            scope.as_deref(),
                            chunks,
                        );
                    }
                }
                _ => {}
            }
        }
    }

    /// Extract methods from impl and trait blocks
    fn extract_rust_methods(
        &self,
        content: &str,
        file_path: &str,
        block_node: Node,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let target = Self::extract_impl_target(content, block_node);

        let mut cursor = block_node.walk();
        for child in block_node.children(&mut cursor) {
            if child.kind() != "declaration_list" {
                continue;
            }
            let mut decl_cursor = child.walk();
            for method_node in child.children(&mut decl_cursor) {
                // Trait method signatures without a body are not code to compare.
                if method_node.kind() != "function_item" {
                    continue;
                }
                let mut chunk =
                    self.node_to_chunk(content, file_path, method_node, ChunkType::Method);
                if let Some(ref target) = target {
                    set_parent(&mut chunk, target, "::");
                }
                chunks.push(chunk);
            }
        }
    }

    /// Extract the target of an impl block (struct/trait name)
    fn extract_impl_target(content: &str, impl_node: Node) -> Option<String> {
        if impl_node.kind() == "trait_item" {
            return Self::extract_symbol_name(content, impl_node);
        }

        let ty = impl_node.child_by_field_name("type")?;
        match ty.kind() {
            "type_identifier" => Some(node_text(content, ty).to_string()),
            // impl<T> MyStruct<T>, impl module::MyStruct
            "generic_type" | "scoped_type_identifier" => {
                let mut cursor = ty.walk();
                let found = ty
                    .children(&mut cursor)
                    .filter(|c| c.kind() == "type_identifier")
                    .last()
                    .map(|c| node_text(content, c).to_string());
                found
            }
            _ => None,
        }
    }

    /// Extract functions and class methods from Python code
    fn extract_python_chunks(
        &self,
        content: &str,
        file_path: &str,
        node: Node,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            let definition = unwrap_decorated(child);
            match definition.kind() {
                "function_definition" => {
                    chunks.push(self.node_to_chunk(
                        content,
                        file_path,
                        definition,
                        ChunkType::Function,
                    ));
                }
                "class_definition" if self.config.include_methods => {
                    self.extract_python_class_methods(content, file_path, definition, chunks);
                }
                _ => {}
            }
        }
    }

    /// Extract methods from Python class
    fn extract_python_class_methods(
        &self,
        content: &str,
        file_path: &str,
        class_node: Node,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let class_name = Self::extract_symbol_name(content, class_node);
        let Some(body) = class_node.child_by_field_name("body") else {
            return;
        };

        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            let method_node = unwrap_decorated(member);
            if method_node.kind() != "function_definition" {
                continue;
            }
            let mut chunk = self.node_to_chunk(content, file_path, method_node, ChunkType::Method);
            if let Some(ref name) = class_name {
                set_parent(&mut chunk, name, ".");
            }
            chunks.push(chunk);
        }
    }

    /// Extract functions from JavaScript/TypeScript code
    fn extract_js_chunks(
        &self,
        content: &str,
        file_path: &str,
        node: Node,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            // export function f() {} / export default class C {}
            let child = if child.kind() == "export_statement" {
                match child.child_by_field_name("declaration") {
                    Some(declaration) => declaration,
                    None => continue,
                }
            } else {
                child
            };

            match child.kind() {
                "function_declaration" | "generator_function_declaration" => {
                    chunks.push(self.node_to_chunk(content, file_path, child, ChunkType::Function));
                }
                "class_declaration" | "abstract_class_declaration"
                    if self.config.include_methods =>
                {
                    self.extract_js_class_methods(content, file_path, child, chunks);
                }
                "lexical_declaration" | "variable_declaration" => {
                    self.extract_js_function_bindings(content, file_path, child, chunks);
                }
                _ => {}
            }
        }
    }

    /// `const handler = (req) => { ... }` and `var f = function () { ... }`
    fn extract_js_function_bindings(
        &self,
        content: &str,
        file_path: &str,
        declaration: Node,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let mut cursor = declaration.walk();
        for declarator in declaration.children(&mut cursor) {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(value) = declarator.child_by_field_name("value") else {
                continue;
            };
            if !matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function" | "generator_function"
            ) {
                continue;
            }
            let mut chunk = self.node_to_chunk(content, file_path, declarator, ChunkType::Function);
            if let Some(name) = declarator.child_by_field_name("name") {
                let name = node_text(content, name).to_string();
                chunk.metadata.qualified_name = Some(name.clone());
                chunk.metadata.symbol_name = Some(name);
            }
            chunks.push(chunk);
        }
    }

    /// Extract methods from JavaScript/TypeScript class
    fn extract_js_class_methods(
        &self,
        content: &str,
        file_path: &str,
        class_node: Node,
        chunks: &mut Vec<CodeChunk>,
    ) {
        let class_name = Self::extract_symbol_name(content, class_node);
        let Some(body) = class_node.child_by_field_name("body") else {
            return;
        };

        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            if member.kind() != "method_definition" {
                continue;
            }
            let mut chunk = self.node_to_chunk(content, file_path, member, ChunkType::Method);
            if let Some(ref name) = class_name {
                set_parent(&mut chunk, name, ".");
            }
            chunks.push(chunk);
        }
    }

    /// Convert AST node to code chunk
    fn node_to_chunk(
        &self,
        content: &str,
        file_path: &str,
        node: Node,
        chunk_type: ChunkType,
    ) -> CodeChunk {
        let code_content = node_text(content, node);
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;
        let symbol_name = Self::extract_symbol_name(content, node);

        let metadata = ChunkMetadata {
            language: Some(self.language.as_str().to_string()),
            chunk_type: Some(chunk_type),
            qualified_name: symbol_name.clone(),
            symbol_name,
            parent_scope: None,
        };

        CodeChunk::new(
            file_path.to_string(),
            start_line,
            end_line,
            code_content.to_string(),
            metadata,
        )
    }

    /// Extract symbol name from AST node
    fn extract_symbol_name(content: &str, node: Node) -> Option<String> {
        if let Some(name) = node.child_by_field_name("name") {
            return Some(node_text(content, name).to_string());
        }

        let mut cursor = node.walk();
        let found = node
            .children(&mut cursor)
            .find(|child| {
                matches!(
                    child.kind(),
                    "identifier"
                        | "name"
                        | "type_identifier"
                        | "field_identifier"
                        | "property_identifier"
                )
            })
            .map(|child| node_text(content, child).to_string());
        found
    }
}

fn is_comment_kind(kind: &str) -> bool {
    matches!(kind, "comment" | "line_comment" | "block_comment" | "html_comment")
}

fn node_text<'a>(content: &'a str, node: Node) -> &'a str {
    &content[node.start_byte()..node.end_byte()]
}

fn unwrap_decorated(node: Node) -> Node {
    if node.kind() == "decorated_definition" {
        if let Some(definition) = node.child_by_field_name("definition") {
            return definition;
        }
    }
    node
}

fn set_parent(chunk: &mut CodeChunk, scope: &str, separator: &str) {
    chunk.metadata.parent_scope = Some(scope.to_string());
    if let Some(ref name) = chunk.metadata.symbol_name {
        chunk.metadata.qualified_name = Some(format!("{scope}{separator}{name}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer(language: Language) -> AstAnalyzer {
        AstAnalyzer::new(ChunkerConfig::default(), language).unwrap()
    }

    #[test]
    fn test_rust_functions_and_methods() {
        let code = r#"
fn main() {
    println!("Hello");
}

struct Point {
    x: i32,
}

impl Point {
    fn norm(&self) -> i32 {
        self.x.abs()
    }
}

mod geometry {
    fn area(w: i32, h: i32) -> i32 {
        w * h
    }
}
"#;

        let chunks = analyzer(Language::Rust).chunk(code, "test.rs").unwrap();
        let names: Vec<_> = chunks
            .iter()
            .filter_map(|c| c.metadata.qualified_name.clone())
            .collect();
        assert_eq!(names, vec!["main", "Point::norm", "geometry::area"]);
        assert_eq!(chunks[1].metadata.chunk_type, Some(ChunkType::Method));
        assert!(chunks[1].content.starts_with("fn norm"));
        assert_eq!(chunks[0].start_line, 2);
        assert_eq!(chunks[0].end_line, 4);
    }

    #[test]
    fn test_python_functions_and_methods() {
        let code = r#"
def hello():
    print("Hello")

class Greeter:
    @staticmethod
    def wave(name):
        return "hi " + name
"#;

        let chunks = analyzer(Language::Python).chunk(code, "test.py").unwrap();
        let names: Vec<_> = chunks
            .iter()
            .filter_map(|c| c.metadata.qualified_name.clone())
            .collect();
        assert_eq!(names, vec!["hello", "Greeter.wave"]);
    }

    #[test]
    fn test_js_functions_and_bindings() {
        let code = r#"
export function add(a, b) { return a + b; }
const mul = (a, b) => { return a * b; };
class Calc {
  div(a, b) { return a / b; }
}
"#;

        let chunks = analyzer(Language::JavaScript).chunk(code, "calc.js").unwrap();
        let names: Vec<_> = chunks
            .iter()
            .filter_map(|c| c.metadata.qualified_name.clone())
            .collect();
        assert_eq!(names, vec!["add", "mul", "Calc.div"]);
    }

    #[test]
    fn test_methods_can_be_excluded() {
        let config = ChunkerConfig {
            include_methods: false,
            ..ChunkerConfig::default()
        };
        let mut analyzer = AstAnalyzer::new(config, Language::Python).unwrap();
        let code = "class A:\n    def m(self):\n        return 1\n";
        assert!(analyzer.chunk(code, "a.py").unwrap().is_empty());
    }

    #[test]
    fn test_comment_spans_rust() {
        let code = "let a = 1; // trailing\n/* block\n spans */ let b = \"// not a comment\";\n";
        let spans = analyzer(Language::Rust).comment_spans(code).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].kind, CommentKind::Line);
        assert!(code[spans[0].start..spans[0].end].starts_with("// trailing"));
        assert_eq!(spans[1].kind, CommentKind::Block);
        assert_eq!(&code[spans[1].start..spans[1].end], "/* block\n spans */");
    }

    #[test]
    fn test_comment_spans_python() {
        let code = "x = 1  # note\ns = '# not a comment'\n";
        let spans = analyzer(Language::Python).comment_spans(code).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(&code[spans[0].start..spans[0].end], "# note");
    }

    #[test]
    fn test_unsupported_language() {
        let result = AstAnalyzer::new(ChunkerConfig::default(), Language::Go);
        assert!(result.is_err());
    }
}
