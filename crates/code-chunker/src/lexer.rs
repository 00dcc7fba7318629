//! Language-agnostic code lexer.
//!
//! Produces a flat lexeme stream (identifiers, keywords, numbers, string
//! literals, operators) that is good enough for size estimation and lexical
//! embeddings. It does not try to be a real tokenizer for any language.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const TOKEN_PATTERN: &str = concat!(
    r#""(?:\\.|[^"\\\n])*""#,
    r"|'(?:\\.|[^'\\\n])*'",
    r"|[A-Za-z_][A-Za-z0-9_]*",
    r"|\d[\d_]*(?:\.\d+)?",
    r"|==|!=|<=|>=|\+=|-=|\*=|/=|->|=>|::|&&|\|\||<<|>>|\*\*",
    r"|\S",
);

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(TOKEN_PATTERN).expect("token pattern is valid"));

/// Keywords kept verbatim by the lexical embedder (union over supported languages).
const KEYWORDS: &[&str] = &[
    // python
    "def", "return", "for", "in", "if", "elif", "else", "while", "break", "continue", "class",
    "import", "from", "as", "with", "try", "except", "finally", "raise", "lambda", "yield",
    "pass", "not", "and", "or", "is", "None", "True", "False",
    // rust
    "fn", "let", "mut", "pub", "impl", "struct", "enum", "trait", "match", "loop", "where",
    "use", "mod", "const", "static", "self", "Self", "super", "crate", "async", "await", "move",
    "ref", "dyn", "type", "unsafe", "extern",
    // javascript / typescript
    "function", "var", "new", "this", "typeof", "instanceof", "of", "do", "switch", "case",
    "default", "throw", "catch", "delete", "void", "null", "undefined", "true", "false",
    "interface", "extends", "implements", "export",
    // go
    "func", "go", "defer", "chan", "map", "range", "package", "select", "int", "float", "bool",
    "string",
    // jvm / c-family
    "public", "private", "protected", "final", "abstract", "long", "double", "char", "boolean",
];

static KEYWORD_SET: Lazy<HashSet<&'static str>> = Lazy::new(|| KEYWORDS.iter().copied().collect());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Keyword,
    Number,
    Str,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
}

/// Split code into lexemes.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| {
            let lexeme = m.as_str();
            Token {
                kind: classify(lexeme),
                text: lexeme,
            }
        })
        .collect()
}

/// Number of lexemes in `text`.
pub fn count_tokens(text: &str) -> usize {
    TOKEN_RE.find_iter(text).count()
}

pub fn is_keyword(word: &str) -> bool {
    KEYWORD_SET.contains(word)
}

fn classify(lexeme: &str) -> TokenKind {
    let Some(first) = lexeme.chars().next() else {
        return TokenKind::Punct;
    };
    if (first == '"' || first == '\'') && lexeme.len() >= 2 {
        TokenKind::Str
    } else if first.is_ascii_digit() || first.is_numeric() {
        TokenKind::Number
    } else if first.is_ascii_alphabetic() || first == '_' {
        if is_keyword(lexeme) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        }
    } else {
        TokenKind::Punct
    }
}

/// Split an identifier into lowercase words (`parseHTTPHeader` -> `parse http header`).
pub fn split_identifier(ident: &str) -> Vec<String> {
    let mut words = Vec::new();
    for part in ident.split('_').filter(|p| !p.is_empty()) {
        let chars: Vec<char> = part.chars().collect();
        let mut current = String::new();
        for (i, &c) in chars.iter().enumerate() {
            if c.is_uppercase() && !current.is_empty() {
                let prev_upper = chars[i - 1].is_uppercase();
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if !prev_upper || next_lower {
                    words.push(std::mem::take(&mut current));
                }
            }
            current.extend(c.to_lowercase());
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}
