//! Canonical form of a code fragment prior to embedding.
//!
//! `normalize` strips comments, removes trailing whitespace, collapses runs
//! of blank lines and trims the result. It is idempotent and never fails:
//! anything it cannot confidently classify as a comment is left in place.

use crate::ast_analyzer::{AstAnalyzer, CommentKind, CommentSpan};
use crate::config::ChunkerConfig;
use crate::error::Result;
use crate::language::{CommentSyntax, Language};

/// Canonicalize `raw` for the given language.
pub fn normalize(raw: &str, language: Language) -> String {
    let text = unify_line_endings(raw);
    let stripped = strip_comments(&text, language);
    tidy_whitespace(&stripped)
}

/// Remove comments using tree-sitter when the language has a grammar, the
/// delimiter scanner otherwise. Unknown languages pass through unchanged.
pub fn strip_comments(text: &str, language: Language) -> String {
    if language.supports_ast() {
        match strip_with_ast(text, language) {
            Ok(stripped) => return stripped,
            Err(e) => {
                log::debug!("AST comment stripping failed for {language}, using scanner: {e}");
            }
        }
    }

    match language.comment_syntax() {
        Some(syntax) => strip_with_scanner(text, &syntax),
        None => text.to_string(),
    }
}

fn strip_with_ast(text: &str, language: Language) -> Result<String> {
    let mut analyzer = AstAnalyzer::new(ChunkerConfig::default(), language)?;
    let spans = analyzer.comment_spans(text)?;
    Ok(remove_spans(text, &spans))
}

fn remove_spans(text: &str, spans: &[CommentSpan]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for span in spans {
        if span.start < pos || span.end > text.len() {
            continue;
        }
        out.push_str(&text[pos..span.start]);
        let comment = &text[span.start..span.end];
        match span.kind {
            CommentKind::Line => {
                // Some grammars include the terminating newline in the node.
                let kept = comment.len() - comment.trim_end_matches('\n').len();
                out.push_str(&comment[comment.len() - kept..]);
            }
            CommentKind::Block => push_block_replacement(&mut out, comment),
        }
        pos = span.end;
    }
    out.push_str(&text[pos..]);
    out
}

/// A block comment becomes its line breaks, or one space when it has none,
/// so neighbouring tokens never fuse and line structure is preserved.
fn push_block_replacement(out: &mut String, comment: &str) {
    let newlines = comment.matches('\n').count();
    if newlines == 0 {
        out.push(' ');
    } else {
        out.extend(std::iter::repeat('\n').take(newlines));
    }
}

fn strip_with_scanner(text: &str, syntax: &CommentSyntax) -> String {
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];

        if syntax.line.iter().any(|marker| rest.starts_with(marker)) {
            i += rest.find('\n').unwrap_or(rest.len());
            continue;
        }

        if let Some((open, close)) = syntax.block {
            if rest.starts_with(open) {
                match block_len(rest, open, close, syntax.nested_blocks) {
                    Some(len) => {
                        push_block_replacement(&mut out, &rest[..len]);
                        i += len;
                        continue;
                    }
                    None => {
                        out.push_str(rest);
                        break;
                    }
                }
            }
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        if syntax.quotes.contains(&c) {
            if let Some(len) = literal_len(rest, c) {
                out.push_str(&rest[..len]);
                i += len;
                continue;
            }
        }
        out.push(c);
        i += c.len_utf8();
    }

    out
}

/// Length of the block comment at the start of `rest`, `None` if unterminated.
fn block_len(rest: &str, open: &str, close: &str, nested: bool) -> Option<usize> {
    let mut depth = 1usize;
    let mut j = open.len();
    while j < rest.len() {
        let tail = &rest[j..];
        if tail.starts_with(close) {
            depth -= 1;
            j += close.len();
            if depth == 0 {
                return Some(j);
            }
        } else if nested && tail.starts_with(open) {
            depth += 1;
            j += open.len();
        } else {
            j += tail.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

/// Length of a single-line literal opened by `quote`, `None` if it does not
/// close before the end of the line.
fn literal_len(rest: &str, quote: char) -> Option<usize> {
    let mut chars = rest.char_indices().skip(1);
    while let Some((idx, c)) = chars.next() {
        match c {
            '\n' => return None,
            '\\' => match chars.next() {
                Some((_, '\n')) | None => return None,
                Some(_) => {}
            },
            c if c == quote => return Some(idx + c.len_utf8()),
            _ => {}
        }
    }
    None
}

fn unify_line_endings(raw: &str) -> String {
    if raw.contains('\r') {
        raw.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        raw.to_string()
    }
}

fn tidy_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.split('\n') {
        let line = line.trim_end();
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        lines.push(line);
        previous_blank = blank;
    }
    lines.join("\n").trim().to_string()
}
