//! Lexical continuation detection for the line editor.
//!
//! Decides whether accumulated raw input is ready to hand to the syntax
//! engine without building a tree. Every call is a fresh scan over the whole
//! text: any character can flip the classification (an escaped backslash, a
//! quote inside a heredoc body), so no state is retained between calls.
//!
//! This layer is advisory only. It never reports errors; the authoritative
//! error signal comes from the classifier once a tree exists.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Why the input is not yet ready, or `Complete` when it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationKind {
    Complete,
    /// Trailing unescaped backslash before the newline.
    LineContinuation,
    /// Unclosed single or double quote.
    QuoteContinuation,
    /// Heredoc marker with no terminating line.
    HeredocContinuation,
    /// Open control structure (if/for/while/until/case).
    StructureContinuation,
}

/// True when the text can be submitted to the parser.
pub fn ready(text: &str) -> bool {
    continuation_kind(text) == ContinuationKind::Complete
}

/// Classify why more input is required, checking the cheapest signals first.
pub fn continuation_kind(text: &str) -> ContinuationKind {
    if has_line_continuation(text) {
        ContinuationKind::LineContinuation
    } else if has_open_quote(text) {
        ContinuationKind::QuoteContinuation
    } else if has_open_heredoc(text) {
        ContinuationKind::HeredocContinuation
    } else if has_open_structure(text) {
        ContinuationKind::StructureContinuation
    } else {
        ContinuationKind::Complete
    }
}

/// Trailing backslash rule: a single unescaped backslash continues the line,
/// but an extra blank line cancels the continuation.
fn has_line_continuation(text: &str) -> bool {
    let mut stripped = text;
    let mut newlines = 0usize;
    while let Some(rest) = stripped.strip_suffix('\n') {
        stripped = rest;
        newlines += 1;
    }
    if newlines > 1 {
        // Empty line breaks the continuation.
        return false;
    }
    let trailing_backslashes = stripped.chars().rev().take_while(|&c| c == '\\').count();
    // Even counts are fully escaped pairs.
    trailing_backslashes % 2 == 1
}

/// Three-state quote scan: single-open, double-open, escape-pending.
fn has_open_quote(text: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            // Backslash escapes nothing inside single quotes.
            '\\' if !in_single => escaped = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            _ => {}
        }
    }

    in_single || in_double
}

static HEREDOC_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"<<-?\s*(\w+)").unwrap());

/// A heredoc is open when some marker has no later line that is exactly the
/// marker once trimmed.
fn has_open_heredoc(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        for capture in HEREDOC_MARKER.captures_iter(line) {
            let marker = capture.get(1).map(|m| m.as_str()).unwrap_or("");
            let terminated = lines[idx + 1..].iter().any(|l| l.trim() == marker);
            if !terminated {
                return true;
            }
        }
    }
    false
}

/// Keyword stack over whitespace tokens. Stray closers are ignored here:
/// whether they are actually errors is the parser's call, not ours.
/// Standalone `{`/`}` tokens are tracked too, so a function body typed
/// line-by-line (`name() {` ... `}`) is held back until its closing brace.
fn has_open_structure(text: &str) -> bool {
    let mut stack: Vec<&str> = Vec::new();
    for raw in text.split_whitespace() {
        let token = raw.strip_suffix(';').unwrap_or(raw);
        match token {
            "for" | "while" | "until" | "if" | "case" => stack.push(token),
            "{" => stack.push("{"),
            "}" => {
                if stack.last() == Some(&"{") {
                    stack.pop();
                }
            }
            "done" => {
                if matches!(stack.last(), Some(&"for" | &"while" | &"until")) {
                    stack.pop();
                }
            }
            "fi" => {
                if stack.last() == Some(&"if") {
                    stack.pop();
                }
            }
            "esac" => {
                if stack.last() == Some(&"case") {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    !stack.is_empty()
}
