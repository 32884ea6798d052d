//! Word evaluation and variable expansion.
//!
//! Expansion keeps values native for as long as possible: a bare `$NAME`
//! yields whatever the variable holds, while indexing (`$NAME["key"]`,
//! `$NAME[0]`) and concatenation with literal text are text boundaries that
//! force `to_text` rendering. Undefined names and failed navigation evaluate
//! to the empty string, never to an error.

use crate::ast::TypedNode;
use crate::interp::ExecutionContext;
use crate::value::NativeValue;

/// Evaluate a word-position node against the current context.
pub fn eval_word(node: &TypedNode, ctx: &ExecutionContext) -> NativeValue {
    match node {
        TypedNode::Word { info } | TypedNode::Number { info } => {
            NativeValue::String(info.text.clone())
        }
        TypedNode::RawString { info } => {
            NativeValue::String(strip_wrapping(&info.text, '\'').to_string())
        }
        TypedNode::StringLiteral { info, children } => {
            NativeValue::String(splice_string(info, children, ctx))
        }
        TypedNode::SimpleExpansion { variable, .. } => lookup(ctx, variable),
        TypedNode::Expansion { info, .. } => eval_braced_expansion(&info.text, ctx),
        TypedNode::Concatenation { children, .. } => eval_concatenation(children, ctx),
        // Command substitution needs nested execution, which lives outside
        // the expansion layer; it degrades to empty like an unset variable.
        TypedNode::CommandSubstitution { .. } => NativeValue::String(String::new()),
        other => NativeValue::String(other.info().text.clone()),
    }
}

/// Evaluate a word to its argument text (text boundary).
pub fn eval_word_text(node: &TypedNode, ctx: &ExecutionContext) -> String {
    eval_word(node, ctx).to_text()
}

fn lookup(ctx: &ExecutionContext, name: &str) -> NativeValue {
    ctx.variables
        .get(name)
        .cloned()
        .unwrap_or_else(|| NativeValue::String(String::new()))
}

/// Double-quoted string: literal runs interleaved with evaluated parts,
/// spliced by byte range relative to the string node.
fn splice_string(
    info: &crate::ast::SourceInfo,
    children: &[TypedNode],
    ctx: &ExecutionContext,
) -> String {
    let bytes = info.text.as_bytes();
    let inner_start = 1usize;
    let inner_end = bytes.len().saturating_sub(1);
    let mut out = String::new();
    let mut pos = inner_start;
    for child in children {
        let child_start = child.info().start_byte - info.start_byte;
        let child_end = child.info().end_byte - info.start_byte;
        if child_start > pos {
            out.push_str(&info.text[pos..child_start]);
        }
        match child {
            // Literal content renders as-is.
            TypedNode::Word { info } => out.push_str(&info.text),
            other => out.push_str(&eval_word(other, ctx).to_text()),
        }
        pos = child_end;
    }
    if inner_end > pos {
        out.push_str(&info.text[pos..inner_end]);
    }
    out
}

/// `${NAME}` and `${NAME[...]}` forms, parsed from the literal text.
fn eval_braced_expansion(text: &str, ctx: &ExecutionContext) -> NativeValue {
    let inner = text
        .strip_prefix("${")
        .and_then(|t| t.strip_suffix('}'))
        .unwrap_or(text);
    let name_len = inner
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(inner.len());
    let (name, rest) = inner.split_at(name_len);
    if name.is_empty() {
        return NativeValue::String(String::new());
    }
    let value = lookup(ctx, name);
    if rest.is_empty() {
        return value;
    }
    match parse_suffixes(rest) {
        Some(suffixes) => NativeValue::String(navigate(&value, &suffixes).to_text()),
        None => value,
    }
}

/// Concatenation either navigates bracket suffixes after an expansion or
/// falls back to plain text joining.
fn eval_concatenation(children: &[TypedNode], ctx: &ExecutionContext) -> NativeValue {
    if let Some((head, tail)) = children.split_first() {
        let head_is_expansion = matches!(
            head,
            TypedNode::SimpleExpansion { .. } | TypedNode::Expansion { .. }
        );
        if head_is_expansion && !tail.is_empty() {
            let suffix_text: String = tail.iter().map(|t| t.info().text.clone()).collect();
            if let Some(suffixes) = parse_suffixes(&suffix_text) {
                let value = eval_word(head, ctx);
                return NativeValue::String(navigate(&value, &suffixes).to_text());
            }
        }
    }
    let joined: String = children
        .iter()
        .map(|c| eval_word(c, ctx).to_text())
        .collect();
    NativeValue::String(joined)
}

/// One step of nested-structure access.
#[derive(Debug, Clone, PartialEq)]
enum Suffix {
    Key(String),
    Index(i64),
}

/// Parse a complete chain of `["key"]` / `[index]` suffixes. Returns `None`
/// unless the whole text is such a chain.
fn parse_suffixes(text: &str) -> Option<Vec<Suffix>> {
    let mut rest = text.trim();
    let mut suffixes = Vec::new();
    while !rest.is_empty() {
        rest = rest.strip_prefix('[')?;
        let close = rest.find(']')?;
        let raw = rest[..close].trim();
        rest = &rest[close + 1..];
        let suffix = if let Some(stripped) = strip_quotes(raw) {
            Suffix::Key(stripped.to_string())
        } else if let Ok(index) = raw.parse::<i64>() {
            Suffix::Index(index)
        } else if !raw.is_empty() {
            Suffix::Key(raw.to_string())
        } else {
            return None;
        };
        suffixes.push(suffix);
    }
    if suffixes.is_empty() {
        None
    } else {
        Some(suffixes)
    }
}

fn strip_quotes(text: &str) -> Option<&str> {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| text.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
}

/// Walk a value along the suffix chain. A string key requires a map, an
/// integer index requires a list; anything else yields the empty string.
fn navigate(value: &NativeValue, suffixes: &[Suffix]) -> NativeValue {
    let mut current = value.clone();
    for suffix in suffixes {
        current = match (&current, suffix) {
            (NativeValue::Map(entries), Suffix::Key(key)) => match entries.get(key) {
                Some(found) => found.clone(),
                None => return NativeValue::String(String::new()),
            },
            (NativeValue::List(items), Suffix::Index(index)) => {
                let idx = usize::try_from(*index).ok();
                match idx.and_then(|i| items.get(i)) {
                    Some(found) => found.clone(),
                    None => return NativeValue::String(String::new()),
                }
            }
            _ => return NativeValue::String(String::new()),
        };
    }
    current
}

fn strip_wrapping(text: &str, quote: char) -> &str {
    text.strip_prefix(quote)
        .and_then(|t| t.strip_suffix(quote))
        .unwrap_or(text)
}
