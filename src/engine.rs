//! Incremental syntax engine.
//!
//! One `ParseSession` per shell session owns a tree-sitter parser, the last
//! tree, and the full accumulated text. Appending a fragment applies an
//! append-only `InputEdit` to the previous tree and reparses with it as the
//! reuse hint, so unchanged subtrees are shared across versions. Every call
//! to `append` produces exactly one outcome: a snapshot or an `EngineError`.
//! A panic out of the parse step is converted to an error at this boundary so
//! callers waiting on a result never hang.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::debug;
use tree_sitter::{InputEdit, Parser, Point as TsPoint, Tree};

use crate::ast::{Point, TypedNode};

/// Default cap on accumulated input, matching the 10 MiB session limit the
/// shell has always shipped with.
pub const DEFAULT_MAX_BUFFER: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Appending the fragment would exceed the configured buffer limit.
    /// Recoverable with `reset`; the accumulated text is untouched.
    BufferOverflow {
        current: usize,
        fragment: usize,
        max: usize,
    },
    /// The underlying parse step failed or panicked.
    ParserFailure(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::BufferOverflow {
                current,
                fragment,
                max,
            } => write!(
                f,
                "buffer overflow: {current} bytes held, {fragment} byte fragment exceeds limit of {max}"
            ),
            EngineError::ParserFailure(msg) => write!(f, "parser failure: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Byte interval that differs between two successive tree versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedRange {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start: Point,
    pub end: Point,
}

/// Result of a successful append: the typed tree plus change metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeSnapshot {
    pub root: TypedNode,
    pub changed_ranges: Vec<ChangedRange>,
    /// Smallest named subtrees covering the changed ranges, or the newly
    /// appended top-level nodes when ranges are empty.
    pub changed_nodes: Vec<TypedNode>,
    pub has_errors: bool,
}

pub struct ParseSession {
    parser: Parser,
    tree: Option<Tree>,
    accumulated: String,
    max_buffer: usize,
}

impl ParseSession {
    pub fn new() -> Result<ParseSession, EngineError> {
        ParseSession::with_max_buffer(DEFAULT_MAX_BUFFER)
    }

    pub fn with_max_buffer(max_buffer: usize) -> Result<ParseSession, EngineError> {
        let mut parser = Parser::new();
        parser
            .set_language(tree_sitter_bash::language())
            .map_err(|err| EngineError::ParserFailure(format!("set language: {err}")))?;
        Ok(ParseSession {
            parser,
            tree: None,
            accumulated: String::new(),
            max_buffer,
        })
    }

    /// Append a fragment and reparse incrementally.
    pub fn append(&mut self, fragment: &str) -> Result<TreeSnapshot, EngineError> {
        if self.accumulated.len() + fragment.len() > self.max_buffer {
            return Err(EngineError::BufferOverflow {
                current: self.accumulated.len(),
                fragment: fragment.len(),
                max: self.max_buffer,
            });
        }

        let old_len = self.accumulated.len();
        let old_rows = self.accumulated.matches('\n').count();
        self.accumulated.push_str(fragment);
        let new_len = self.accumulated.len();
        let new_rows = self.accumulated.matches('\n').count();

        let edit = InputEdit {
            start_byte: old_len,
            old_end_byte: old_len,
            new_end_byte: new_len,
            start_position: TsPoint {
                row: old_rows,
                column: 0,
            },
            old_end_position: TsPoint {
                row: old_rows,
                column: 0,
            },
            new_end_position: TsPoint {
                row: new_rows,
                column: 0,
            },
        };
        // Edit metadata on the previous tree is required for subtree reuse.
        if let Some(ref mut old_tree) = self.tree {
            old_tree.edit(&edit);
        }
        let old_tree = self.tree.clone();

        debug!(
            "parse event=append bytes={} total={}",
            fragment.len(),
            new_len
        );

        let parsed = catch_unwind(AssertUnwindSafe(|| {
            self.parser.parse(&self.accumulated, old_tree.as_ref())
        }));
        let new_tree = match parsed {
            Ok(Some(tree)) => tree,
            Ok(None) => {
                return Err(EngineError::ParserFailure(
                    "parser returned no tree".to_string(),
                ))
            }
            Err(_) => {
                return Err(EngineError::ParserFailure(
                    "parser panicked during reparse".to_string(),
                ))
            }
        };

        let has_errors = new_tree.root_node().has_error();
        let root = TypedNode::build(new_tree.root_node(), &self.accumulated);
        let (changed_ranges, changed_nodes) = match old_tree {
            Some(ref old) => (
                collect_changed_ranges(&new_tree, old),
                collect_changed_nodes(&new_tree, old, &self.accumulated),
            ),
            // First parse: everything is new.
            None => (Vec::new(), root.top_level().to_vec()),
        };
        debug!(
            "parse event=reparse errors={} ranges={}",
            has_errors,
            changed_ranges.len()
        );

        self.tree = Some(new_tree);
        Ok(TreeSnapshot {
            root,
            changed_ranges,
            changed_nodes,
            has_errors,
        })
    }

    /// Drop accumulated text and tree. The session stays usable.
    pub fn reset(&mut self) {
        debug!("parse event=reset dropped={}", self.accumulated.len());
        self.accumulated.clear();
        self.tree = None;
    }

    /// Typed view of the last tree without reparsing.
    pub fn current_snapshot(&self) -> Option<TreeSnapshot> {
        self.tree.as_ref().map(|tree| TreeSnapshot {
            root: TypedNode::build(tree.root_node(), &self.accumulated),
            changed_ranges: Vec::new(),
            changed_nodes: Vec::new(),
            has_errors: tree.root_node().has_error(),
        })
    }

    pub fn has_error_nodes(&self) -> bool {
        self.tree
            .as_ref()
            .is_some_and(|tree| tree.root_node().has_error())
    }

    pub fn buffer_len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }
}

fn collect_changed_ranges(new_tree: &Tree, old_tree: &Tree) -> Vec<ChangedRange> {
    new_tree
        .changed_ranges(old_tree)
        .map(|range| ChangedRange {
            start_byte: range.start_byte,
            end_byte: range.end_byte,
            start: Point {
                row: range.start_point.row,
                column: range.start_point.column,
            },
            end: Point {
                row: range.end_point.row,
                column: range.end_point.column,
            },
        })
        .collect()
}

/// Typed subtrees that changed between versions: the smallest named node
/// containing each changed range, or the newly appended top-level nodes when
/// tree-sitter reports no ranges (a pure append of new statements).
fn collect_changed_nodes(new_tree: &Tree, old_tree: &Tree, source: &str) -> Vec<TypedNode> {
    let ranges: Vec<tree_sitter::Range> = new_tree.changed_ranges(old_tree).collect();
    if !ranges.is_empty() {
        let root = new_tree.root_node();
        let mut nodes: Vec<TypedNode> = Vec::new();
        for range in &ranges {
            if let Some(node) = smallest_node_containing(root, range) {
                let typed = TypedNode::build(node, source);
                // Multiple ranges can land in the same subtree.
                if nodes.last() != Some(&typed) {
                    nodes.push(typed);
                }
            }
        }
        return nodes;
    }

    let old_count = old_tree.root_node().named_child_count();
    let new_root = new_tree.root_node();
    let mut nodes = Vec::new();
    let mut cursor = new_root.walk();
    if cursor.goto_first_child() {
        let mut index = 0;
        loop {
            let child = cursor.node();
            if child.is_named() {
                if index >= old_count {
                    nodes.push(TypedNode::build(child, source));
                }
                index += 1;
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    nodes
}

fn smallest_node_containing<'tree>(
    node: tree_sitter::Node<'tree>,
    range: &tree_sitter::Range,
) -> Option<tree_sitter::Node<'tree>> {
    if node.start_byte() > range.start_byte || node.end_byte() < range.end_byte {
        return None;
    }
    let mut best = if node.is_named() { Some(node) } else { None };
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            if let Some(smaller) = smallest_node_containing(cursor.node(), range) {
                best = Some(smaller);
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_accumulates_and_reports_new_nodes() {
        let mut session = ParseSession::new().unwrap();
        let first = session.append("echo one\n").unwrap();
        assert!(!first.has_errors);
        assert_eq!(first.changed_nodes.len(), 1);

        let second = session.append("echo two\n").unwrap();
        assert!(!second.has_errors);
        assert_eq!(session.accumulated(), "echo one\necho two\n");
        assert_eq!(second.root.top_level().len(), 2);
    }

    #[test]
    fn overflow_rejects_without_partial_append() {
        let mut session = ParseSession::with_max_buffer(8).unwrap();
        session.append("ls\n").unwrap();
        let err = session.append("echo too long\n").unwrap_err();
        assert!(matches!(
            err,
            EngineError::BufferOverflow {
                current: 3,
                fragment: 14,
                max: 8,
            }
        ));
        // Rejected call left the buffer as it was.
        assert_eq!(session.accumulated(), "ls\n");
        assert_eq!(session.buffer_len(), 3);
    }

    #[test]
    fn reset_clears_state_but_keeps_session_usable() {
        let mut session = ParseSession::new().unwrap();
        session.append("echo hi\n").unwrap();
        assert!(session.current_snapshot().is_some());
        session.reset();
        assert_eq!(session.buffer_len(), 0);
        assert!(session.current_snapshot().is_none());
        let snap = session.append("echo again\n").unwrap();
        assert_eq!(snap.root.top_level().len(), 1);
    }

    #[test]
    fn error_nodes_are_visible() {
        let mut session = ParseSession::new().unwrap();
        let snap = session.append("if then fi\n").unwrap();
        assert!(snap.has_errors);
        assert!(session.has_error_nodes());
    }

    #[test]
    fn current_snapshot_does_not_reparse() {
        let mut session = ParseSession::new().unwrap();
        let appended = session.append("echo hi\n").unwrap();
        let current = session.current_snapshot().unwrap();
        assert_eq!(appended.root, current.root);
    }
}
