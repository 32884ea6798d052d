//! Parse-state classification over a typed tree snapshot.
//!
//! Order matters and is load-bearing: an open structure is reported as
//! `Incomplete` before any ERROR node is considered, because a fragment like
//! `if true; then` produces both an unterminated if-statement and tree-level
//! errors, and the user typing it must see "waiting for `fi`", not a syntax
//! error. The open-structure check is textual: a structural node counts as
//! open when its trimmed literal source does not end with its closing
//! keyword. That heuristic can false-positive on pathological bodies; it is
//! kept as-is because the incomplete-over-error priority depends on it.

use crate::ast::{SourceInfo, TypedNode};

/// Control-flow constructs that require an explicit closing keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureKind {
    If,
    For,
    While,
    Until,
    Case,
    Function,
}

impl StructureKind {
    pub fn expected_keyword(&self) -> &'static str {
        match self {
            StructureKind::If => "fi",
            StructureKind::For | StructureKind::While | StructureKind::Until => "done",
            StructureKind::Case => "esac",
            StructureKind::Function => "}",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Complete,
    /// A normal intermediate state while typing, not an error.
    Incomplete {
        kind: StructureKind,
        expected: &'static str,
    },
    SyntaxError {
        info: SourceInfo,
    },
}

/// Classify a tree snapshot. Recomputed on demand, never stored.
pub fn classify(root: &TypedNode) -> Classification {
    if let Some(kind) = find_open_structure(root) {
        return Classification::Incomplete {
            kind,
            expected: kind.expected_keyword(),
        };
    }
    if let Some(info) = find_first_error(root) {
        return Classification::SyntaxError { info };
    }
    Classification::Complete
}

/// Innermost structural node whose literal text is not closed yet.
/// Children are searched before the node itself.
fn find_open_structure(node: &TypedNode) -> Option<StructureKind> {
    for child in node.child_nodes() {
        if let Some(found) = find_open_structure(child) {
            return Some(found);
        }
    }
    // A function body typed line-by-line has no function_definition node
    // yet; until the closing brace arrives the grammar only offers an ERROR
    // node. An unmatched standalone `{` inside it marks the definition open.
    if let TypedNode::Error {
        info, syntax: true, ..
    } = node
    {
        if has_unclosed_brace(&info.text) {
            return Some(StructureKind::Function);
        }
    }
    let kind = structure_kind(node)?;
    let text = node.info().text.trim_end();
    if text.ends_with(kind.expected_keyword()) {
        None
    } else {
        Some(kind)
    }
}

/// Standalone `{` tokens not balanced by a later standalone `}`.
fn has_unclosed_brace(text: &str) -> bool {
    let mut depth = 0usize;
    for raw in text.split_whitespace() {
        let token = raw.strip_suffix(';').unwrap_or(raw);
        match token {
            "{" => depth += 1,
            "}" => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth > 0
}

fn structure_kind(node: &TypedNode) -> Option<StructureKind> {
    match node {
        TypedNode::IfStatement { .. } => Some(StructureKind::If),
        TypedNode::ForStatement { .. } => Some(StructureKind::For),
        TypedNode::WhileStatement { until, .. } => Some(if *until {
            StructureKind::Until
        } else {
            StructureKind::While
        }),
        TypedNode::CaseStatement { .. } => Some(StructureKind::Case),
        TypedNode::FunctionDefinition { .. } => Some(StructureKind::Function),
        _ => None,
    }
}

/// First ERROR node in preorder, searching every field and child list.
fn find_first_error(node: &TypedNode) -> Option<SourceInfo> {
    if let TypedNode::Error { info, syntax, .. } = node {
        if *syntax {
            return Some(info.clone());
        }
    }
    node.child_nodes().into_iter().find_map(find_first_error)
}

/// Recursive count of structural nodes, for diagnostics.
pub fn count_structural_nodes(node: &TypedNode) -> usize {
    let own = usize::from(structure_kind(node).is_some());
    own + node
        .child_nodes()
        .iter()
        .map(|c| count_structural_nodes(c))
        .sum::<usize>()
}

/// Recursive count of ERROR nodes, for diagnostics.
pub fn count_error_nodes(node: &TypedNode) -> usize {
    let own = usize::from(matches!(node, TypedNode::Error { syntax: true, .. }));
    own + node
        .child_nodes()
        .iter()
        .map(|c| count_error_nodes(c))
        .sum::<usize>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ParseSession;

    fn snapshot_root(text: &str) -> TypedNode {
        let mut session = ParseSession::new().unwrap();
        session.append(text).unwrap().root
    }

    #[test]
    fn complete_command() {
        assert_eq!(classify(&snapshot_root("echo hi\n")), Classification::Complete);
    }

    #[test]
    fn open_if_reports_incomplete_before_errors() {
        let root = snapshot_root("if true; then\n");
        // The fragment also carries tree errors; incompleteness must win.
        assert_eq!(
            classify(&root),
            Classification::Incomplete {
                kind: StructureKind::If,
                expected: "fi",
            }
        );
    }

    #[test]
    fn open_loop_expects_done() {
        let root = snapshot_root("for i in 1 2 3; do\necho $i\n");
        assert_eq!(
            classify(&root),
            Classification::Incomplete {
                kind: StructureKind::For,
                expected: "done",
            }
        );
    }

    #[test]
    fn nested_open_structure_reports_innermost() {
        let root = snapshot_root("if true; then\nfor i in 1 2; do\n");
        assert_eq!(
            classify(&root),
            Classification::Incomplete {
                kind: StructureKind::For,
                expected: "done",
            }
        );
    }

    #[test]
    fn open_function_body_reports_incomplete() {
        // No function_definition node exists until the brace closes; the
        // partial text carries only ERROR nodes.
        let root = snapshot_root("greet() {\necho hello\n");
        assert_eq!(
            classify(&root),
            Classification::Incomplete {
                kind: StructureKind::Function,
                expected: "}",
            }
        );
        let closed = snapshot_root("greet() {\necho hello\n}\n");
        assert_eq!(classify(&closed), Classification::Complete);
    }

    #[test]
    fn malformed_input_is_a_syntax_error() {
        let root = snapshot_root("if then fi\n");
        assert!(matches!(classify(&root), Classification::SyntaxError { .. }));
    }

    #[test]
    fn classify_is_idempotent() {
        let root = snapshot_root("if true; then\n");
        assert_eq!(classify(&root), classify(&root));
    }

    #[test]
    fn node_counters() {
        let root = snapshot_root("if true; then\nwhile false; do :; done\nfi\n");
        assert_eq!(count_structural_nodes(&root), 2);
        assert_eq!(count_error_nodes(&root), 0);
    }
}
