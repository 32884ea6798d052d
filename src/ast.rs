//! Typed syntax tree built from tree-sitter's generic nodes.
//!
//! `TypedNode::build` converts a `tree_sitter::Node` into a closed set of
//! variants the classifier and interpreter can match exhaustively. Named
//! grammar fields become named fields; remaining named children become an
//! ordered child list. The conversion is total: grammar kinds without a
//! dedicated variant land in `Error` carrying the original kind string, with
//! `syntax` left false so they are not mistaken for real ERROR nodes.
//!
//! Building is deterministic and side-effect-free; two calls on structurally
//! identical generic nodes yield structurally equal values, which the engine
//! relies on when diffing by changed range.

use tree_sitter::Node;

/// Row/column position, zero-based, as reported by tree-sitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

/// Source extent and literal text of a node.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub start_byte: usize,
    pub end_byte: usize,
    pub start: Point,
    pub end: Point,
    pub text: String,
}

impl SourceInfo {
    fn from_node(node: Node, source: &str) -> SourceInfo {
        let start = node.start_position();
        let end = node.end_position();
        SourceInfo {
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start: Point {
                row: start.row,
                column: start.column,
            },
            end: Point {
                row: end.row,
                column: end.column,
            },
            text: node.utf8_text(source.as_bytes()).unwrap_or("").to_string(),
        }
    }
}

/// Immutable typed syntax node.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedNode {
    Program {
        info: SourceInfo,
        children: Vec<TypedNode>,
    },
    Command {
        info: SourceInfo,
        name: Option<Box<TypedNode>>,
        args: Vec<TypedNode>,
    },
    Pipeline {
        info: SourceInfo,
        children: Vec<TypedNode>,
    },
    /// `a && b` / `a || b` chains.
    List {
        info: SourceInfo,
        children: Vec<TypedNode>,
    },
    IfStatement {
        info: SourceInfo,
        condition: Vec<TypedNode>,
        body: Vec<TypedNode>,
        elif_branches: Vec<TypedNode>,
        else_branch: Option<Box<TypedNode>>,
    },
    ElifClause {
        info: SourceInfo,
        condition: Vec<TypedNode>,
        body: Vec<TypedNode>,
    },
    ElseClause {
        info: SourceInfo,
        body: Vec<TypedNode>,
    },
    ForStatement {
        info: SourceInfo,
        variable: String,
        values: Vec<TypedNode>,
        body: Vec<TypedNode>,
    },
    WhileStatement {
        info: SourceInfo,
        /// `until` inverts the condition test.
        until: bool,
        condition: Vec<TypedNode>,
        body: Vec<TypedNode>,
    },
    CaseStatement {
        info: SourceInfo,
        value: Option<Box<TypedNode>>,
        items: Vec<TypedNode>,
    },
    CaseItem {
        info: SourceInfo,
        patterns: Vec<TypedNode>,
        body: Vec<TypedNode>,
    },
    FunctionDefinition {
        info: SourceInfo,
        name: String,
        body: Vec<TypedNode>,
    },
    VariableAssignment {
        info: SourceInfo,
        name: String,
        value: Option<Box<TypedNode>>,
    },
    /// `${NAME...}` form.
    Expansion {
        info: SourceInfo,
        variable: Option<String>,
        children: Vec<TypedNode>,
    },
    /// `$NAME` form.
    SimpleExpansion {
        info: SourceInfo,
        variable: String,
    },
    CommandSubstitution {
        info: SourceInfo,
        children: Vec<TypedNode>,
    },
    /// Double-quoted string; children are the interpolated parts.
    StringLiteral {
        info: SourceInfo,
        children: Vec<TypedNode>,
    },
    /// Single-quoted string, taken verbatim.
    RawString {
        info: SourceInfo,
    },
    Word {
        info: SourceInfo,
    },
    Number {
        info: SourceInfo,
    },
    Concatenation {
        info: SourceInfo,
        children: Vec<TypedNode>,
    },
    Comment {
        info: SourceInfo,
    },
    /// Real ERROR/MISSING nodes (`syntax == true`) and grammar kinds without
    /// a dedicated variant (`syntax == false`, original kind preserved).
    Error {
        info: SourceInfo,
        kind: String,
        syntax: bool,
        children: Vec<TypedNode>,
    },
}

impl TypedNode {
    /// Convert a generic tree-sitter node into a typed node.
    pub fn build(node: Node, source: &str) -> TypedNode {
        let info = SourceInfo::from_node(node, source);
        if node.is_error() || node.is_missing() {
            return TypedNode::Error {
                info,
                kind: node.kind().to_string(),
                syntax: true,
                children: build_children(node, source),
            };
        }
        match node.kind() {
            "program" => TypedNode::Program {
                info,
                children: build_children(node, source),
            },
            "command" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| command_name_node(n, source))
                    .map(Box::new);
                let args = build_field_all(node, "argument", source);
                TypedNode::Command { info, name, args }
            }
            "pipeline" => TypedNode::Pipeline {
                info,
                children: build_children(node, source),
            },
            "list" => TypedNode::List {
                info,
                children: build_children(node, source),
            },
            "if_statement" => {
                let condition = build_field_all(node, "condition", source);
                let mut body = Vec::new();
                let mut elif_branches = Vec::new();
                let mut else_branch = None;
                for (field, child) in named_children(node) {
                    if field == Some("condition") {
                        continue;
                    }
                    match child.kind() {
                        "elif_clause" => elif_branches.push(TypedNode::build(child, source)),
                        "else_clause" => {
                            else_branch = Some(Box::new(TypedNode::build(child, source)))
                        }
                        _ => body.push(TypedNode::build(child, source)),
                    }
                }
                TypedNode::IfStatement {
                    info,
                    condition,
                    body,
                    elif_branches,
                    else_branch,
                }
            }
            "elif_clause" => TypedNode::ElifClause {
                condition: build_field_all(node, "condition", source),
                body: non_field_children(node, &["condition"], source),
                info,
            },
            "else_clause" => TypedNode::ElseClause {
                info,
                body: build_children(node, source),
            },
            "for_statement" => TypedNode::ForStatement {
                variable: field_text(node, "variable", source),
                values: build_field_all(node, "value", source),
                body: body_statements(node, source),
                info,
            },
            "while_statement" | "until_statement" => TypedNode::WhileStatement {
                until: node.kind() == "until_statement"
                    || info.text.trim_start().starts_with("until"),
                condition: build_field_all(node, "condition", source),
                body: body_statements(node, source),
                info,
            },
            "case_statement" => TypedNode::CaseStatement {
                value: node
                    .child_by_field_name("value")
                    .map(|n| Box::new(TypedNode::build(n, source))),
                items: named_children(node)
                    .into_iter()
                    .filter(|(_, c)| c.kind() == "case_item")
                    .map(|(_, c)| TypedNode::build(c, source))
                    .collect(),
                info,
            },
            "case_item" => TypedNode::CaseItem {
                patterns: build_field_all(node, "value", source),
                body: non_field_children(node, &["value"], source),
                info,
            },
            "function_definition" => TypedNode::FunctionDefinition {
                name: field_text(node, "name", source),
                body: node
                    .child_by_field_name("body")
                    .map(|b| build_children(b, source))
                    .unwrap_or_default(),
                info,
            },
            "variable_assignment" => TypedNode::VariableAssignment {
                name: field_text(node, "name", source),
                value: node
                    .child_by_field_name("value")
                    .map(|n| Box::new(TypedNode::build(n, source))),
                info,
            },
            "expansion" => TypedNode::Expansion {
                variable: first_variable_name(node, source),
                children: build_children(node, source),
                info,
            },
            "simple_expansion" => TypedNode::SimpleExpansion {
                variable: first_variable_name(node, source)
                    .unwrap_or_else(|| info.text.trim_start_matches('$').to_string()),
                info,
            },
            "command_substitution" => TypedNode::CommandSubstitution {
                info,
                children: build_children(node, source),
            },
            "string" => TypedNode::StringLiteral {
                info,
                children: build_children(node, source),
            },
            "raw_string" => TypedNode::RawString { info },
            "word" | "command_name" | "variable_name" | "string_content" => {
                TypedNode::Word { info }
            }
            "number" => TypedNode::Number { info },
            "concatenation" => TypedNode::Concatenation {
                info,
                children: build_children(node, source),
            },
            "comment" => TypedNode::Comment { info },
            other => TypedNode::Error {
                info,
                kind: other.to_string(),
                syntax: false,
                children: build_children(node, source),
            },
        }
    }

    pub fn info(&self) -> &SourceInfo {
        match self {
            TypedNode::Program { info, .. }
            | TypedNode::Command { info, .. }
            | TypedNode::Pipeline { info, .. }
            | TypedNode::List { info, .. }
            | TypedNode::IfStatement { info, .. }
            | TypedNode::ElifClause { info, .. }
            | TypedNode::ElseClause { info, .. }
            | TypedNode::ForStatement { info, .. }
            | TypedNode::WhileStatement { info, .. }
            | TypedNode::CaseStatement { info, .. }
            | TypedNode::CaseItem { info, .. }
            | TypedNode::FunctionDefinition { info, .. }
            | TypedNode::VariableAssignment { info, .. }
            | TypedNode::Expansion { info, .. }
            | TypedNode::SimpleExpansion { info, .. }
            | TypedNode::CommandSubstitution { info, .. }
            | TypedNode::StringLiteral { info, .. }
            | TypedNode::RawString { info }
            | TypedNode::Word { info }
            | TypedNode::Number { info }
            | TypedNode::Concatenation { info, .. }
            | TypedNode::Comment { info }
            | TypedNode::Error { info, .. } => info,
        }
    }

    /// Human-readable variant name for diagnostics and failure events.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypedNode::Program { .. } => "program",
            TypedNode::Command { .. } => "command",
            TypedNode::Pipeline { .. } => "pipeline",
            TypedNode::List { .. } => "list",
            TypedNode::IfStatement { .. } => "if_statement",
            TypedNode::ElifClause { .. } => "elif_clause",
            TypedNode::ElseClause { .. } => "else_clause",
            TypedNode::ForStatement { .. } => "for_statement",
            TypedNode::WhileStatement { .. } => "while_statement",
            TypedNode::CaseStatement { .. } => "case_statement",
            TypedNode::CaseItem { .. } => "case_item",
            TypedNode::FunctionDefinition { .. } => "function_definition",
            TypedNode::VariableAssignment { .. } => "variable_assignment",
            TypedNode::Expansion { .. } => "expansion",
            TypedNode::SimpleExpansion { .. } => "simple_expansion",
            TypedNode::CommandSubstitution { .. } => "command_substitution",
            TypedNode::StringLiteral { .. } => "string",
            TypedNode::RawString { .. } => "raw_string",
            TypedNode::Word { .. } => "word",
            TypedNode::Number { .. } => "number",
            TypedNode::Concatenation { .. } => "concatenation",
            TypedNode::Comment { .. } => "comment",
            TypedNode::Error { .. } => "error",
        }
    }

    /// Every nested node, fields and child lists alike, in source order of
    /// declaration. The classifier recurses through this.
    pub fn child_nodes(&self) -> Vec<&TypedNode> {
        match self {
            TypedNode::Program { children, .. }
            | TypedNode::Pipeline { children, .. }
            | TypedNode::List { children, .. }
            | TypedNode::CommandSubstitution { children, .. }
            | TypedNode::StringLiteral { children, .. }
            | TypedNode::Concatenation { children, .. }
            | TypedNode::Expansion { children, .. }
            | TypedNode::Error { children, .. } => children.iter().collect(),
            TypedNode::Command { name, args, .. } => name
                .iter()
                .map(Box::as_ref)
                .chain(args.iter())
                .collect(),
            TypedNode::IfStatement {
                condition,
                body,
                elif_branches,
                else_branch,
                ..
            } => condition
                .iter()
                .chain(body.iter())
                .chain(elif_branches.iter())
                .chain(else_branch.iter().map(Box::as_ref))
                .collect(),
            TypedNode::ElifClause {
                condition, body, ..
            } => condition.iter().chain(body.iter()).collect(),
            TypedNode::ElseClause { body, .. } => body.iter().collect(),
            TypedNode::ForStatement { values, body, .. } => {
                values.iter().chain(body.iter()).collect()
            }
            TypedNode::WhileStatement {
                condition, body, ..
            } => condition.iter().chain(body.iter()).collect(),
            TypedNode::CaseStatement { value, items, .. } => value
                .iter()
                .map(Box::as_ref)
                .chain(items.iter())
                .collect(),
            TypedNode::CaseItem { patterns, body, .. } => {
                patterns.iter().chain(body.iter()).collect()
            }
            TypedNode::FunctionDefinition { body, .. } => body.iter().collect(),
            TypedNode::VariableAssignment { value, .. } => {
                value.iter().map(Box::as_ref).collect()
            }
            TypedNode::SimpleExpansion { .. }
            | TypedNode::RawString { .. }
            | TypedNode::Word { .. }
            | TypedNode::Number { .. }
            | TypedNode::Comment { .. } => Vec::new(),
        }
    }

    /// Top-level statements of a `Program` root, in source order.
    pub fn top_level(&self) -> &[TypedNode] {
        match self {
            TypedNode::Program { children, .. } => children,
            _ => std::slice::from_ref(self),
        }
    }
}

/// Named children paired with their grammar field name, in tree order.
fn named_children<'tree>(node: Node<'tree>) -> Vec<(Option<&'static str>, Node<'tree>)> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    if cursor.goto_first_child() {
        loop {
            let child = cursor.node();
            if child.is_named() {
                out.push((cursor.field_name(), child));
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
    out
}

fn build_children(node: Node, source: &str) -> Vec<TypedNode> {
    named_children(node)
        .into_iter()
        .map(|(_, c)| TypedNode::build(c, source))
        .collect()
}

fn build_field_all(node: Node, field: &str, source: &str) -> Vec<TypedNode> {
    let mut cursor = node.walk();
    let nodes: Vec<TypedNode> = node
        .children_by_field_name(field, &mut cursor)
        .filter(|c| c.is_named())
        .map(|c| TypedNode::build(c, source))
        .collect();
    nodes
}

/// Named children that do not belong to any of the given fields.
fn non_field_children(node: Node, excluded: &[&str], source: &str) -> Vec<TypedNode> {
    named_children(node)
        .into_iter()
        .filter(|(field, _)| !matches!(field, Some(f) if excluded.contains(f)))
        .map(|(_, c)| TypedNode::build(c, source))
        .collect()
}

/// Statements inside a loop body, unwrapping the `do_group`.
fn body_statements(node: Node, source: &str) -> Vec<TypedNode> {
    match node.child_by_field_name("body") {
        Some(body) if body.kind() == "do_group" => build_children(body, source),
        Some(body) => vec![TypedNode::build(body, source)],
        None => Vec::new(),
    }
}

fn field_text(node: Node, field: &str, source: &str) -> String {
    node.child_by_field_name(field)
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .unwrap_or("")
        .to_string()
}

fn first_variable_name(node: Node, source: &str) -> Option<String> {
    named_children(node)
        .into_iter()
        .find(|(_, c)| c.kind() == "variable_name")
        .and_then(|(_, c)| c.utf8_text(source.as_bytes()).ok())
        .map(ToString::to_string)
}

/// `command_name` wraps the actual word/expansion; unwrap it so command name
/// resolution can evaluate expansions directly.
fn command_name_node(node: Node, source: &str) -> TypedNode {
    if node.kind() == "command_name" {
        if let Some((_, inner)) = named_children(node).into_iter().next() {
            return TypedNode::build(inner, source);
        }
    }
    TypedNode::build(node, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::Parser;

    fn parse(source: &str) -> tree_sitter::Tree {
        let mut parser = Parser::new();
        parser.set_language(tree_sitter_bash::language()).unwrap();
        parser.parse(source, None).unwrap()
    }

    #[test]
    fn commands_keep_name_and_args() {
        let source = "echo one two\n";
        let tree = parse(source);
        let root = TypedNode::build(tree.root_node(), source);
        let TypedNode::Program { children, .. } = &root else {
            panic!("expected program root");
        };
        let TypedNode::Command { name, args, .. } = &children[0] else {
            panic!("expected command, got {:?}", children[0]);
        };
        assert_eq!(name.as_ref().unwrap().info().text, "echo");
        let arg_texts: Vec<&str> = args.iter().map(|a| a.info().text.as_str()).collect();
        assert_eq!(arg_texts, vec!["one", "two"]);
    }

    #[test]
    fn if_statement_fields() {
        let source = "if true; then\necho a\nelif false; then\necho b\nelse\necho c\nfi\n";
        let tree = parse(source);
        let root = TypedNode::build(tree.root_node(), source);
        let TypedNode::IfStatement {
            condition,
            body,
            elif_branches,
            else_branch,
            ..
        } = &root.top_level()[0]
        else {
            panic!("expected if statement");
        };
        assert_eq!(condition.len(), 1);
        assert_eq!(body.len(), 1);
        assert_eq!(elif_branches.len(), 1);
        assert!(else_branch.is_some());
    }

    #[test]
    fn for_statement_fields() {
        let source = "for i in 1 2 3; do echo $i; done\n";
        let tree = parse(source);
        let root = TypedNode::build(tree.root_node(), source);
        let TypedNode::ForStatement {
            variable,
            values,
            body,
            ..
        } = &root.top_level()[0]
        else {
            panic!("expected for statement");
        };
        assert_eq!(variable, "i");
        assert_eq!(values.len(), 3);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn build_is_deterministic() {
        let source = "for i in $A; do echo \"$i\"; done\n";
        let tree = parse(source);
        let first = TypedNode::build(tree.root_node(), source);
        let second = TypedNode::build(tree.root_node(), source);
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_kinds_become_error_variant_without_syntax_flag() {
        let source = "echo hi > out.txt\n";
        let tree = parse(source);
        let root = TypedNode::build(tree.root_node(), source);
        // redirected_statement has no dedicated variant.
        let TypedNode::Error { kind, syntax, .. } = &root.top_level()[0] else {
            panic!("expected error variant, got {:?}", root.top_level()[0]);
        };
        assert_eq!(kind, "redirected_statement");
        assert!(!syntax);
    }
}
