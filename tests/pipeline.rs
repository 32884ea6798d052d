//! End-to-end checks of the parse pipeline: continuation detection,
//! incremental appends, and classification, line by line as a user would
//! type.

use rshell::classify::{classify, Classification, StructureKind};
use rshell::continuation::{continuation_kind, ready, ContinuationKind};
use rshell::engine::ParseSession;

#[test]
fn multiline_if_classifies_incomplete_until_fi() {
    let mut session = ParseSession::new().unwrap();

    let snapshot = session.append("if true; then\n").unwrap();
    assert_eq!(
        classify(&snapshot.root),
        Classification::Incomplete {
            kind: StructureKind::If,
            expected: "fi",
        }
    );

    let snapshot = session.append("echo hello\n").unwrap();
    assert_eq!(
        classify(&snapshot.root),
        Classification::Incomplete {
            kind: StructureKind::If,
            expected: "fi",
        }
    );

    let snapshot = session.append("fi\n").unwrap();
    assert_eq!(classify(&snapshot.root), Classification::Complete);
    assert!(!snapshot.has_errors);
}

#[test]
fn malformed_input_classifies_as_syntax_error() {
    let mut session = ParseSession::new().unwrap();
    let snapshot = session.append("if then fi\n").unwrap();
    assert!(snapshot.has_errors);
    assert!(matches!(
        classify(&snapshot.root),
        Classification::SyntaxError { .. }
    ));
}

#[test]
fn continuation_detector_holds_back_unready_lines() {
    // What the line editor would see while a user types a loop.
    assert!(!ready("for i in 1 2 3; do\n"));
    assert!(!ready("for i in 1 2 3; do\necho $i\n"));
    assert!(ready("for i in 1 2 3; do\necho $i\ndone\n"));

    assert_eq!(
        continuation_kind("echo \"open\n"),
        ContinuationKind::QuoteContinuation
    );
    assert_eq!(
        continuation_kind("cat <<EOF\nline\n"),
        ContinuationKind::HeredocContinuation
    );
    assert_eq!(continuation_kind("echo done\n"), ContinuationKind::Complete);
}

#[test]
fn changed_nodes_cover_only_the_appended_command() {
    let mut session = ParseSession::new().unwrap();
    session.append("echo one\n").unwrap();
    let snapshot = session.append("echo two\n").unwrap();
    assert!(!snapshot.changed_nodes.is_empty());
    for node in &snapshot.changed_nodes {
        // Nothing from the first command should be reported as changed.
        assert!(node.info().start_byte >= "echo one".len());
    }
}

#[test]
fn buffer_overflow_rejects_without_partial_append() {
    let mut session = ParseSession::with_max_buffer(16).unwrap();
    session.append("echo hi\n").unwrap();
    let before = session.accumulated().to_string();
    let err = session.append("echo something longer\n").unwrap_err();
    assert!(matches!(
        err,
        rshell::engine::EngineError::BufferOverflow { .. }
    ));
    // The fragment must not be half-applied.
    assert_eq!(session.accumulated(), before);

    session.reset();
    assert_eq!(session.buffer_len(), 0);
    let snapshot = session.append("echo ok\n").unwrap();
    assert_eq!(classify(&snapshot.root), Classification::Complete);
}

#[test]
fn reset_discards_tree_and_buffer() {
    let mut session = ParseSession::new().unwrap();
    session.append("if true; then\n").unwrap();
    session.reset();
    assert!(session.current_snapshot().is_none());
    let snapshot = session.append("echo fresh\n").unwrap();
    assert_eq!(classify(&snapshot.root), Classification::Complete);
}
