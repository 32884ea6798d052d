//! Full-stack interpreter scenarios driven through a shell session, the way
//! the line loop would drive them.

use std::sync::Arc;

use rshell::events::{Event, EventBus, StreamKind, Topic};
use rshell::interp::ExecutionContext;
use rshell::session::{FeedOutcome, ShellSession};
use rshell::value::NativeValue;

fn session_with_bus() -> (ShellSession, std::sync::mpsc::Receiver<Event>) {
    let bus = Arc::new(EventBus::new());
    let rx = bus.subscribe(1, &[Topic::Output]);
    let session = ShellSession::new(1, Arc::clone(&bus), ExecutionContext::empty()).unwrap();
    (session, rx)
}

fn stdout_lines(rx: &std::sync::mpsc::Receiver<Event>) -> Vec<String> {
    rx.try_iter()
        .filter_map(|event| match event {
            Event::Output {
                stream: StreamKind::Stdout,
                text,
            } => Some(text),
            _ => None,
        })
        .collect()
}

#[test]
fn while_with_unset_counter_never_enters_body() {
    let (mut session, rx) = session_with_bus();
    let outcome = session
        .feed("while test $COUNT -lt 0; do echo tick; done\n")
        .unwrap();
    assert!(matches!(outcome, FeedOutcome::Executed { .. }));
    // The condition fails (unset operand is not an integer), so the body
    // never runs and the loop terminates immediately.
    assert!(stdout_lines(&rx).is_empty());
}

#[test]
fn until_loop_runs_while_condition_fails() {
    let (mut session, rx) = session_with_bus();
    session.feed("env N=0\n").unwrap();
    let outcome = session
        .feed("until test $N -ge 2; do echo $N; env N=2; done\n")
        .unwrap();
    // Inverted test: the body runs while the condition exits nonzero, and
    // the loop stops once it succeeds.
    assert_eq!(outcome, FeedOutcome::Executed { exit_code: 0 });
    assert_eq!(stdout_lines(&rx), vec!["0"]);
    assert_eq!(
        session.context().variables.get("N"),
        Some(&NativeValue::Integer(2))
    );
}

#[test]
fn env_literal_assignment_round_trips_natively() {
    let (mut session, rx) = session_with_bus();
    session.feed("env NUMS=[10,20,30]\n").unwrap();
    assert_eq!(
        session.context().variables.get("NUMS"),
        Some(&NativeValue::parse_literal("[10,20,30]"))
    );
    session.feed("for n in $NUMS; do echo $n; done\n").unwrap();
    assert_eq!(stdout_lines(&rx), vec!["10", "20", "30"]);
}

#[test]
fn map_subscripts_navigate_nested_values() {
    let (mut session, rx) = session_with_bus();
    session
        .feed("env 'M={\"rows\":[[1,2],[3,4]],\"name\":\"grid\"}'\n")
        .unwrap();
    session.feed("echo $M[\"name\"]\n").unwrap();
    session.feed("echo $M[\"rows\"][1][0]\n").unwrap();
    assert_eq!(stdout_lines(&rx), vec!["grid", "3"]);
}

#[test]
fn plain_expansion_of_map_renders_json() {
    let (mut session, rx) = session_with_bus();
    session.feed("env 'M={\"a\":1,\"b\":2}'\n").unwrap();
    session.feed("echo $M\n").unwrap();
    assert_eq!(stdout_lines(&rx), vec![r#"{"a":1,"b":2}"#]);
}

#[test]
fn plain_assignment_stays_text_while_env_parses_literals() {
    let (mut session, _rx) = session_with_bus();
    session.feed("N=42\n").unwrap();
    session.feed("env M=42\n").unwrap();
    session.feed("env FLAG=true\n").unwrap();
    let vars = &session.context().variables;
    // Only the env builtin is a native-literal entry point.
    assert_eq!(vars.get("N"), Some(&NativeValue::String("42".into())));
    assert_eq!(vars.get("M"), Some(&NativeValue::Integer(42)));
    assert_eq!(vars.get("FLAG"), Some(&NativeValue::Boolean(true)));
}

#[test]
fn undefined_variable_expands_to_empty_text() {
    let (mut session, rx) = session_with_bus();
    session.feed("echo [$MISSING]\n").unwrap();
    assert_eq!(stdout_lines(&rx), vec!["[]"]);
}

#[test]
fn conditionals_pick_first_matching_branch() {
    let (mut session, rx) = session_with_bus();
    session.feed("X=5\n").unwrap();
    session
        .feed("if test $X -gt 10; then\necho big\nelif test $X -gt 3; then\necho medium\nelse\necho small\nfi\n")
        .unwrap();
    assert_eq!(stdout_lines(&rx), vec!["medium"]);
}

#[test]
fn functions_run_with_the_calling_context() {
    let (mut session, rx) = session_with_bus();
    session
        .feed("greet() {\necho hello $WHO\n}\n")
        .unwrap();
    session.feed("WHO=world\n").unwrap();
    session.feed("greet\n").unwrap();
    assert_eq!(stdout_lines(&rx), vec!["hello world"]);
}

#[test]
fn and_or_lists_short_circuit_on_status() {
    let (mut session, rx) = session_with_bus();
    session.feed("true && echo ran\n").unwrap();
    session.feed("false && echo skipped\n").unwrap();
    session.feed("false || echo rescued\n").unwrap();
    assert_eq!(stdout_lines(&rx), vec!["ran", "rescued"]);
}

#[test]
fn case_matches_glob_patterns() {
    let (mut session, rx) = session_with_bus();
    session.feed("WORD=apple\n").unwrap();
    session
        .feed("case $WORD in\nb*) echo bee;;\na*) echo ay;;\n*) echo other;;\nesac\n")
        .unwrap();
    assert_eq!(stdout_lines(&rx), vec!["ay"]);
}
