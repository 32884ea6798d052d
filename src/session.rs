//! One interactive session: parse buffer, execution context, and the
//! bookkeeping that connects them.
//!
//! `feed` is the single entry point. Each call appends a fragment to the
//! incremental parse buffer, classifies the resulting tree, and when the
//! buffer holds complete commands, evaluates every top-level node that has
//! not run yet. The parse buffer accumulates across calls, so previously
//! executed nodes are tracked by index and skipped on later appends.

use std::sync::Arc;
use std::time::Instant;

use log::debug;

use crate::ast::{SourceInfo, TypedNode};
use crate::classify::{classify, Classification, StructureKind};
use crate::engine::{EngineError, ParseSession};
use crate::events::{Event, EventBus, LifecyclePhase, SessionId, StreamKind};
use crate::interp::{ExecutionContext, InterpreterRuntime};

/// What a `feed` call produced, for the caller driving the prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedOutcome {
    /// Input is syntactically valid but a structure is still open.
    Incomplete {
        kind: StructureKind,
        expected: &'static str,
    },
    /// Input could not parse; the buffer was reset and nothing ran.
    SyntaxError { info: SourceInfo },
    /// Every complete top-level node was evaluated.
    Executed { exit_code: i32 },
    /// The fragment parsed but added nothing new to run (blank lines,
    /// comments already executed).
    NoNewWork,
}

pub struct ShellSession {
    engine: ParseSession,
    context: ExecutionContext,
    runtime: InterpreterRuntime,
    bus: Arc<EventBus>,
    id: SessionId,
    /// Top-level nodes already evaluated in the current parse buffer.
    executed: usize,
    /// Monotonic counter across the life of the session, survives resets.
    sequence: u64,
}

impl ShellSession {
    pub fn new(
        id: SessionId,
        bus: Arc<EventBus>,
        context: ExecutionContext,
    ) -> Result<ShellSession, EngineError> {
        Ok(ShellSession {
            engine: ParseSession::new()?,
            runtime: InterpreterRuntime::new(Arc::clone(&bus), id),
            context,
            bus,
            id,
            executed: 0,
            sequence: 0,
        })
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Bytes of input currently held in the parse buffer.
    pub fn parse_buffer_len(&self) -> usize {
        self.engine.buffer_len()
    }

    /// Typed view of the current parse tree, if any input has been fed.
    pub fn current_tree(&self) -> Option<TypedNode> {
        self.engine.current_snapshot().map(|snapshot| snapshot.root)
    }

    /// Append one fragment (normally a full line including its newline),
    /// reparse, classify, and evaluate whatever became runnable.
    pub fn feed(&mut self, fragment: &str) -> Result<FeedOutcome, EngineError> {
        let snapshot = match self.engine.append(fragment) {
            Ok(snapshot) => snapshot,
            Err(err @ EngineError::BufferOverflow { .. }) => {
                debug!("session id={} event=overflow", self.id);
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        self.bus.publish(
            self.id,
            Event::ParseTree {
                root: snapshot.root.clone(),
                changed_ranges: snapshot.changed_ranges.clone(),
            },
        );

        match classify(&snapshot.root) {
            Classification::Incomplete { kind, expected } => {
                debug!(
                    "session id={} event=incomplete expected={expected}",
                    self.id
                );
                Ok(FeedOutcome::Incomplete { kind, expected })
            }
            Classification::SyntaxError { info } => {
                debug!(
                    "session id={} event=syntax_error at={}..{}",
                    self.id, info.start_byte, info.end_byte
                );
                self.bus.publish(
                    self.id,
                    Event::Output {
                        stream: StreamKind::Stderr,
                        text: format!(
                            "syntax error near byte {}: {:?}",
                            info.start_byte, info.text
                        ),
                    },
                );
                self.reset();
                Ok(FeedOutcome::SyntaxError { info })
            }
            Classification::Complete => {
                let pending: Vec<_> = snapshot
                    .root
                    .top_level()
                    .iter()
                    .skip(self.executed)
                    .cloned()
                    .collect();
                if pending.is_empty() {
                    return Ok(FeedOutcome::NoNewWork);
                }
                let mut exit_code = self.context.exit_code;
                for node in &pending {
                    exit_code = self.run_node(node);
                    self.executed += 1;
                }
                Ok(FeedOutcome::Executed { exit_code })
            }
        }
    }

    /// Discard the parse buffer and executed-node bookkeeping. The
    /// execution context survives; only the input stream starts over.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.executed = 0;
    }

    fn run_node(&mut self, node: &TypedNode) -> i32 {
        self.sequence += 1;
        self.bus.publish(
            self.id,
            Event::ExecutableNode {
                node: node.clone(),
                sequence: self.sequence,
            },
        );
        self.bus.publish(
            self.id,
            Event::RuntimeLifecycle {
                phase: LifecyclePhase::Started,
            },
        );
        let started = Instant::now();
        match self.runtime.evaluate(node, self.context.clone()) {
            Ok(evaluation) => {
                self.context = evaluation.context;
                self.bus.publish(
                    self.id,
                    Event::RuntimeLifecycle {
                        phase: LifecyclePhase::Completed {
                            exit_code: evaluation.exit_code,
                            duration_micros: started.elapsed().as_micros(),
                        },
                    },
                );
                evaluation.exit_code
            }
            Err(err) => {
                debug!("session id={} event=eval_error error={err}", self.id);
                self.bus.publish(
                    self.id,
                    Event::Output {
                        stream: StreamKind::Stderr,
                        text: format!("rshell: {err}"),
                    },
                );
                self.bus.publish(
                    self.id,
                    Event::RuntimeLifecycle {
                        phase: LifecyclePhase::Failed {
                            error_kind: err.to_string(),
                        },
                    },
                );
                // A failed node leaves the context and exit code as they
                // were before it ran.
                self.context.exit_code
            }
        }
    }
}
