//! Interactive shell front-end built on incremental tree-sitter parsing.
//!
//! Input flows through four stages: the continuation detector decides when a
//! chunk of lines is worth parsing, the incremental engine appends it to a
//! session-long buffer and reparses, the classifier labels the resulting
//! tree (complete, incomplete, or syntax error), and the interpreter
//! evaluates complete top-level nodes against an immutable execution
//! context. Everything observable — parse trees, lifecycle, output, context
//! changes — travels over the event bus.

pub mod ast;
pub mod builtins;
pub mod classify;
pub mod continuation;
pub mod engine;
pub mod events;
pub mod exec;
pub mod interp;
pub mod repl;
pub mod session;
pub mod value;

pub use ast::TypedNode;
pub use classify::{classify, Classification};
pub use continuation::{continuation_kind, ready, ContinuationKind};
pub use engine::{EngineError, ParseSession, TreeSnapshot};
pub use events::{Event, EventBus, SessionId, Topic};
pub use interp::{ExecutionContext, InterpreterRuntime};
pub use session::{FeedOutcome, ShellSession};
pub use value::NativeValue;
