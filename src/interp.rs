//! Interpretation runtime.
//!
//! A context-threaded, recursive evaluator over typed syntax nodes. The
//! runtime holds exactly one current context between evaluation steps;
//! every step returns a fresh `ExecutionContext` rather than mutating in
//! place, and the session serializes top-level evaluations, so there is no
//! overlapping evaluation within a session.

pub mod expand;

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use log::debug;

use crate::ast::{SourceInfo, TypedNode};
use crate::builtins::{BuiltinOutcome, BuiltinRegistry};
use crate::events::{ContextChange, Event, EventBus, SessionId, StreamKind};
use crate::exec::{run_external, status_from_error};
use crate::interp::expand::{eval_word, eval_word_text};
use crate::value::NativeValue;

/// Per-session execution state, replaced wholesale after each evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub variables: HashMap<String, NativeValue>,
    pub cwd: PathBuf,
    pub exit_code: i32,
    pub command_count: u64,
    pub last_stdout: String,
    pub last_stderr: String,
}

impl ExecutionContext {
    /// Context seeded from the process environment.
    pub fn inherit() -> ExecutionContext {
        let variables = env::vars()
            .map(|(k, v)| (k, NativeValue::String(v)))
            .collect();
        ExecutionContext {
            variables,
            cwd: env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            exit_code: 0,
            command_count: 0,
            last_stdout: String::new(),
            last_stderr: String::new(),
        }
    }

    /// Context with no inherited environment, for tests and embedding.
    pub fn empty() -> ExecutionContext {
        ExecutionContext {
            variables: HashMap::new(),
            cwd: env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            exit_code: 0,
            command_count: 0,
            last_stdout: String::new(),
            last_stderr: String::new(),
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: NativeValue) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// Outcome of evaluating one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub context: ExecutionContext,
    pub exit_code: i32,
}

#[derive(Debug)]
pub enum EvalError {
    /// The node variant is recognized but has no interpreter rule yet.
    /// Callers turn this into a failure event; it must never crash the
    /// owning process.
    NotImplemented { kind: &'static str },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EvalError::NotImplemented { kind } => {
                write!(f, "evaluation not implemented for {kind} nodes")
            }
        }
    }
}

impl std::error::Error for EvalError {}

pub struct InterpreterRuntime {
    bus: Arc<EventBus>,
    session: SessionId,
    builtins: BuiltinRegistry,
    functions: HashMap<String, Vec<TypedNode>>,
}

impl InterpreterRuntime {
    pub fn new(bus: Arc<EventBus>, session: SessionId) -> InterpreterRuntime {
        InterpreterRuntime {
            bus,
            session,
            builtins: BuiltinRegistry::with_defaults(),
            functions: HashMap::new(),
        }
    }

    /// Evaluate one node, threading the context through.
    pub fn evaluate(
        &mut self,
        node: &TypedNode,
        ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        match node {
            TypedNode::Program { children, .. } => self.eval_sequence(children, ctx),
            TypedNode::Command { .. } => {
                let (evaluation, _stdout) = self.eval_command(node, ctx, None, true)?;
                Ok(evaluation)
            }
            TypedNode::Pipeline { children, .. } => self.eval_pipeline(children, ctx),
            TypedNode::List { children, info } => self.eval_list(children, info, ctx),
            TypedNode::IfStatement {
                condition,
                body,
                elif_branches,
                else_branch,
                ..
            } => self.eval_if(condition, body, elif_branches, else_branch.as_deref(), ctx),
            TypedNode::ForStatement {
                variable,
                values,
                body,
                ..
            } => self.eval_for(variable, values, body, ctx),
            TypedNode::WhileStatement {
                until,
                condition,
                body,
                ..
            } => self.eval_while(*until, condition, body, ctx),
            TypedNode::CaseStatement { value, items, .. } => {
                self.eval_case(value.as_deref(), items, ctx)
            }
            TypedNode::FunctionDefinition { name, body, .. } => {
                debug!("eval event=define_function name={name}");
                self.functions.insert(name.clone(), body.clone());
                Ok(Evaluation {
                    context: ctx,
                    exit_code: 0,
                })
            }
            TypedNode::VariableAssignment { name, value, .. } => {
                let assigned = value
                    .as_deref()
                    .map(|v| eval_word(v, &ctx))
                    .unwrap_or_else(|| NativeValue::String(String::new()));
                self.bus.publish(
                    self.session,
                    Event::ContextChange(ContextChange::VariableSet {
                        name: name.clone(),
                        value: assigned.clone(),
                    }),
                );
                Ok(Evaluation {
                    context: ctx.with_variable(name.clone(), assigned),
                    exit_code: 0,
                })
            }
            TypedNode::Comment { .. } => Ok(Evaluation {
                context: ctx,
                exit_code: 0,
            }),
            other => Err(EvalError::NotImplemented {
                kind: other.kind_name(),
            }),
        }
    }

    fn eval_sequence(
        &mut self,
        nodes: &[TypedNode],
        mut ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        let mut exit_code = ctx.exit_code;
        for node in nodes {
            let evaluation = self.evaluate(node, ctx)?;
            ctx = evaluation.context;
            exit_code = evaluation.exit_code;
        }
        Ok(Evaluation { context: ctx, exit_code })
    }

    /// `a && b || c` chains: the operator between two commands is recovered
    /// from the source text between their extents.
    fn eval_list(
        &mut self,
        children: &[TypedNode],
        info: &SourceInfo,
        ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        let Some((first, rest)) = children.split_first() else {
            return Ok(Evaluation {
                context: ctx,
                exit_code: 0,
            });
        };
        let list_text = &info.text;
        let list_start = info.start_byte;
        let mut evaluation = self.evaluate(first, ctx)?;
        let mut prev_end = first.info().end_byte;
        for child in rest {
            let gap_start = prev_end.saturating_sub(list_start).min(list_text.len());
            let gap_end = child
                .info()
                .start_byte
                .saturating_sub(list_start)
                .min(list_text.len());
            let gap = &list_text[gap_start..gap_end];
            let should_run = if gap.contains("||") {
                evaluation.exit_code != 0
            } else if gap.contains("&&") {
                evaluation.exit_code == 0
            } else {
                true
            };
            prev_end = child.info().end_byte;
            if should_run {
                evaluation = self.evaluate(child, evaluation.context)?;
            }
        }
        Ok(evaluation)
    }

    fn eval_pipeline(
        &mut self,
        stages: &[TypedNode],
        mut ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        let mut stdin: Option<String> = None;
        let mut exit_code = 0;
        for (idx, stage) in stages.iter().enumerate() {
            let last = idx + 1 == stages.len();
            let (evaluation, stdout) = self.eval_command(stage, ctx, stdin.take(), last)?;
            ctx = evaluation.context;
            exit_code = evaluation.exit_code;
            if !last {
                stdin = Some(stdout);
            }
        }
        Ok(Evaluation { context: ctx, exit_code })
    }

    fn eval_if(
        &mut self,
        condition: &[TypedNode],
        body: &[TypedNode],
        elif_branches: &[TypedNode],
        else_branch: Option<&TypedNode>,
        ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        let condition_eval = self.eval_sequence(condition, ctx)?;
        if condition_eval.exit_code == 0 {
            return self.eval_sequence(body, condition_eval.context);
        }
        let mut ctx = condition_eval.context;
        for branch in elif_branches {
            let TypedNode::ElifClause {
                condition, body, ..
            } = branch
            else {
                continue;
            };
            let branch_eval = self.eval_sequence(condition, ctx)?;
            // First matching elif wins; no fallthrough.
            if branch_eval.exit_code == 0 {
                return self.eval_sequence(body, branch_eval.context);
            }
            ctx = branch_eval.context;
        }
        if let Some(TypedNode::ElseClause { body, .. }) = else_branch {
            return self.eval_sequence(body, ctx);
        }
        let exit_code = ctx.exit_code;
        Ok(Evaluation { context: ctx, exit_code })
    }

    fn eval_for(
        &mut self,
        variable: &str,
        values: &[TypedNode],
        body: &[TypedNode],
        mut ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        let loop_values = extract_loop_values(values, &ctx);
        debug!(
            "eval event=for variable={} iterations={}",
            variable,
            loop_values.len()
        );
        let mut exit_code = ctx.exit_code;
        for value in loop_values {
            // The loop variable is bound natively and keeps its last value
            // after the loop ends.
            ctx = ctx.with_variable(variable.to_string(), value);
            let evaluation = self.eval_sequence(body, ctx)?;
            ctx = evaluation.context;
            exit_code = evaluation.exit_code;
        }
        Ok(Evaluation { context: ctx, exit_code })
    }

    fn eval_while(
        &mut self,
        until: bool,
        condition: &[TypedNode],
        body: &[TypedNode],
        mut ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        // No iteration cap: an always-true condition loops forever, matching
        // shell semantics. Timeouts belong to the calling collaborator.
        loop {
            let condition_eval = self.eval_sequence(condition, ctx)?;
            let holds = (condition_eval.exit_code == 0) != until;
            ctx = condition_eval.context;
            if !holds {
                let exit_code = condition_eval.exit_code;
                return Ok(Evaluation { context: ctx, exit_code });
            }
            let body_eval = self.eval_sequence(body, ctx)?;
            ctx = body_eval.context;
        }
    }

    fn eval_case(
        &mut self,
        value: Option<&TypedNode>,
        items: &[TypedNode],
        ctx: ExecutionContext,
    ) -> Result<Evaluation, EvalError> {
        let subject = value
            .map(|v| eval_word_text(v, &ctx))
            .unwrap_or_default();
        for item in items {
            let TypedNode::CaseItem { patterns, body, .. } = item else {
                continue;
            };
            let matched = patterns
                .iter()
                .any(|p| glob_match(&eval_word_text(p, &ctx), &subject));
            if matched {
                return self.eval_sequence(body, ctx);
            }
        }
        let exit_code = ctx.exit_code;
        Ok(Evaluation { context: ctx, exit_code })
    }

    /// Evaluate a command node: expand the name with the current context,
    /// then dispatch to a function, a registered builtin, or the external
    /// executor. Returns the evaluation and the captured stdout so pipeline
    /// stages can feed the next stage.
    fn eval_command(
        &mut self,
        node: &TypedNode,
        ctx: ExecutionContext,
        stdin: Option<String>,
        publish: bool,
    ) -> Result<(Evaluation, String), EvalError> {
        let TypedNode::Command { name, args, .. } = node else {
            // Pipeline stages can be any statement; fall back to plain
            // evaluation with no stdout capture.
            let evaluation = self.evaluate(node, ctx)?;
            return Ok((evaluation, String::new()));
        };
        let Some(name_node) = name else {
            return Ok((
                Evaluation {
                    context: ctx,
                    exit_code: 0,
                },
                String::new(),
            ));
        };
        let command = eval_word_text(name_node, &ctx);
        let arg_texts: Vec<String> = args.iter().map(|a| eval_word_text(a, &ctx)).collect();
        debug!("eval event=command name={command} args={}", arg_texts.len());

        if let Some(body) = self.functions.get(&command).cloned() {
            let evaluation = self.eval_sequence(&body, ctx)?;
            return Ok((evaluation, String::new()));
        }

        if self.builtins.is_builtin(&command) {
            if let Some(outcome) =
                self.builtins
                    .invoke(&command, &arg_texts, stdin.as_deref(), &ctx)
            {
                return Ok(self.finish_builtin(ctx, outcome, publish));
            }
            // Registry miss after a positive lookup; fall through to the
            // external path instead of asserting.
            debug!("eval event=builtin_miss name={command}");
        }

        let evaluation =
            self.run_external_command(&command, &arg_texts, stdin.as_deref(), ctx, publish);
        Ok(evaluation)
    }

    fn finish_builtin(
        &mut self,
        old_ctx: ExecutionContext,
        outcome: BuiltinOutcome,
        publish: bool,
    ) -> (Evaluation, String) {
        let mut context = outcome.context;
        let mut stdout_text = String::new();
        let mut stderr_text = String::new();
        // Streams are lazy and single-consumer; each element becomes one
        // output event, in order.
        for item in outcome.stdout {
            if publish {
                self.publish_output(StreamKind::Stdout, &item);
            }
            if !stdout_text.is_empty() {
                stdout_text.push('\n');
            }
            stdout_text.push_str(&item);
        }
        for item in outcome.stderr {
            if publish {
                self.publish_output(StreamKind::Stderr, &item);
            }
            if !stderr_text.is_empty() {
                stderr_text.push('\n');
            }
            stderr_text.push_str(&item);
        }
        if context.cwd != old_ctx.cwd {
            self.bus.publish(
                self.session,
                Event::ContextChange(ContextChange::CwdChanged {
                    cwd: context.cwd.clone(),
                }),
            );
        }
        for (name, value) in &context.variables {
            if old_ctx.variables.get(name) != Some(value) {
                self.bus.publish(
                    self.session,
                    Event::ContextChange(ContextChange::VariableSet {
                        name: name.clone(),
                        value: value.clone(),
                    }),
                );
            }
        }
        context.command_count += 1;
        context.last_stdout = stdout_text.clone();
        context.last_stderr = stderr_text;
        context.exit_code = outcome.exit_code;
        let exit_code = outcome.exit_code;
        (Evaluation { context, exit_code }, stdout_text)
    }

    fn run_external_command(
        &mut self,
        command: &str,
        args: &[String],
        stdin: Option<&str>,
        mut ctx: ExecutionContext,
        publish: bool,
    ) -> (Evaluation, String) {
        match run_external(command, args, stdin, &ctx) {
            Ok(result) => {
                if publish {
                    if !result.stdout.is_empty() {
                        self.publish_output(StreamKind::Stdout, result.stdout.trim_end_matches('\n'));
                    }
                    if !result.stderr.is_empty() {
                        self.publish_output(StreamKind::Stderr, result.stderr.trim_end_matches('\n'));
                    }
                }
                ctx.command_count += 1;
                ctx.last_stdout = result.stdout.clone();
                ctx.last_stderr = result.stderr;
                ctx.exit_code = result.exit_code;
                let exit_code = result.exit_code;
                (Evaluation { context: ctx, exit_code }, result.stdout)
            }
            Err(err) => {
                let message = format!("{command}: {err}");
                if publish {
                    self.publish_output(StreamKind::Stderr, &message);
                }
                let exit_code = status_from_error(&err);
                ctx.command_count += 1;
                ctx.last_stdout.clear();
                ctx.last_stderr = message;
                ctx.exit_code = exit_code;
                (Evaluation { context: ctx, exit_code }, String::new())
            }
        }
    }

    fn publish_output(&self, stream: StreamKind, text: &str) {
        self.bus.publish(
            self.session,
            Event::Output {
                stream,
                text: text.to_string(),
            },
        );
    }
}

/// Flatten loop value nodes into per-iteration native values.
///
/// A list splices its elements in, a map stays a single value, a string
/// word-splits on whitespace, and anything else is a single value. The case
/// order is load-bearing: it is what makes `for i in $A` iterate a bound
/// list element by element instead of splitting its JSON text.
pub fn extract_loop_values(nodes: &[TypedNode], ctx: &ExecutionContext) -> Vec<NativeValue> {
    let mut values = Vec::new();
    for node in nodes {
        match eval_word(node, ctx) {
            NativeValue::List(items) => values.extend(items),
            map @ NativeValue::Map(_) => values.push(map),
            NativeValue::String(text) => values.extend(
                text.split_whitespace()
                    .map(|word| NativeValue::String(word.to_string())),
            ),
            other => values.push(other),
        }
    }
    values
}

/// Minimal shell pattern match: `*` and `?` only, which is all case
/// patterns need here.
fn glob_match(pattern: &str, subject: &str) -> bool {
    fn inner(pattern: &[char], subject: &[char]) -> bool {
        match (pattern.first(), subject.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                inner(&pattern[1..], subject)
                    || (!subject.is_empty() && inner(pattern, &subject[1..]))
            }
            (Some('?'), Some(_)) => inner(&pattern[1..], &subject[1..]),
            (Some(p), Some(s)) if p == s => inner(&pattern[1..], &subject[1..]),
            _ => false,
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let subject: Vec<char> = subject.chars().collect();
    inner(&pattern, &subject)
}
