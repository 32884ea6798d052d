//! Built-in command registry.
//!
//! Builtins are registered explicitly in a name -> implementation map at
//! startup; there is no discovery by naming convention. Each builtin gets
//! the expanded argument texts, optional stdin from an upstream pipeline
//! stage, and the current context, and hands back a fresh context plus lazy
//! stdout/stderr streams. Streams are produced once and consumed once by the
//! runtime, which turns every element into one output event.

use std::collections::HashMap;
use std::iter;
use std::path::PathBuf;

use crate::interp::ExecutionContext;
use crate::value::NativeValue;

/// Lazy, single-consumer output sequence.
pub type OutputStream = Box<dyn Iterator<Item = String> + Send>;

pub struct BuiltinOutcome {
    pub context: ExecutionContext,
    pub stdout: OutputStream,
    pub stderr: OutputStream,
    pub exit_code: i32,
}

impl BuiltinOutcome {
    fn status(ctx: &ExecutionContext, exit_code: i32) -> BuiltinOutcome {
        BuiltinOutcome {
            context: ctx.clone(),
            stdout: empty_stream(),
            stderr: empty_stream(),
            exit_code,
        }
    }

    fn stdout_line(ctx: &ExecutionContext, line: String) -> BuiltinOutcome {
        BuiltinOutcome {
            context: ctx.clone(),
            stdout: Box::new(iter::once(line)),
            stderr: empty_stream(),
            exit_code: 0,
        }
    }

    fn stderr_line(ctx: &ExecutionContext, line: String, exit_code: i32) -> BuiltinOutcome {
        BuiltinOutcome {
            context: ctx.clone(),
            stdout: empty_stream(),
            stderr: Box::new(iter::once(line)),
            exit_code,
        }
    }
}

fn empty_stream() -> OutputStream {
    Box::new(iter::empty())
}

pub trait Builtin: Send + Sync {
    fn invoke(
        &self,
        args: &[String],
        stdin: Option<&str>,
        ctx: &ExecutionContext,
    ) -> BuiltinOutcome;
}

/// Explicit name -> implementation map, populated once at startup.
pub struct BuiltinRegistry {
    commands: HashMap<&'static str, Box<dyn Builtin>>,
}

impl BuiltinRegistry {
    pub fn with_defaults() -> BuiltinRegistry {
        let mut commands: HashMap<&'static str, Box<dyn Builtin>> = HashMap::new();
        commands.insert("echo", Box::new(Echo));
        commands.insert("printf", Box::new(Printf));
        commands.insert("cd", Box::new(Cd));
        commands.insert("pwd", Box::new(Pwd));
        commands.insert("env", Box::new(Env));
        commands.insert("export", Box::new(Export));
        commands.insert("unset", Box::new(Unset));
        commands.insert("test", Box::new(Test));
        commands.insert("[", Box::new(Test));
        commands.insert("true", Box::new(True));
        commands.insert("false", Box::new(False));
        commands.insert(":", Box::new(True));
        commands.insert("exit", Box::new(Exit));
        BuiltinRegistry { commands }
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn invoke(
        &self,
        name: &str,
        args: &[String],
        stdin: Option<&str>,
        ctx: &ExecutionContext,
    ) -> Option<BuiltinOutcome> {
        self.commands
            .get(name)
            .map(|builtin| builtin.invoke(args, stdin, ctx))
    }
}

struct Echo;

impl Builtin for Echo {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        BuiltinOutcome::stdout_line(ctx, args.join(" "))
    }
}

struct Printf;

impl Builtin for Printf {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        let Some((format, rest)) = args.split_first() else {
            return BuiltinOutcome::stderr_line(ctx, "printf: missing format".to_string(), 2);
        };
        let text = format_printf(format, rest);
        let lines: Vec<String> = text
            .strip_suffix('\n')
            .unwrap_or(&text)
            .split('\n')
            .map(ToString::to_string)
            .collect();
        BuiltinOutcome {
            context: ctx.clone(),
            stdout: Box::new(lines.into_iter()),
            stderr: empty_stream(),
            exit_code: 0,
        }
    }
}

/// `%s`/`%d`/`%%` directives and `\n`/`\t`/`\\` escapes. Arguments feed the
/// directives in order; a missing argument renders empty, extras are
/// dropped.
fn format_printf(format: &str, args: &[String]) -> String {
    let mut out = String::new();
    let mut next_arg = args.iter();
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            },
            '%' => match chars.next() {
                Some('%') => out.push('%'),
                Some('s') => {
                    if let Some(arg) = next_arg.next() {
                        out.push_str(arg);
                    }
                }
                Some('d') => {
                    let value = next_arg
                        .next()
                        .and_then(|a| a.parse::<i64>().ok())
                        .unwrap_or(0);
                    out.push_str(&value.to_string());
                }
                Some(other) => {
                    out.push('%');
                    out.push(other);
                }
                None => out.push('%'),
            },
            other => out.push(other),
        }
    }
    out
}

struct Pwd;

impl Builtin for Pwd {
    fn invoke(&self, _args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        BuiltinOutcome::stdout_line(ctx, ctx.cwd.display().to_string())
    }
}

struct Cd;

impl Builtin for Cd {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        let target = args.first().map(String::as_str).unwrap_or("~");
        let expanded = if let Some(rest) = target.strip_prefix('~') {
            match std::env::var("HOME") {
                Ok(home) => PathBuf::from(format!("{home}{rest}")),
                Err(_) => PathBuf::from(target),
            }
        } else {
            PathBuf::from(target)
        };
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            ctx.cwd.join(expanded)
        };
        if !resolved.is_dir() {
            return BuiltinOutcome::stderr_line(
                ctx,
                format!("cd: no such directory: {}", resolved.display()),
                1,
            );
        }
        let mut context = ctx.clone();
        context.cwd = resolved.canonicalize().unwrap_or(resolved);
        BuiltinOutcome {
            context,
            stdout: empty_stream(),
            stderr: empty_stream(),
            exit_code: 0,
        }
    }
}

struct Env;

impl Builtin for Env {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        if args.is_empty() {
            let lines: Vec<String> = ctx
                .variables
                .iter()
                .map(|(name, value)| format!("{name}={}", value.to_text()))
                .collect();
            return BuiltinOutcome {
                context: ctx.clone(),
                stdout: Box::new(lines.into_iter()),
                stderr: empty_stream(),
                exit_code: 0,
            };
        }
        let mut context = ctx.clone();
        for arg in args {
            match arg.split_once('=') {
                // Values parse as typed literals: env A=[1,2,3] binds a list.
                Some((name, literal)) => {
                    context
                        .variables
                        .insert(name.to_string(), NativeValue::parse_literal(literal));
                }
                None => {
                    return BuiltinOutcome::stderr_line(
                        ctx,
                        format!("env: expected NAME=value, got '{arg}'"),
                        2,
                    )
                }
            }
        }
        BuiltinOutcome {
            context,
            stdout: empty_stream(),
            stderr: empty_stream(),
            exit_code: 0,
        }
    }
}

struct Export;

impl Builtin for Export {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        let mut context = ctx.clone();
        for arg in args {
            if let Some((name, value)) = arg.split_once('=') {
                context
                    .variables
                    .insert(name.to_string(), NativeValue::String(value.to_string()));
            }
        }
        BuiltinOutcome {
            context,
            stdout: empty_stream(),
            stderr: empty_stream(),
            exit_code: 0,
        }
    }
}

struct Unset;

impl Builtin for Unset {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        let mut context = ctx.clone();
        for name in args {
            context.variables.remove(name);
        }
        BuiltinOutcome {
            context,
            stdout: empty_stream(),
            stderr: empty_stream(),
            exit_code: 0,
        }
    }
}

struct Test;

impl Builtin for Test {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        let mut args = args;
        // The `[` spelling requires a closing bracket argument.
        if let Some((last, rest)) = args.split_last() {
            if last == "]" {
                args = rest;
            }
        }
        let exit_code = match evaluate_test(args) {
            Ok(true) => 0,
            Ok(false) => 1,
            Err(message) => {
                return BuiltinOutcome::stderr_line(ctx, format!("test: {message}"), 2)
            }
        };
        BuiltinOutcome::status(ctx, exit_code)
    }
}

fn evaluate_test(args: &[String]) -> Result<bool, String> {
    match args {
        [] => Ok(false),
        [value] => Ok(!value.is_empty()),
        [op, value] if op == "-n" => Ok(!value.is_empty()),
        [op, value] if op == "-z" => Ok(value.is_empty()),
        [left, op, right] => match op.as_str() {
            "=" | "==" => Ok(left == right),
            "!=" => Ok(left != right),
            "-eq" | "-ne" | "-lt" | "-le" | "-gt" | "-ge" => {
                let lhs: i64 = left
                    .parse()
                    .map_err(|_| format!("integer expression expected: '{left}'"))?;
                let rhs: i64 = right
                    .parse()
                    .map_err(|_| format!("integer expression expected: '{right}'"))?;
                Ok(match op.as_str() {
                    "-eq" => lhs == rhs,
                    "-ne" => lhs != rhs,
                    "-lt" => lhs < rhs,
                    "-le" => lhs <= rhs,
                    "-gt" => lhs > rhs,
                    _ => lhs >= rhs,
                })
            }
            other => Err(format!("unknown operator '{other}'")),
        },
        _ => Err("too many arguments".to_string()),
    }
}

struct True;

impl Builtin for True {
    fn invoke(&self, _args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        BuiltinOutcome::status(ctx, 0)
    }
}

struct False;

impl Builtin for False {
    fn invoke(&self, _args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        BuiltinOutcome::status(ctx, 1)
    }
}

struct Exit;

impl Builtin for Exit {
    fn invoke(&self, args: &[String], _stdin: Option<&str>, ctx: &ExecutionContext) -> BuiltinOutcome {
        let code = args
            .first()
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(ctx.exit_code);
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(name: &str, args: &[&str], ctx: &ExecutionContext) -> BuiltinOutcome {
        let registry = BuiltinRegistry::with_defaults();
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();
        registry.invoke(name, &args, None, ctx).unwrap()
    }

    #[test]
    fn registry_knows_its_names() {
        let registry = BuiltinRegistry::with_defaults();
        assert!(registry.is_builtin("echo"));
        assert!(registry.is_builtin("["));
        assert!(!registry.is_builtin("definitely-not-a-builtin"));
    }

    #[test]
    fn echo_joins_arguments() {
        let ctx = ExecutionContext::empty();
        let outcome = invoke("echo", &["a", "b"], &ctx);
        let lines: Vec<String> = outcome.stdout.collect();
        assert_eq!(lines, vec!["a b"]);
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn printf_formats_directives_and_escapes() {
        let ctx = ExecutionContext::empty();
        let outcome = invoke("printf", &["%s-%s\\n", "a", "b"], &ctx);
        let lines: Vec<String> = outcome.stdout.collect();
        assert_eq!(lines, vec!["a-b"]);

        let outcome = invoke("printf", &["%d%%\\n", "42"], &ctx);
        let lines: Vec<String> = outcome.stdout.collect();
        assert_eq!(lines, vec!["42%"]);

        // Two lines from one format string become two stdout items.
        let outcome = invoke("printf", &["one\\ntwo\\n"], &ctx);
        let lines: Vec<String> = outcome.stdout.collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn printf_without_format_is_an_error() {
        let ctx = ExecutionContext::empty();
        let outcome = invoke("printf", &[], &ctx);
        assert_eq!(outcome.exit_code, 2);
    }

    #[test]
    fn env_parses_typed_literals() {
        let ctx = ExecutionContext::empty();
        let outcome = invoke("env", &["A=[1,2,3]"], &ctx);
        assert_eq!(
            outcome.context.variables.get("A"),
            Some(&NativeValue::parse_literal("[1,2,3]"))
        );
        let outcome = invoke("env", &["NAME=plain text"], &ctx);
        assert_eq!(
            outcome.context.variables.get("NAME"),
            Some(&NativeValue::String("plain text".into()))
        );
    }

    #[test]
    fn test_compares_integers() {
        let ctx = ExecutionContext::empty();
        assert_eq!(invoke("test", &["1", "-lt", "2"], &ctx).exit_code, 0);
        assert_eq!(invoke("test", &["2", "-lt", "2"], &ctx).exit_code, 1);
        // Unset variables expand to "" which is not an integer; the
        // condition fails with a diagnostic, not a crash.
        assert_eq!(invoke("test", &["", "-lt", "0"], &ctx).exit_code, 2);
    }

    #[test]
    fn test_bracket_form_drops_closer() {
        let ctx = ExecutionContext::empty();
        assert_eq!(invoke("[", &["a", "=", "a", "]"], &ctx).exit_code, 0);
    }

    #[test]
    fn cd_rejects_missing_directory() {
        let ctx = ExecutionContext::empty();
        let outcome = invoke("cd", &["/definitely/not/here"], &ctx);
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.context.cwd, ctx.cwd);
    }

    #[test]
    fn cd_changes_context_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ExecutionContext::empty();
        let outcome = invoke("cd", &[dir.path().to_str().unwrap()], &ctx);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.context.cwd, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn unset_removes_variables() {
        let ctx = ExecutionContext::empty().with_variable("GONE", NativeValue::Integer(1));
        let outcome = invoke("unset", &["GONE"], &ctx);
        assert!(!outcome.context.variables.contains_key("GONE"));
    }
}
