//! Interactive line loop.
//!
//! Lines are collected into a pending chunk and handed to the session only
//! once the continuation detector says the chunk is ready. The engine keeps
//! its own accumulated buffer, so the chunk is fed exactly once and the
//! pending string cleared afterwards. Output reaches the terminal through
//! the event bus, not by printing inside the interpreter.

use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::debug;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, EditMode, Editor};

use crate::continuation::ready;
use crate::engine::EngineError;
use crate::events::{Event, EventBus, StreamKind, Topic};
use crate::interp::ExecutionContext;
use crate::session::ShellSession;

pub struct Repl {
    editor: Editor<(), DefaultHistory>,
    session: ShellSession,
    output: Receiver<Event>,
    pending: String,
}

impl Repl {
    pub fn new() -> io::Result<Repl> {
        let edit_mode = match env::var("RSHELL_EDITMODE").ok().as_deref() {
            Some("vi") | Some("VI") => EditMode::Vi,
            _ => EditMode::Emacs,
        };
        let config = Config::builder()
            .auto_add_history(true)
            .edit_mode(edit_mode)
            .build();
        let editor = Editor::with_config(config).map_err(io::Error::other)?;

        let bus = Arc::new(EventBus::new());
        let output = bus.subscribe(0, &[Topic::Output]);
        let session = ShellSession::new(0, Arc::clone(&bus), ExecutionContext::inherit())
            .map_err(|err| io::Error::other(err.to_string()))?;

        let mut repl = Repl {
            editor,
            session,
            output,
            pending: String::new(),
        };
        let _ = repl.editor.load_history(&history_path());
        Ok(repl)
    }

    pub fn run(&mut self) -> io::Result<i32> {
        loop {
            let prompt = if self.pending.is_empty() {
                primary_prompt(self.session.context())
            } else {
                "…> ".to_string()
            };
            match self.editor.readline(&prompt) {
                Ok(line) => self.accept_line(&line),
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C abandons the pending chunk, not the shell.
                    self.pending.clear();
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(io::Error::other(err)),
            }
        }
        let _ = self.editor.save_history(&history_path());
        Ok(self.session.context().exit_code)
    }

    fn accept_line(&mut self, line: &str) {
        if self.pending.is_empty() {
            if let Some(meta) = parse_meta(line) {
                self.run_meta(meta);
                return;
            }
        }
        self.pending.push_str(line);
        self.pending.push('\n');
        if !ready(&self.pending) {
            return;
        }
        let chunk = std::mem::take(&mut self.pending);
        match self.session.feed(&chunk) {
            Ok(outcome) => {
                debug!("repl event=fed outcome={outcome:?}");
                // Syntax-error diagnostics arrive as stderr events too.
                self.drain_output();
            }
            Err(EngineError::BufferOverflow { current, fragment, max }) => {
                eprintln!(
                    "rshell: input buffer overflow ({current} + {fragment} > {max}); buffer cleared"
                );
                self.session.reset();
            }
            Err(err) => eprintln!("rshell: {err}"),
        }
    }

    fn run_meta(&mut self, meta: MetaCommand) {
        match meta {
            MetaCommand::Reset => {
                self.session.reset();
                self.pending.clear();
                println!("input buffer cleared");
            }
            MetaCommand::Help => {
                println!(".reset   discard pending input and the parse buffer");
                println!(".status  show session state");
                println!(".ast     show the current parse tree");
                println!(".help    this list");
            }
            MetaCommand::Status => {
                let ctx = self.session.context();
                println!("cwd: {}", ctx.cwd.display());
                println!("exit code: {}", ctx.exit_code);
                println!("commands run: {}", ctx.command_count);
                println!("variables: {}", ctx.variables.len());
                println!("parse buffer: {} bytes", self.session.parse_buffer_len());
            }
            MetaCommand::Ast => match self.session.current_tree() {
                Some(root) => println!("{root:#?}"),
                None => println!("no input parsed yet"),
            },
        }
    }

    fn drain_output(&mut self) {
        for event in self.output.try_iter() {
            if let Event::Output { stream, text } = event {
                // One event per output line, newline not included.
                match stream {
                    StreamKind::Stdout => println!("{text}"),
                    StreamKind::Stderr => eprintln!("{text}"),
                }
            }
        }
    }
}

/// Dot-prefixed meta commands handled by the line loop itself, never fed to
/// the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetaCommand {
    Reset,
    Help,
    Status,
    Ast,
}

/// Recognize a meta command at the start of a fresh line. Anything else,
/// including paths like `./bin/tool`, goes to the shell untouched.
fn parse_meta(line: &str) -> Option<MetaCommand> {
    match line.trim() {
        ".reset" => Some(MetaCommand::Reset),
        ".help" => Some(MetaCommand::Help),
        ".status" => Some(MetaCommand::Status),
        ".ast" => Some(MetaCommand::Ast),
        _ => None,
    }
}

fn primary_prompt(ctx: &ExecutionContext) -> String {
    let cwd = ctx
        .cwd
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| ctx.cwd.display().to_string());
    if ctx.exit_code == 0 {
        format!("{cwd} $ ")
    } else {
        format!("{cwd} [{}] $ ", ctx.exit_code)
    }
}

fn history_path() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".rshell_history")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_commands_parse_by_exact_name() {
        assert_eq!(parse_meta(".reset"), Some(MetaCommand::Reset));
        assert_eq!(parse_meta("  .status "), Some(MetaCommand::Status));
        assert_eq!(parse_meta(".help"), Some(MetaCommand::Help));
        assert_eq!(parse_meta(".ast"), Some(MetaCommand::Ast));
    }

    #[test]
    fn ordinary_lines_are_not_meta() {
        assert_eq!(parse_meta("./bin/tool"), None);
        assert_eq!(parse_meta(".resetx"), None);
        assert_eq!(parse_meta("echo .reset"), None);
        assert_eq!(parse_meta(""), None);
    }
}
