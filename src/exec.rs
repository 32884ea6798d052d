//! External command execution.
//!
//! Thin collaborator around `std::process::Command`: the interpreter only
//! needs the captured output and an exit code. The child runs in the
//! context's working directory with the context's variables stringified
//! into its environment, and receives piped stdin when a pipeline stage
//! feeds it.

use std::io::{self, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, Stdio};

use log::debug;

use crate::interp::ExecutionContext;

#[derive(Debug)]
pub struct ExternalResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub fn run_external(
    program: &str,
    args: &[String],
    stdin: Option<&str>,
    ctx: &ExecutionContext,
) -> io::Result<ExternalResult> {
    debug!("exec event=spawn program={program} args={}", args.len());
    let mut command = Command::new(program);
    command
        .args(args)
        .current_dir(&ctx.cwd)
        .envs(ctx.variables.iter().map(|(k, v)| (k.clone(), v.to_text())))
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn()?;
    if let Some(text) = stdin {
        // Dropping the handle closes the pipe so the child sees EOF.
        if let Some(mut handle) = child.stdin.take() {
            handle.write_all(text.as_bytes())?;
        }
    }
    let output = child.wait_with_output()?;
    let exit_code = exit_status_code(output.status);
    debug!("exec event=done program={program} status={exit_code}");
    Ok(ExternalResult {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code,
    })
}

pub fn status_from_error(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => 127,
        io::ErrorKind::PermissionDenied => 126,
        _ => 1,
    }
}

fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        code
    } else if let Some(sig) = status.signal() {
        128 + sig
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_maps_to_127() {
        let ctx = ExecutionContext::empty();
        let err = run_external("definitely-not-on-path-xyz", &[], None, &ctx).unwrap_err();
        assert_eq!(status_from_error(&err), 127);
    }

    #[test]
    fn captures_output_and_status() {
        let ctx = ExecutionContext::empty();
        let result =
            run_external("sh", &["-c".into(), "echo out; exit 3".into()], None, &ctx).unwrap();
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.exit_code, 3);
    }

    #[test]
    fn stdin_reaches_the_child() {
        let ctx = ExecutionContext::empty();
        let result = run_external("cat", &[], Some("piped\n"), &ctx).unwrap();
        assert_eq!(result.stdout, "piped\n");
        assert_eq!(result.exit_code, 0);
    }
}
