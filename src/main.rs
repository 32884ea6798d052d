use std::env;
use std::process::ExitCode;

use rshell::repl::Repl;

fn main() -> ExitCode {
    init_logging();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                println!("usage: rshell");
                println!("  RSHELL_LOG      log filter (default: info)");
                println!("  RSHELL_EDITMODE line editing mode: emacs (default) or vi");
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("error: unknown argument {other:?}");
                return ExitCode::from(2);
            }
        }
    }

    let mut repl = match Repl::new() {
        Ok(repl) => repl,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    match repl.run() {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let env = env_logger::Env::default().filter_or("RSHELL_LOG", "info");
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
