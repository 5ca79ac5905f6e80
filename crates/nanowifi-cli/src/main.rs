//! Entry point for the `nanowifi` operator tool.
//!
//! All work is delegated to [`nanowifi_cli::run`].

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    nanowifi_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
