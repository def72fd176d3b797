use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

/// Forwards the arguments and I/O handles to the CLI crate and maps the
/// returned status to a process exit code.
#[must_use]
pub fn run_with<I, Out, Err>(args: I, stdout: &mut Out, stderr: &mut Err) -> ExitCode
where
    I: IntoIterator,
    I::Item: Into<OsString>,
    Out: Write,
    Err: Write,
{
    let status = cli::run(args, stdout, stderr);
    let _ = stdout.flush();
    let _ = stderr.flush();
    cli::exit_code_from(status)
}
