//! crates/transport/src/process.rs
//!
//! Run a single command to completion while collecting its output.

use std::process::{ExitStatus, Stdio};

use logging::targets;

use crate::drain::{Stage, StreamKind, StreamMultiplexer, StreamSource};
use crate::error::TransportError;
use crate::invocation::Invocation;

/// Captured result of a finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    code: i32,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl Completion {
    /// Builds a completion from its parts.
    #[must_use]
    pub const fn new(code: i32, stdout: Vec<String>, stderr: Vec<String>) -> Self {
        Self {
            code,
            stdout,
            stderr,
        }
    }

    /// Exit code, or 128 plus the signal number for signal deaths.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }

    /// Lines written to standard output.
    #[must_use]
    pub fn stdout_lines(&self) -> &[String] {
        &self.stdout
    }

    /// Standard error joined into one block of text.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        self.stderr.join("\n")
    }
}

/// Runs `invocation` with a closed stdin and waits for it to exit.
///
/// Standard error lines are relayed to the remote-output log target as they
/// arrive; standard output is kept for the caller.
///
/// # Errors
///
/// Fails when the program cannot be spawned, waited on, or read from. A
/// non-zero exit status is reported through [`Completion::code`].
pub fn run_collect(invocation: &Invocation) -> Result<Completion, TransportError> {
    tracing::info!(target: targets::COMMAND, "+ {invocation}");

    let program = invocation.program().to_string_lossy().into_owned();
    let mut child = invocation
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| TransportError::Spawn {
            program: program.clone(),
            source,
        })?;

    let mut streams = StreamMultiplexer::new();
    if let Some(stdout) = child.stdout.take() {
        streams.attach(stdout, StreamSource::new(Stage::Command, StreamKind::Stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        streams.attach(stderr, StreamSource::new(Stage::Command, StreamKind::Stderr));
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let drained = streams.drain(|source, line| match source.kind {
        StreamKind::Stdout => stdout.push(line.to_owned()),
        StreamKind::Stderr => {
            tracing::info!(target: targets::REMOTE, "{line}");
            stderr.push(line.to_owned());
        }
    });

    let status = child
        .wait()
        .map_err(|source| TransportError::Wait { program, source })?;
    drained.map_err(|source| TransportError::Stream {
        command: invocation.render(),
        source,
    })?;

    let code = exit_code_of(status);
    tracing::debug!(command = %invocation, code, "command finished");
    Ok(Completion::new(code, stdout, stderr))
}

/// Maps an exit status to a shell-style code.
///
/// Processes terminated by a signal map to 128 plus the signal number.
#[must_use]
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
