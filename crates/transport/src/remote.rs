//! crates/transport/src/remote.rs
//!
//! Remote shell wrapping for commands that run on the destination host.

use std::ffi::OsString;

use crate::invocation::Invocation;

/// Remote shell used when none is configured.
pub const DEFAULT_REMOTE_SHELL: &str = "ssh";

/// Builder for remote shell invocations.
///
/// The wrapped command is passed as a single shell-quoted argument so the
/// remote login shell reconstructs the exact argument vector. Batch mode is
/// always requested so a missing key fails instead of prompting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteShell {
    program: OsString,
    host: String,
}

impl RemoteShell {
    /// Creates a remote shell targeting `host`, which may carry a `user@` prefix.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            program: OsString::from(DEFAULT_REMOTE_SHELL),
            host: host.into(),
        }
    }

    /// Overrides the remote shell program.
    pub fn set_program(&mut self, program: impl Into<OsString>) {
        self.program = program.into();
    }

    /// Returns an invocation running `inner` on the remote host.
    #[must_use]
    pub fn wrap(&self, inner: &Invocation) -> Invocation {
        Invocation::new(self.program.clone())
            .arg("-oBatchMode=yes")
            .arg(self.host.clone())
            .arg(inner.render())
    }
}
