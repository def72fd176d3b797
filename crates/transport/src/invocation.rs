//! crates/transport/src/invocation.rs
//!
//! Command lines that can be spawned locally or forwarded to a remote shell.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::process::Command;

use crate::remote::RemoteShell;

/// A program together with its arguments.
///
/// Invocations are cheap to clone and are built with a consuming builder so
/// that a base such as `zfs` can be extended per operation:
///
/// ```
/// use transport::Invocation;
///
/// let list = Invocation::new("zfs").args(["list", "-H"]);
/// assert_eq!(list.to_string(), "zfs list -H");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    program: OsString,
    args: Vec<OsString>,
}

impl Invocation {
    /// Creates an invocation of `program` without arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument yielded by `args`.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program to execute.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Builds a [`Command`] ready for stdio configuration and spawning.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    /// Renders the invocation as a single shell-quoted line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut line = shell_quote(&self.program.to_string_lossy()).into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&shell_quote(&arg.to_string_lossy()));
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quotes `word` for a POSIX shell.
///
/// Words made only of characters that are never special to the shell are
/// returned unchanged. Everything else is wrapped in single quotes, with
/// embedded single quotes written as `'\''`.
#[must_use]
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    if !word.is_empty() && word.bytes().all(is_shell_safe) {
        return Cow::Borrowed(word);
    }

    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for ch in word.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

const fn is_shell_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'@' | b'%' | b'+' | b'=' | b':' | b',' | b'.' | b'/' | b'_' | b'-'
        )
}

/// Where a command runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// On this host.
    Local,
    /// On another host, reached through a remote shell.
    Remote(RemoteShell),
}

impl Location {
    /// Returns the invocation that runs `invocation` at this location.
    #[must_use]
    pub fn wrap(&self, invocation: Invocation) -> Invocation {
        match self {
            Self::Local => invocation,
            Self::Remote(shell) => shell.wrap(&invocation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_words_are_not_quoted() {
        assert_eq!(shell_quote("tank/home@snap-1"), "tank/home@snap-1");
        assert_eq!(shell_quote("-oBatchMode=yes"), "-oBatchMode=yes");
    }

    #[test]
    fn special_words_are_single_quoted() {
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("$HOME"), "'$HOME'");
    }

    #[test]
    fn render_quotes_each_word() {
        let invocation = Invocation::new("zfs").args(["list", "-o", "name,creation", "^tank/a b@"]);
        assert_eq!(invocation.render(), "zfs list -o name,creation '^tank/a b@'");
    }

    #[test]
    fn local_location_passes_invocation_through() {
        let invocation = Invocation::new("zfs").arg("list");
        assert_eq!(Location::Local.wrap(invocation.clone()), invocation);
    }

    #[test]
    fn command_carries_program_and_arguments() {
        let command = Invocation::new("zfs").args(["send", "tank@a"]).command();
        assert_eq!(command.get_program(), "zfs");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args, ["send", "tank@a"]);
    }
}
