//! Process exit codes.

use std::fmt;

/// Exit status reported by the `zfs-replicate` binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExitCode {
    /// Replicated, already up to date, or skipped because the destination was busy.
    Ok = 0,
    /// Any failure.
    Error = 1,
}

impl ExitCode {
    /// Numeric status.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Short description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Ok => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}
