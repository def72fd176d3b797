//! crates/logging/src/levels.rs
//! Output categories derived from tracing targets.

use tracing::Level;

/// Category an event belongs to, derived from its tracing target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// External command lines echoed before they run.
    Command,
    /// Lines relayed from child process diagnostic streams.
    Remote,
    /// Progress and report lines for the current run.
    Progress,
    /// Everything else.
    Diagnostic,
}

impl LogCategory {
    /// Maps a tracing target onto a category.
    ///
    /// Targets are matched on their last path segment so that both
    /// `zfs_replicate::cmd` and a bare `cmd` resolve to [`LogCategory::Command`].
    #[must_use]
    pub fn from_target(target: &str) -> Self {
        let segment = target.rsplit("::").next().unwrap_or(target);
        match segment {
            "cmd" | "command" => Self::Command,
            "remote" => Self::Remote,
            "progress" => Self::Progress,
            _ => Self::Diagnostic,
        }
    }

    /// Minimum `--verbose` count needed before events of this category at
    /// `level` are shown. `None` means the event is always shown.
    #[must_use]
    pub const fn required_verbosity(self, level: &Level) -> Option<u8> {
        match *level {
            Level::ERROR | Level::WARN => None,
            Level::INFO => match self {
                Self::Command | Self::Remote => Some(1),
                Self::Progress | Self::Diagnostic => Some(0),
            },
            Level::DEBUG => Some(2),
            Level::TRACE => Some(3),
        }
    }
}
