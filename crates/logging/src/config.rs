//! crates/logging/src/config.rs
//! Verbosity configuration built from the command-line switches.

use tracing::Level;

use super::levels::LogCategory;

/// Combined quiet/verbose configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VerbosityConfig {
    /// Unattended mode: progress output is suppressed.
    pub quiet: bool,
    /// Number of `--verbose` flags.
    pub verbose: u8,
}

impl VerbosityConfig {
    /// Creates a configuration from the `--quiet` flag and `--verbose` count.
    #[must_use]
    pub const fn new(quiet: bool, verbose: u8) -> Self {
        Self { quiet, verbose }
    }

    /// Creates a configuration from a verbose level alone.
    #[must_use]
    pub const fn from_verbose_level(level: u8) -> Self {
        Self::new(false, level)
    }

    /// Returns `true` when an event of `category` at `level` should be rendered.
    #[must_use]
    pub const fn allows(&self, category: LogCategory, level: &Level) -> bool {
        match category.required_verbosity(level) {
            None => true,
            Some(0) => !self.quiet,
            Some(required) => self.verbose >= required,
        }
    }
}
