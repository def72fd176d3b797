//! Termination signal handling.
//!
//! On SIGINT, SIGQUIT, SIGTERM or SIGHUP the handler ignores further
//! deliveries of that signal and re-sends it once to the whole process
//! group, so `zfs send`, `zfs receive` and the remote shell stop together
//! with this process. The [`CancellationBroadcaster`] records the first
//! signal; the controller polls it after each blocking step and aborts the
//! run.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::install_signal_handlers;

#[cfg(not(unix))]
mod stub;
#[cfg(not(unix))]
pub use stub::install_signal_handlers;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

static GLOBAL: CancellationBroadcaster = CancellationBroadcaster::new();

/// Signal that ended the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ShutdownReason {
    /// SIGINT received.
    Interrupted = 1,
    /// SIGQUIT received.
    Quit = 2,
    /// SIGTERM received.
    Terminated = 3,
    /// SIGHUP received.
    HangUp = 4,
}

impl ShutdownReason {
    const fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Interrupted),
            2 => Some(Self::Quit),
            3 => Some(Self::Terminated),
            4 => Some(Self::HangUp),
            _ => None,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Interrupted => "interrupted by SIGINT",
            Self::Quit => "quit by SIGQUIT",
            Self::Terminated => "terminated by SIGTERM",
            Self::HangUp => "hangup by SIGHUP",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One-shot record of a termination signal.
///
/// Only the first [`fire`](Self::fire) succeeds; later calls leave the
/// recorded reason untouched and report `false`, which is what keeps the
/// process group broadcast from repeating.
#[derive(Debug)]
pub struct CancellationBroadcaster {
    reason: AtomicU8,
}

impl Default for CancellationBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationBroadcaster {
    /// Creates an untriggered broadcaster.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            reason: AtomicU8::new(0),
        }
    }

    /// Records `reason`; returns `true` only for the first call.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        self.reason
            .compare_exchange(0, reason as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// The recorded reason, if any.
    #[must_use]
    pub fn triggered(&self) -> Option<ShutdownReason> {
        ShutdownReason::from_u8(self.reason.load(Ordering::SeqCst))
    }

    /// Clears the recorded reason.
    #[doc(hidden)]
    pub fn reset_for_testing(&self) {
        self.reason.store(0, Ordering::SeqCst);
    }
}

/// Broadcaster driven by the installed signal handlers.
#[must_use]
pub fn global() -> &'static CancellationBroadcaster {
    &GLOBAL
}
