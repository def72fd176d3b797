//! Unix signal handler installation.
//!
//! Handlers must stay async-signal-safe: they only touch atomics and call
//! `signal(2)` and `kill(2)`.
#![allow(unsafe_code)]

use std::io;

use super::ShutdownReason;

const HANDLED: [libc::c_int; 4] = [libc::SIGINT, libc::SIGQUIT, libc::SIGTERM, libc::SIGHUP];

impl ShutdownReason {
    /// Maps a signal number to a reason.
    #[must_use]
    pub const fn from_signal(signum: libc::c_int) -> Option<Self> {
        match signum {
            libc::SIGINT => Some(Self::Interrupted),
            libc::SIGQUIT => Some(Self::Quit),
            libc::SIGTERM => Some(Self::Terminated),
            libc::SIGHUP => Some(Self::HangUp),
            _ => None,
        }
    }
}

extern "C" fn handle_termination(signum: libc::c_int) {
    // SAFETY: signal(2) is async-signal-safe.
    unsafe {
        libc::signal(signum, libc::SIG_IGN);
    }

    let Some(reason) = ShutdownReason::from_signal(signum) else {
        return;
    };
    if super::global().fire(reason) {
        // SAFETY: kill(2) is async-signal-safe; pid 0 addresses our process
        // group, and this process now ignores the signal.
        unsafe {
            libc::kill(0, signum);
        }
    }
}

/// Installs the termination handlers.
///
/// # Errors
///
/// Returns the OS error if `sigaction` fails.
pub fn install_signal_handlers() -> io::Result<()> {
    let handler: extern "C" fn(libc::c_int) = handle_termination;
    for signum in HANDLED {
        // SAFETY: the sigaction struct is fully initialised before use and
        // the handler only performs async-signal-safe work.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = handler as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&raw mut action.sa_mask);

            if libc::sigaction(signum, &raw const action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}
