//! Signal handling for platforms without POSIX signals.

use std::io;

/// No handlers are installed on this platform.
///
/// # Errors
///
/// Never fails.
pub fn install_signal_handlers() -> io::Result<()> {
    Ok(())
}
