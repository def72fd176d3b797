//! crates/transport/src/error.rs
//!
//! Error types for child process handling.

use std::io;

use thiserror::Error;

/// Failures raised while launching or supervising a child process.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The program could not be started.
    #[error("failed to launch '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying spawn error.
        #[source]
        source: io::Error,
    },
    /// Waiting for the child's exit status failed.
    #[error("failed to wait for '{program}': {source}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Underlying wait error.
        #[source]
        source: io::Error,
    },
    /// Reading one of the child's output streams failed.
    #[error("failed to read output of '{command}': {source}")]
    Stream {
        /// Rendered command line.
        command: String,
        /// Underlying read error.
        #[source]
        source: io::Error,
    },
    /// A pipe requested at spawn time was not handed back.
    #[error("'{program}' did not expose its {stream} pipe")]
    MissingPipe {
        /// Program whose pipe is missing.
        program: String,
        /// Name of the missing stream.
        stream: &'static str,
    },
}
