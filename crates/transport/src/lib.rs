#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `transport` owns every interaction with external processes: building
//! command lines, wrapping them in a remote shell, draining child output
//! streams without starving any of them, and running the `zfs send | zfs
//! receive` pipeline that moves snapshot data to the destination host.
//!
//! # Design
//!
//! - [`Invocation`] is a program plus arguments that renders itself as a
//!   shell-quoted line, so the same value can be spawned locally or handed to
//!   [`RemoteShell::wrap`] as the remote command string.
//! - [`StreamMultiplexer`] spawns one reader thread per stream; readers
//!   funnel lines into a shared channel that the caller drains until every
//!   stream has reported end-of-file.
//! - [`run_collect`] runs a single command to completion and keeps its output.
//! - [`run_pipeline`] connects a producer's stdout directly to a consumer's
//!   stdin, watches the three diagnostic streams, and resolves a
//!   [`TransferOutcome`].
//!
//! # Invariants
//!
//! - The payload of a pipeline never passes through this process.
//! - Lines from one stream are observed in emission order; lines from
//!   different streams may interleave arbitrarily.
//! - A vanished-snapshot warning from the producer outranks any exit status.
//!
//! # Errors
//!
//! Spawn, wait and read failures surface as [`TransportError`]. Non-zero exit
//! statuses are data, not errors: they are reported through [`Completion`] and
//! [`TransferOutcome::Failure`].

mod drain;
mod error;
mod invocation;
mod pipeline;
mod process;
mod remote;

pub use drain::{Stage, StreamKind, StreamMultiplexer, StreamSource};
pub use error::TransportError;
pub use invocation::{Invocation, Location, shell_quote};
pub use pipeline::{
    TransferFailure, TransferOutcome, TransferPipeline, detect_vanished_snapshot, run_pipeline,
};
pub use process::{Completion, exit_code_of, run_collect};
pub use remote::{DEFAULT_REMOTE_SHELL, RemoteShell};
