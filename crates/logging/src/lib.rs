#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` routes the workspace's [`tracing`] events to standard error while
//! honouring the `--quiet` and `--verbose` switches of `zfs-replicate`.
//!
//! # Design
//!
//! Every event is classified by its target into a [`LogCategory`]. The
//! [`VerbosityConfig`] decides whether a category/level pair is rendered:
//! warnings and errors always are, progress reports are dropped in quiet
//! (unattended) mode, and echoed commands plus relayed child diagnostics only
//! appear with `--verbose`. [`ReplicateLayer`] applies that decision inside a
//! `tracing-subscriber` registry, optionally narrowed further by `RUST_LOG`.
//!
//! Producers tag their events with the constants in [`targets`]:
//!
//! ```
//! tracing::info!(target: logging::targets::COMMAND, "+ zfs send tank/data@daily.1");
//! tracing::info!(target: logging::targets::PROGRESS, "replication complete");
//! ```

mod config;
mod levels;
mod tracing_bridge;

pub use config::VerbosityConfig;
pub use levels::LogCategory;
pub use tracing_bridge::{PROGRAM_PREFIX, ReplicateLayer, init_tracing};

/// Tracing targets understood by [`ReplicateLayer`].
pub mod targets {
    /// Echo of an external command line about to run.
    pub const COMMAND: &str = "zfs_replicate::cmd";
    /// A line relayed from a child process's diagnostic stream.
    pub const REMOTE: &str = "zfs_replicate::remote";
    /// Run progress and end-of-run reports.
    pub const PROGRESS: &str = "zfs_replicate::progress";
}
