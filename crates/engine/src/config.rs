//! crates/engine/src/config.rs
//!
//! Run configuration.

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Environment variable overriding the `zfs` program.
pub const ZFS_ENV: &str = "ZFS_REPLICATE_ZFS";
/// Environment variable overriding the remote shell program.
pub const REMOTE_SHELL_ENV: &str = "ZFS_REPLICATE_SSH";
/// Environment variable overriding the lock marker directory.
pub const LOCK_DIR_ENV: &str = "ZFS_REPLICATE_LOCK_DIR";

const DEFAULT_ZFS: &str = "zfs";

/// A `host:dataset` replication target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    /// Remote host, optionally prefixed with `user@`.
    pub host: String,
    /// Dataset on the remote host.
    pub dataset: String,
}

impl Destination {
    /// Parses `HOST:DATASET`. Both parts must be non-empty and the text must
    /// contain exactly one colon.
    ///
    /// ```
    /// use engine::Destination;
    ///
    /// let destination = Destination::parse("backup:pool/home").unwrap();
    /// assert_eq!(destination.host, "backup");
    /// assert_eq!(destination.dataset, "pool/home");
    /// assert!(Destination::parse("backup:pool:home").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDestination`] for any other shape.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        match text.split_once(':') {
            Some((host, dataset))
                if !host.is_empty() && !dataset.is_empty() && !dataset.contains(':') =>
            {
                Ok(Self {
                    host: host.to_owned(),
                    dataset: dataset.to_owned(),
                })
            }
            _ => Err(EngineError::InvalidDestination(text.to_owned())),
        }
    }

    /// Parent of the destination dataset, `None` for a pool root.
    #[must_use]
    pub fn parent_dataset(&self) -> Option<&str> {
        self.dataset.rsplit_once('/').map(|(parent, _)| parent)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.dataset)
    }
}

/// Immutable settings for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicateConfig {
    source: String,
    destination: Destination,
    end_snapshot: Option<String>,
    unattended: bool,
    verbose: u8,
    dry_run: bool,
    lock_dir: PathBuf,
    zfs: OsString,
    remote_shell: OsString,
}

impl ReplicateConfig {
    /// Starts a builder for replicating `source` to `destination`.
    pub fn builder(source: impl Into<String>, destination: Destination) -> ReplicateConfigBuilder {
        ReplicateConfigBuilder::new(source.into(), destination)
    }

    /// Local dataset being replicated.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Remote target.
    #[must_use]
    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Snapshot to stop at instead of the newest.
    #[must_use]
    pub fn end_snapshot(&self) -> Option<&str> {
        self.end_snapshot.as_deref()
    }

    /// Quiet mode: a busy destination is skipped rather than reported as an error.
    #[must_use]
    pub const fn unattended(&self) -> bool {
        self.unattended
    }

    /// Verbosity level.
    #[must_use]
    pub const fn verbose(&self) -> u8 {
        self.verbose
    }

    /// Whether mutating commands are only described.
    #[must_use]
    pub const fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Directory holding lock markers.
    #[must_use]
    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// `zfs` program used on both hosts.
    #[must_use]
    pub fn zfs(&self) -> &OsString {
        &self.zfs
    }

    /// Remote shell program.
    #[must_use]
    pub fn remote_shell(&self) -> &OsString {
        &self.remote_shell
    }
}

/// Builder for [`ReplicateConfig`].
#[derive(Clone, Debug)]
pub struct ReplicateConfigBuilder {
    config: ReplicateConfig,
}

impl ReplicateConfigBuilder {
    fn new(source: String, destination: Destination) -> Self {
        Self {
            config: ReplicateConfig {
                source,
                destination,
                end_snapshot: None,
                unattended: false,
                verbose: 0,
                dry_run: false,
                lock_dir: env::temp_dir(),
                zfs: OsString::from(DEFAULT_ZFS),
                remote_shell: OsString::from(transport::DEFAULT_REMOTE_SHELL),
            },
        }
    }

    /// Stops at `snapshot` (a label or a full name).
    #[must_use]
    pub fn end_snapshot(mut self, snapshot: Option<String>) -> Self {
        self.config.end_snapshot = snapshot;
        self
    }

    /// Enables quiet, unattended operation.
    #[must_use]
    pub const fn unattended(mut self, unattended: bool) -> Self {
        self.config.unattended = unattended;
        self
    }

    /// Sets the verbosity level.
    #[must_use]
    pub const fn verbose(mut self, level: u8) -> Self {
        self.config.verbose = level;
        self
    }

    /// Enables dry-run mode.
    #[must_use]
    pub const fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Sets the lock marker directory.
    #[must_use]
    pub fn lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.lock_dir = dir.into();
        self
    }

    /// Sets the `zfs` program.
    #[must_use]
    pub fn zfs(mut self, program: impl Into<OsString>) -> Self {
        self.config.zfs = program.into();
        self
    }

    /// Sets the remote shell program.
    #[must_use]
    pub fn remote_shell(mut self, program: impl Into<OsString>) -> Self {
        self.config.remote_shell = program.into();
        self
    }

    /// Applies environment overrides obtained through `lookup`.
    ///
    /// Unset and empty variables leave the current value untouched.
    #[must_use]
    pub fn apply_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let present = |name: &str| lookup(name).filter(|value| !value.is_empty());
        if let Some(zfs) = present(ZFS_ENV) {
            self.config.zfs = zfs;
        }
        if let Some(shell) = present(REMOTE_SHELL_ENV) {
            self.config.remote_shell = shell;
        }
        if let Some(dir) = present(LOCK_DIR_ENV) {
            self.config.lock_dir = PathBuf::from(dir);
        }
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ReplicateConfig {
        self.config
    }
}
