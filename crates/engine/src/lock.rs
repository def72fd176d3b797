//! crates/engine/src/lock.rs
//!
//! Per-destination mutual exclusion backed by an exclusively created marker
//! file.
//!
//! Exactly one of several concurrent [`DestinationLock::acquire`] calls for
//! the same destination succeeds; the others fail immediately with
//! [`LockError::Held`]. There is no waiting variant. The returned
//! [`LockGuard`] removes the marker when dropped, but only while the marker
//! still carries the guard's owner token.
//!
//! A marker left behind by a crashed run keeps failing closed until it is
//! removed by hand.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

static TOKEN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Failures raised while taking a destination lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run holds the lock.
    #[error("lock {} is held by another run", .path.display())]
    Held {
        /// Marker path.
        path: PathBuf,
    },
    /// The marker could not be created or written.
    #[error("failed to create lock {}: {source}", .path.display())]
    Io {
        /// Marker path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

/// Lock on one `(host, dataset)` destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationLock {
    path: PathBuf,
}

impl DestinationLock {
    /// Describes the lock for `dataset` on `host`, with its marker in `dir`.
    #[must_use]
    pub fn new(dir: &Path, host: &str, dataset: &str) -> Self {
        let name = format!(
            "zfs-replicate.{}.{}.lock",
            host_label(host),
            dataset.replace('/', "_")
        );
        Self {
            path: dir.join(name),
        }
    }

    /// Takes the lock for `dataset` on `host` without waiting.
    ///
    /// # Errors
    ///
    /// [`LockError::Held`] when the marker exists, [`LockError::Io`] when it
    /// cannot be created.
    pub fn acquire(dir: &Path, host: &str, dataset: &str) -> Result<LockGuard, LockError> {
        Self::new(dir, host, dataset).try_acquire()
    }

    /// Marker file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Takes this lock without waiting.
    ///
    /// # Errors
    ///
    /// See [`DestinationLock::acquire`].
    pub fn try_acquire(&self) -> Result<LockGuard, LockError> {
        let path = self.path.clone();
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(ref error) if error.kind() == io::ErrorKind::AlreadyExists => {
                return Err(LockError::Held { path });
            }
            Err(source) => return Err(LockError::Io { path, source }),
        };

        let token = owner_token();
        if let Err(source) = file.write_all(token.as_bytes()) {
            let _ = fs::remove_file(&path);
            return Err(LockError::Io { path, source });
        }

        tracing::debug!(lock = %path.display(), "lock acquired");
        Ok(LockGuard { path, token })
    }
}

/// Held lock; dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
}

impl LockGuard {
    /// Marker file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents == self.token => {
                if let Err(error) = fs::remove_file(&self.path) {
                    tracing::warn!(lock = %self.path.display(), %error, "failed to remove lock");
                } else {
                    tracing::debug!(lock = %self.path.display(), "lock released");
                }
            }
            Ok(_) => {
                tracing::warn!(
                    lock = %self.path.display(),
                    "lock marker replaced by another owner; left in place"
                );
            }
            Err(error) => {
                tracing::warn!(lock = %self.path.display(), %error, "lock marker disappeared");
            }
        }
    }
}

/// Leading DNS label of `host` with any `user@` prefix removed.
fn host_label(host: &str) -> &str {
    let host = host.rsplit_once('@').map_or(host, |(_, host)| host);
    host.split('.').next().unwrap_or(host)
}

fn owner_token() -> String {
    let mut nonce = [0u8; 8];
    let nonce = if getrandom::fill(&mut nonce).is_ok() {
        u64::from_le_bytes(nonce)
    } else {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        #[allow(clippy::cast_possible_truncation)]
        let nanos = nanos as u64;
        nanos ^ TOKEN_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    };
    format!("{} {nonce:016x}\n", process::id())
}
