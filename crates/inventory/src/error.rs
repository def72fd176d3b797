//! crates/inventory/src/error.rs

use thiserror::Error;
use transport::TransportError;

/// Failures raised while querying or parsing the inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// `zfs list` exited unsuccessfully.
    #[error("'{command}' failed with exit code {code}: {stderr}")]
    CommandFailure {
        /// Rendered command line.
        command: String,
        /// Exit code.
        code: i32,
        /// Diagnostics written by the command.
        stderr: String,
    },
    /// No record matched the requested name.
    #[error("dataset '{0}' does not exist")]
    NoSuchDataset(String),
    /// More than one record matched a single-name query.
    #[error("{count} datasets named '{name}' were listed")]
    DuplicateDataset {
        /// Requested name.
        name: String,
        /// Number of matching records.
        count: usize,
    },
    /// A listing row did not have the expected two columns.
    #[error("malformed listing line: {line:?}")]
    MalformedListing {
        /// Offending line.
        line: String,
    },
    /// A creation column could not be parsed.
    #[error("invalid creation time {value:?} for '{name}'")]
    InvalidTimestamp {
        /// Dataset the column belongs to.
        name: String,
        /// Raw column value.
        value: String,
    },
    /// The name could not be turned into a query pattern.
    #[error("invalid dataset pattern: {0}")]
    Pattern(#[from] regex::Error),
    /// The command could not be run.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
