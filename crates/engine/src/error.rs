//! Error types for the engine crate.

use std::path::PathBuf;

use inventory::InventoryError;
use thiserror::Error;
use transport::{Stage, TransportError};

use crate::exit_code::ExitCode;
use crate::lock::LockError;
use crate::signal::ShutdownReason;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Reasons a replication plan cannot be computed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The source dataset has no snapshots.
    #[error("the source dataset has no snapshots")]
    NoSourceSnapshots,
    /// The requested end snapshot does not exist on the source.
    #[error("end snapshot '{0}' does not exist on the source")]
    EndSnapshotNotFound(String),
    /// The histories share no snapshot label.
    #[error("no common snapshot between source and destination")]
    NoCommonSnapshot,
    /// The requested end snapshot predates the destination's newest common snapshot.
    #[error("end snapshot '{end}' is older than the common snapshot '{begin}'")]
    EndBeforeBegin {
        /// Common snapshot.
        begin: String,
        /// Requested end snapshot.
        end: String,
    },
}

/// Errors that end a replication run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The destination argument is not `HOST:DATASET`.
    #[error("invalid destination '{0}': expected HOST:DATASET")]
    InvalidDestination(String),
    /// A dataset required by the run is missing or unusable.
    #[error("{0}")]
    Validation(String),
    /// The plan could not be computed.
    #[error(transparent)]
    Plan(#[from] PlanError),
    /// The destination shares no snapshot with the source.
    #[error(
        "no common snapshot between '{dataset}' and '{destination}'; destroy the destination \
         dataset and run again to perform a full replication"
    )]
    NoCommonSnapshot {
        /// Source dataset.
        dataset: String,
        /// Destination as `host:dataset`.
        destination: String,
    },
    /// Another run is replicating to the same destination.
    #[error(
        "another replication to {host}:{dataset} is in progress (remove {} if it is stale)",
        .path.display()
    )]
    LockHeld {
        /// Destination host.
        host: String,
        /// Destination dataset.
        dataset: String,
        /// Marker path.
        path: PathBuf,
    },
    /// The lock marker could not be handled.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// A query or destroy command failed.
    #[error("'{command}' failed with exit code {code}: {diagnostics}")]
    CommandFailure {
        /// Rendered command line.
        command: String,
        /// Exit code.
        code: i32,
        /// Diagnostics written by the command.
        diagnostics: String,
    },
    /// A transfer pipeline failed.
    #[error("transfer of '{snapshot}' failed in the {stage} with exit code {code}: {diagnostics}")]
    TransferFailed {
        /// Snapshot being sent.
        snapshot: String,
        /// Failing side.
        stage: Stage,
        /// Exit code of the failing side.
        code: i32,
        /// Diagnostics of the failing side.
        diagnostics: String,
    },
    /// An inventory query failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    /// A child process could not be run.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A termination signal interrupted the run.
    #[error("aborted: {0}")]
    SignalAbort(ShutdownReason),
}

impl EngineError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        ExitCode::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_common_snapshot_explains_remediation() {
        let err = EngineError::NoCommonSnapshot {
            dataset: "tank/home".to_owned(),
            destination: "nas:pool/home".to_owned(),
        };
        let message = err.to_string();

        assert!(message.contains("'tank/home'"));
        assert!(message.contains("destroy the destination dataset"));
        assert!(message.contains("full replication"));
    }

    #[test]
    fn plan_errors_are_transparent() {
        let err = EngineError::from(PlanError::EndSnapshotNotFound("daily-9".to_owned()));
        assert_eq!(err.to_string(), "end snapshot 'daily-9' does not exist on the source");
    }

    #[test]
    fn transfer_failure_names_stage() {
        let err = EngineError::TransferFailed {
            snapshot: "tank@b".to_owned(),
            stage: Stage::Consumer,
            code: 1,
            diagnostics: "out of space".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "transfer of 'tank@b' failed in the consumer with exit code 1: out of space"
        );
    }

    #[test]
    fn every_error_exits_with_one() {
        let errors = [
            EngineError::InvalidDestination("x".to_owned()),
            EngineError::Validation("missing".to_owned()),
            EngineError::SignalAbort(ShutdownReason::Terminated),
        ];
        for err in errors {
            assert_eq!(err.exit_code().as_i32(), 1);
        }
    }
}
