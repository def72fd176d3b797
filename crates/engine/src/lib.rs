#![deny(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_docs)]

//! # Overview
//!
//! `engine` decides what has to move and drives the replication run. It
//! compares the snapshot histories of the source and destination, computes
//! a [`ReplicationPlan`], serialises runs per destination with a
//! [`DestinationLock`], prunes destination snapshots the source no longer
//! has, and issues the staging and incremental transfers.
//!
//! # Design
//!
//! - [`plan`] is a pure function over two ordered snapshot lists.
//! - [`SnapshotStore`] is the seam between the controller and the hosts;
//!   [`ZfsStore`] implements it with `zfs` commands and tests substitute a
//!   scripted store.
//! - [`Replicator`] runs the state machine validate, plan, lock, prune,
//!   transfer, report. A transfer that loses a snapshot to a concurrent
//!   rotation restarts the machine from planning.
//! - [`signal`] turns termination signals into a one-shot broadcast to the
//!   process group and a flag the controller polls between blocking steps.
//!
//! # Errors
//!
//! Every failure is an [`EngineError`]; crate-local errors from
//! `inventory`, `transport`, the planner and the lock convert into it.

mod config;
mod controller;
mod error;
mod exit_code;
mod lock;
mod plan;
mod prune;
pub mod signal;
mod store;

pub use config::{
    Destination, LOCK_DIR_ENV, REMOTE_SHELL_ENV, ReplicateConfig, ReplicateConfigBuilder, ZFS_ENV,
};
pub use controller::{Replicator, RunOutcome, RunReport, RunState};
pub use error::{EngineError, EngineResult, PlanError};
pub use exit_code::ExitCode;
pub use lock::{DestinationLock, LockError, LockGuard};
pub use plan::{ReplicationPlan, plan};
pub use prune::prune;
pub use store::{SnapshotStore, ZfsStore};
