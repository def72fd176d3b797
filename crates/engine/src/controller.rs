//! crates/engine/src/controller.rs
//!
//! The replication run state machine.
//!
//! ```text
//! Validating -> Planning -> Locking -> Pruning -> StagingTransfer
//!            -> IncrementalTransfer -> Reporting -> Done
//! ```
//!
//! Validation runs once. A transfer that reports a vanished snapshot sends
//! the machine back to `Planning` with a fresh inventory; there is no retry
//! cap. Every other failure ends the run, and the lock guard is dropped
//! before the error propagates.

use std::path::PathBuf;

use inventory::Dataset;
use logging::targets;
use transport::TransferOutcome;

use crate::config::ReplicateConfig;
use crate::error::{EngineError, EngineResult, PlanError};
use crate::exit_code::ExitCode;
use crate::lock::{DestinationLock, LockError};
use crate::plan::{ReplicationPlan, plan};
use crate::prune::prune;
use crate::signal::CancellationBroadcaster;
use crate::store::SnapshotStore;

/// Phase of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Checking that the source and destination are usable.
    Validating,
    /// Listing snapshots and computing the plan.
    Planning,
    /// Taking the destination lock.
    Locking,
    /// Destroying obsolete destination snapshots.
    Pruning,
    /// Sending the oldest source snapshot in full.
    StagingTransfer,
    /// Sending the remaining snapshots incrementally.
    IncrementalTransfer,
    /// Summarising the run.
    Reporting,
    /// Finished successfully.
    Done,
}

/// Summary of a run that did some work.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Number of passes through planning.
    pub attempts: u32,
    /// Destination snapshots destroyed, in order.
    pub pruned: Vec<String>,
    /// Transfers issued, as `end` or `begin..end`.
    pub transfers: Vec<String>,
    /// Whether the transfers and prunes were only described.
    pub simulated: bool,
}

/// Successful end of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Snapshots were transferred or pruned.
    Replicated(RunReport),
    /// The destination already held the end snapshot.
    UpToDate {
        /// Snapshot both sides share.
        snapshot: String,
    },
    /// Another run held the lock and quiet mode was requested.
    SkippedBusy {
        /// Marker that was held.
        lock: PathBuf,
    },
}

impl RunOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        ExitCode::Ok
    }
}

enum Attempt {
    Finished(RunOutcome),
    Restart { vanished: String },
}

/// Drives one replication run.
pub struct Replicator<'a, S: SnapshotStore + ?Sized> {
    store: &'a S,
    config: &'a ReplicateConfig,
    signals: &'a CancellationBroadcaster,
    state: RunState,
}

impl<'a, S: SnapshotStore + ?Sized> Replicator<'a, S> {
    /// Creates a controller over `store`.
    pub const fn new(
        store: &'a S,
        config: &'a ReplicateConfig,
        signals: &'a CancellationBroadcaster,
    ) -> Self {
        Self {
            store,
            config,
            signals,
            state: RunState::Validating,
        }
    }

    /// Last state entered.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Runs the state machine to completion.
    ///
    /// # Errors
    ///
    /// Any [`EngineError`]. When a termination signal was received, failures
    /// of the interrupted step are reported as [`EngineError::SignalAbort`].
    pub fn run(&mut self) -> EngineResult<RunOutcome> {
        let result = self.drive();
        match (result, self.signals.triggered()) {
            (Err(_), Some(reason)) => Err(EngineError::SignalAbort(reason)),
            (result, _) => result,
        }
    }

    fn drive(&mut self) -> EngineResult<RunOutcome> {
        self.enter(RunState::Validating);
        let mut destination_present = self.validate()?;
        self.checkpoint()?;

        let mut report = RunReport {
            simulated: self.config.dry_run(),
            ..RunReport::default()
        };
        loop {
            report.attempts += 1;
            match self.attempt(&mut report, destination_present)? {
                Attempt::Finished(outcome) => return Ok(outcome),
                Attempt::Restart { vanished } => {
                    tracing::warn!(
                        attempt = report.attempts + 1,
                        "snapshot {vanished} vanished during transfer; restarting"
                    );
                    destination_present = destination_present
                        || self
                            .store
                            .destination_exists(&self.config.destination().dataset)?;
                }
            }
        }
    }

    /// Returns whether the destination dataset itself already exists.
    fn validate(&self) -> EngineResult<bool> {
        let source = self.config.source();
        if !self.store.source_exists(source)? {
            return Err(EngineError::Validation(format!(
                "source dataset '{source}' does not exist"
            )));
        }
        if self.store.source_snapshots(source)?.is_empty() {
            return Err(EngineError::Validation(format!(
                "source dataset '{source}' has no snapshots"
            )));
        }

        let destination = self.config.destination();
        if self.store.destination_exists(&destination.dataset)? {
            return Ok(true);
        }
        let parent_present = match destination.parent_dataset() {
            Some(parent) => self.store.destination_exists(parent)?,
            None => false,
        };
        if parent_present {
            Ok(false)
        } else {
            Err(EngineError::Validation(format!(
                "neither '{}' nor its parent exists on {}",
                destination.dataset, destination.host
            )))
        }
    }

    fn attempt(
        &mut self,
        report: &mut RunReport,
        destination_present: bool,
    ) -> EngineResult<Attempt> {
        self.enter(RunState::Planning);
        let plan = self.compute_plan(destination_present)?;
        tracing::debug!(
            end = %plan.end(),
            created = %plan.end().creation(),
            staging = plan.needs_staging(),
            obsolete = plan.obsolete().len(),
            "plan computed"
        );
        self.checkpoint()?;

        if plan.is_noop() {
            let outcome = if report.transfers.is_empty() && report.pruned.is_empty() {
                tracing::info!(
                    target: targets::PROGRESS,
                    "{} is up to date at {}",
                    self.config.destination(),
                    plan.end().label()
                );
                RunOutcome::UpToDate {
                    snapshot: plan.end().label().to_owned(),
                }
            } else {
                self.report(report);
                RunOutcome::Replicated(report.clone())
            };
            self.enter(RunState::Done);
            return Ok(Attempt::Finished(outcome));
        }

        self.enter(RunState::Locking);
        let config = self.config;
        let destination = config.destination();
        let _guard = match DestinationLock::acquire(
            config.lock_dir(),
            &destination.host,
            &destination.dataset,
        ) {
            Ok(guard) => guard,
            Err(LockError::Held { path }) if config.unattended() => {
                tracing::info!(
                    target: targets::PROGRESS,
                    "{destination} is busy; skipping"
                );
                self.enter(RunState::Done);
                return Ok(Attempt::Finished(RunOutcome::SkippedBusy { lock: path }));
            }
            Err(LockError::Held { path }) => {
                return Err(EngineError::LockHeld {
                    host: destination.host.clone(),
                    dataset: destination.dataset.clone(),
                    path,
                });
            }
            Err(other) => return Err(other.into()),
        };

        self.enter(RunState::Pruning);
        if !plan.obsolete().is_empty() {
            let pruned = prune(self.store, plan.obsolete(), self.signals)?;
            report.pruned.extend(pruned);
        }
        self.checkpoint()?;

        let begin = match plan.begin() {
            Some(begin) => begin.clone(),
            None => {
                self.enter(RunState::StagingTransfer);
                let staging = plan.staging().unwrap_or_else(|| plan.end());
                if let Some(vanished) = self.transfer(None, staging, report)? {
                    return Ok(Attempt::Restart { vanished });
                }
                staging.clone()
            }
        };

        if !begin.same_point(plan.end()) {
            self.enter(RunState::IncrementalTransfer);
            if let Some(vanished) = self.transfer(Some(&begin), plan.end(), report)? {
                return Ok(Attempt::Restart { vanished });
            }
        }

        self.enter(RunState::Reporting);
        self.report(report);
        self.enter(RunState::Done);
        Ok(Attempt::Finished(RunOutcome::Replicated(report.clone())))
    }

    fn compute_plan(&self, destination_present: bool) -> EngineResult<ReplicationPlan> {
        let source = self.config.source();
        let destination = self.config.destination();
        let local = self.store.source_snapshots(source)?;
        let remote = if destination_present {
            self.store.destination_snapshots(&destination.dataset)?
        } else {
            Vec::new()
        };

        plan(&local, &remote, self.config.end_snapshot()).map_err(|error| match error {
            PlanError::NoCommonSnapshot => EngineError::NoCommonSnapshot {
                dataset: source.to_owned(),
                destination: destination.to_string(),
            },
            other => other.into(),
        })
    }

    /// Returns the vanished snapshot name when the transfer must be restarted.
    fn transfer(
        &self,
        begin: Option<&Dataset>,
        end: &Dataset,
        report: &mut RunReport,
    ) -> EngineResult<Option<String>> {
        let dataset = &self.config.destination().dataset;
        let outcome = self.store.transfer(begin, end, dataset)?;
        self.checkpoint()?;

        match outcome {
            TransferOutcome::Success | TransferOutcome::Simulated(_) => {
                let range = begin.map_or_else(
                    || end.name().to_owned(),
                    |begin| format!("{}..{}", begin.name(), end.name()),
                );
                tracing::info!(target: targets::PROGRESS, "sent {range}");
                report.transfers.push(range);
                Ok(None)
            }
            TransferOutcome::TransientSnapshotVanished(name) => Ok(Some(name)),
            TransferOutcome::Failure(failure) => Err(EngineError::TransferFailed {
                snapshot: end.name().to_owned(),
                stage: failure.stage,
                code: failure.code,
                diagnostics: failure.diagnostics,
            }),
        }
    }

    fn report(&self, report: &RunReport) {
        let verb = if report.simulated { "would replicate" } else { "replicated" };
        tracing::info!(
            target: targets::PROGRESS,
            "{verb} {} to {}: {} transfer(s), {} pruned, {} attempt(s)",
            self.config.source(),
            self.config.destination(),
            report.transfers.len(),
            report.pruned.len(),
            report.attempts
        );
    }

    fn checkpoint(&self) -> EngineResult<()> {
        match self.signals.triggered() {
            Some(reason) => Err(EngineError::SignalAbort(reason)),
            None => Ok(()),
        }
    }

    fn enter(&mut self, state: RunState) {
        tracing::debug!(?state, "entering state");
        self.state = state;
    }
}
