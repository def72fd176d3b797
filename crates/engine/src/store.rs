//! crates/engine/src/store.rs
//!
//! Access to snapshots on both hosts.

use inventory::{Dataset, Inventory};
use logging::targets;
use transport::{
    Invocation, Location, RemoteShell, TransferOutcome, TransferPipeline, run_collect,
};

use crate::config::ReplicateConfig;
use crate::error::{EngineError, EngineResult};

/// Operations the controller needs from the source and destination hosts.
pub trait SnapshotStore {
    /// Whether `dataset` exists on the source host.
    fn source_exists(&self, dataset: &str) -> EngineResult<bool>;

    /// Snapshots of `dataset` on the source host, oldest-first.
    fn source_snapshots(&self, dataset: &str) -> EngineResult<Vec<Dataset>>;

    /// Whether `dataset` exists on the destination host.
    fn destination_exists(&self, dataset: &str) -> EngineResult<bool>;

    /// Snapshots of `dataset` on the destination host, oldest-first.
    fn destination_snapshots(&self, dataset: &str) -> EngineResult<Vec<Dataset>>;

    /// Sends `end` (incrementally from `begin` when given) into `dataset` on the destination.
    fn transfer(
        &self,
        begin: Option<&Dataset>,
        end: &Dataset,
        dataset: &str,
    ) -> EngineResult<TransferOutcome>;

    /// Destroys a destination snapshot.
    fn destroy(&self, snapshot: &Dataset) -> EngineResult<()>;
}

/// [`SnapshotStore`] backed by `zfs` locally and over a remote shell.
#[derive(Clone, Debug)]
pub struct ZfsStore {
    zfs: Invocation,
    inventory: Inventory,
    remote: Location,
    pipeline: TransferPipeline,
    dry_run: bool,
}

impl ZfsStore {
    /// Builds a store from the run configuration.
    #[must_use]
    pub fn new(config: &ReplicateConfig) -> Self {
        let mut shell = RemoteShell::new(config.destination().host.clone());
        shell.set_program(config.remote_shell().clone());
        Self::with_base(
            Invocation::new(config.zfs().clone()),
            Location::Remote(shell),
            config.dry_run(),
        )
    }

    /// Builds a store whose commands extend `zfs` and whose destination
    /// commands run at `remote`.
    #[must_use]
    pub fn with_base(zfs: Invocation, remote: Location, dry_run: bool) -> Self {
        Self {
            inventory: Inventory::from_base(zfs.clone()),
            pipeline: TransferPipeline::new(zfs.clone(), remote.clone()).dry_run(dry_run),
            zfs,
            remote,
            dry_run,
        }
    }
}

impl SnapshotStore for ZfsStore {
    fn source_exists(&self, dataset: &str) -> EngineResult<bool> {
        Ok(self.inventory.exists(dataset, &Location::Local)?)
    }

    fn source_snapshots(&self, dataset: &str) -> EngineResult<Vec<Dataset>> {
        Ok(self.inventory.snapshots(dataset, &Location::Local)?)
    }

    fn destination_exists(&self, dataset: &str) -> EngineResult<bool> {
        Ok(self.inventory.exists(dataset, &self.remote)?)
    }

    fn destination_snapshots(&self, dataset: &str) -> EngineResult<Vec<Dataset>> {
        Ok(self.inventory.snapshots(dataset, &self.remote)?)
    }

    fn transfer(
        &self,
        begin: Option<&Dataset>,
        end: &Dataset,
        dataset: &str,
    ) -> EngineResult<TransferOutcome> {
        Ok(self
            .pipeline
            .run(begin.map(Dataset::name), end.name(), dataset)?)
    }

    fn destroy(&self, snapshot: &Dataset) -> EngineResult<()> {
        let invocation = self
            .remote
            .wrap(self.zfs.clone().args(["destroy", snapshot.name()]));
        if self.dry_run {
            tracing::info!(target: targets::COMMAND, "+ {invocation}");
            return Ok(());
        }

        let completion = run_collect(&invocation)?;
        if completion.success() {
            Ok(())
        } else {
            Err(EngineError::CommandFailure {
                command: invocation.render(),
                code: completion.code(),
                diagnostics: completion.diagnostics(),
            })
        }
    }
}
