//! crates/inventory/src/query.rs
//!
//! `zfs list` queries against a local or remote host.

use regex::Regex;
use transport::{Invocation, Location, run_collect};

use crate::dataset::{Dataset, DatasetKind};
use crate::error::InventoryError;
use crate::listing::parse_listing;

/// Runs inventory queries with a configurable `zfs` command.
#[derive(Clone, Debug)]
pub struct Inventory {
    base: Invocation,
}

impl Inventory {
    /// Creates an inventory whose queries extend `base`.
    #[must_use]
    pub const fn from_base(base: Invocation) -> Self {
        Self { base }
    }

    /// Lists records of `kind` whose full name matches `pattern`, oldest-first.
    ///
    /// `root` restricts the listing to a dataset and its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`InventoryError::CommandFailure`] with the command's
    /// diagnostics when `zfs list` fails, or a parse error for bad output.
    pub fn list(
        &self,
        kind: DatasetKind,
        pattern: &Regex,
        root: Option<&str>,
        scope: &Location,
    ) -> Result<Vec<Dataset>, InventoryError> {
        let mut invocation = self.base.clone().args([
            "list",
            "-H",
            "-o",
            "name,creation",
            "-s",
            "creation",
            "-t",
            kind.as_zfs_type(),
        ]);
        if let Some(root) = root {
            invocation = invocation.args(["-r", root]);
        }
        let invocation = scope.wrap(invocation);

        let completion = run_collect(&invocation)?;
        if !completion.success() {
            return Err(InventoryError::CommandFailure {
                command: invocation.render(),
                code: completion.code(),
                stderr: completion.diagnostics(),
            });
        }

        let records = parse_listing(completion.stdout_lines(), kind, pattern)?;
        tracing::debug!(
            pattern = pattern.as_str(),
            count = records.len(),
            "inventory listed"
        );
        Ok(records)
    }

    /// Snapshots of exactly `dataset`, oldest-first.
    ///
    /// # Errors
    ///
    /// See [`Inventory::list`].
    pub fn snapshots(
        &self,
        dataset: &str,
        scope: &Location,
    ) -> Result<Vec<Dataset>, InventoryError> {
        let pattern = Regex::new(&format!("^{}@", regex::escape(dataset)))?;
        self.list(DatasetKind::Snapshot, &pattern, Some(dataset), scope)
    }

    /// The single record named `name`.
    ///
    /// # Errors
    ///
    /// [`InventoryError::NoSuchDataset`] when nothing matches and
    /// [`InventoryError::DuplicateDataset`] when more than one record does.
    pub fn fetch(&self, name: &str, scope: &Location) -> Result<Dataset, InventoryError> {
        let pattern = Regex::new(&format!("^{}$", regex::escape(name)))?;
        let mut records = self.list(DatasetKind::All, &pattern, None, scope)?;
        match records.len() {
            0 => Err(InventoryError::NoSuchDataset(name.to_owned())),
            1 => Ok(records.remove(0)),
            count => Err(InventoryError::DuplicateDataset {
                name: name.to_owned(),
                count,
            }),
        }
    }

    /// Whether `name` exists.
    ///
    /// # Errors
    ///
    /// Any [`Inventory::fetch`] error other than
    /// [`InventoryError::NoSuchDataset`].
    pub fn exists(&self, name: &str, scope: &Location) -> Result<bool, InventoryError> {
        match self.fetch(name, scope) {
            Ok(_) => Ok(true),
            Err(InventoryError::NoSuchDataset(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }
}
