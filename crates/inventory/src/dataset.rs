//! crates/inventory/src/dataset.rs
//!
//! Dataset and snapshot records.

use std::fmt;

use time::PrimitiveDateTime;

/// Object types understood by `zfs list -t`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DatasetKind {
    /// Every type.
    All,
    /// File systems.
    Filesystem,
    /// Volumes.
    Volume,
    /// Snapshots.
    Snapshot,
}

impl DatasetKind {
    /// Value passed to `zfs list -t`.
    #[must_use]
    pub const fn as_zfs_type(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Filesystem => "filesystem",
            Self::Volume => "volume",
            Self::Snapshot => "snapshot",
        }
    }
}

/// One row of a `zfs list` result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataset {
    name: String,
    kind: DatasetKind,
    creation: PrimitiveDateTime,
}

impl Dataset {
    /// Creates a record.
    ///
    /// Records from an untyped listing are classified as snapshots when the
    /// name carries an `@` label.
    pub fn new(name: impl Into<String>, kind: DatasetKind, creation: PrimitiveDateTime) -> Self {
        let name = name.into();
        let kind = match kind {
            DatasetKind::All if name.contains('@') => DatasetKind::Snapshot,
            other => other,
        };
        Self {
            name,
            kind,
            creation,
        }
    }

    /// Fully qualified name, e.g. `tank/home@daily-1`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type the record was listed as.
    #[must_use]
    pub const fn kind(&self) -> DatasetKind {
        self.kind
    }

    /// Creation time as reported by `zfs`.
    #[must_use]
    pub const fn creation(&self) -> PrimitiveDateTime {
        self.creation
    }

    /// Snapshot label after `@`, or the empty string for non-snapshots.
    #[must_use]
    pub fn label(&self) -> &str {
        self.name.split_once('@').map_or("", |(_, label)| label)
    }

    /// Whether the name carries an `@` label.
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        self.name.contains('@')
    }

    /// Two snapshots denote the same point when their labels are equal.
    ///
    /// The parent path and creation time are ignored: the same snapshot has
    /// different parents on the source and destination hosts.
    #[must_use]
    pub fn same_point(&self, other: &Self) -> bool {
        self.is_snapshot() && other.is_snapshot() && self.label() == other.label()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn snapshot(name: &str) -> Dataset {
        Dataset::new(name, DatasetKind::Snapshot, datetime!(2024-01-01 12:00))
    }

    #[test]
    fn splits_label() {
        let record = snapshot("tank/home@daily-1");
        assert_eq!(record.label(), "daily-1");
        assert!(record.is_snapshot());
    }

    #[test]
    fn filesystem_has_no_label() {
        let record = Dataset::new(
            "tank/home",
            DatasetKind::Filesystem,
            datetime!(2024-01-01 00:00),
        );
        assert_eq!(record.label(), "");
        assert!(!record.is_snapshot());
    }

    #[test]
    fn untyped_snapshot_is_classified() {
        let record = Dataset::new("tank@a", DatasetKind::All, datetime!(2024-01-01 00:00));
        assert_eq!(record.kind(), DatasetKind::Snapshot);
        let record = Dataset::new("tank", DatasetKind::All, datetime!(2024-01-01 00:00));
        assert_eq!(record.kind(), DatasetKind::All);
    }

    #[test]
    fn same_point_compares_labels_only() {
        let local = snapshot("tank/home@daily-1");
        let remote = Dataset::new(
            "backup/home@daily-1",
            DatasetKind::Snapshot,
            datetime!(2030-05-05 05:05),
        );
        assert!(local.same_point(&remote));
        assert!(!local.same_point(&snapshot("tank/home@daily-2")));
    }

    #[test]
    fn display_is_the_name() {
        assert_eq!(snapshot("tank@x").to_string(), "tank@x");
    }
}
