//! crates/engine/src/plan.rs
//!
//! Reconciliation of source and destination snapshot histories.

use inventory::Dataset;

use crate::error::PlanError;

/// What a run has to do to bring the destination up to date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationPlan {
    begin: Option<Dataset>,
    end: Dataset,
    staging: Option<Dataset>,
    obsolete: Vec<Dataset>,
}

impl ReplicationPlan {
    /// Newest source snapshot the destination already has.
    #[must_use]
    pub const fn begin(&self) -> Option<&Dataset> {
        self.begin.as_ref()
    }

    /// Source snapshot the destination should end at.
    #[must_use]
    pub const fn end(&self) -> &Dataset {
        &self.end
    }

    /// Oldest source snapshot, sent in full when there is no common point.
    #[must_use]
    pub const fn staging(&self) -> Option<&Dataset> {
        self.staging.as_ref()
    }

    /// Destination snapshots newer than the common point, newest-first.
    #[must_use]
    pub fn obsolete(&self) -> &[Dataset] {
        &self.obsolete
    }

    /// Whether a full transfer must seed the destination first.
    #[must_use]
    pub const fn needs_staging(&self) -> bool {
        self.begin.is_none()
    }

    /// Whether the destination already holds the end snapshot.
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.begin
            .as_ref()
            .is_some_and(|begin| begin.same_point(&self.end))
    }

    /// Whether the run has nothing to transfer and nothing to prune.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.is_up_to_date() && self.obsolete.is_empty()
    }
}

/// Computes the plan from oldest-first snapshot lists.
///
/// The destination list is walked newest-first. The first destination
/// snapshot whose label exists in `local` is the common point; every
/// destination snapshot visited before it is obsolete. `end_override`
/// selects the end snapshot by label or full name instead of the newest.
///
/// ```
/// use engine::plan;
/// use inventory::{Dataset, DatasetKind};
/// use time::macros::datetime;
///
/// let created = datetime!(2024-01-01 00:00);
/// let snap = |name: &str| Dataset::new(name, DatasetKind::Snapshot, created);
/// let local = [snap("tank@1"), snap("tank@2"), snap("tank@3")];
/// let remote = [snap("pool@1"), snap("pool@2")];
///
/// let plan = plan(&local, &remote, None).unwrap();
/// assert_eq!(plan.begin().map(Dataset::name), Some("tank@2"));
/// assert_eq!(plan.end().name(), "tank@3");
/// assert!(plan.obsolete().is_empty());
/// ```
///
/// # Errors
///
/// See [`PlanError`].
pub fn plan(
    local: &[Dataset],
    remote: &[Dataset],
    end_override: Option<&str>,
) -> Result<ReplicationPlan, PlanError> {
    let Some(oldest) = local.first() else {
        return Err(PlanError::NoSourceSnapshots);
    };

    let end_index = match end_override {
        None => local.len() - 1,
        Some(wanted) => local
            .iter()
            .position(|snapshot| snapshot.label() == wanted || snapshot.name() == wanted)
            .ok_or_else(|| PlanError::EndSnapshotNotFound(wanted.to_owned()))?,
    };
    let end = local[end_index].clone();

    if remote.is_empty() {
        return Ok(ReplicationPlan {
            begin: None,
            end,
            staging: Some(oldest.clone()),
            obsolete: Vec::new(),
        });
    }

    let mut obsolete = Vec::new();
    for candidate in remote.iter().rev() {
        let common = local
            .iter()
            .position(|snapshot| snapshot.label() == candidate.label());
        let Some(begin_index) = common else {
            obsolete.push(candidate.clone());
            continue;
        };

        if begin_index > end_index {
            return Err(PlanError::EndBeforeBegin {
                begin: local[begin_index].name().to_owned(),
                end: end.name().to_owned(),
            });
        }
        return Ok(ReplicationPlan {
            begin: Some(local[begin_index].clone()),
            end,
            staging: None,
            obsolete,
        });
    }

    Err(PlanError::NoCommonSnapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory::DatasetKind;
    use time::macros::datetime;

    fn snapshots(dataset: &str, labels: &[&str]) -> Vec<Dataset> {
        labels
            .iter()
            .map(|label| {
                Dataset::new(
                    format!("{dataset}@{label}"),
                    DatasetKind::Snapshot,
                    datetime!(2024-01-01 00:00),
                )
            })
            .collect()
    }

    fn names(records: &[Dataset]) -> Vec<&str> {
        records.iter().map(Dataset::name).collect()
    }

    #[test]
    fn empty_source_is_rejected() {
        let remote = snapshots("pool/a", &["1"]);
        assert_eq!(plan(&[], &remote, None), Err(PlanError::NoSourceSnapshots));
    }

    #[test]
    fn empty_destination_needs_full_replication() {
        let local = snapshots("a", &["1", "2", "3"]);

        let plan = plan(&local, &[], None).unwrap();

        assert!(plan.needs_staging());
        assert_eq!(plan.staging().map(Dataset::name), Some("a@1"));
        assert_eq!(plan.end().name(), "a@3");
        assert!(plan.obsolete().is_empty());
    }

    #[test]
    fn incremental_from_newest_common() {
        let local = snapshots("a", &["1", "2", "3"]);
        let remote = snapshots("b", &["1", "2"]);

        let plan = plan(&local, &remote, None).unwrap();

        assert_eq!(plan.begin().map(Dataset::name), Some("a@2"));
        assert_eq!(plan.end().name(), "a@3");
        assert!(!plan.needs_staging());
        assert!(plan.obsolete().is_empty());
        assert!(!plan.is_up_to_date());
    }

    #[test]
    fn destination_ahead_is_pruned() {
        let local = snapshots("a", &["1", "2"]);
        let remote = snapshots("b", &["1", "2", "3"]);

        let plan = plan(&local, &remote, None).unwrap();

        assert_eq!(plan.begin().map(Dataset::name), Some("a@2"));
        assert_eq!(names(plan.obsolete()), ["b@3"]);
        assert!(plan.is_up_to_date());
        assert!(!plan.is_noop());
    }

    #[test]
    fn obsolete_is_newest_first() {
        let local = snapshots("a", &["1", "2", "5"]);
        let remote = snapshots("b", &["1", "2", "3", "4"]);

        let plan = plan(&local, &remote, None).unwrap();

        assert_eq!(names(plan.obsolete()), ["b@4", "b@3"]);
        assert_eq!(plan.end().name(), "a@5");
    }

    #[test]
    fn identical_histories_are_a_noop() {
        let local = snapshots("a", &["1", "2"]);
        let remote = snapshots("b", &["1", "2"]);

        assert!(plan(&local, &remote, None).unwrap().is_noop());
    }

    #[test]
    fn disjoint_histories_have_no_common_snapshot() {
        let local = snapshots("a", &["1", "2"]);
        let remote = snapshots("b", &["x", "y"]);

        assert_eq!(plan(&local, &remote, None), Err(PlanError::NoCommonSnapshot));
    }

    #[test]
    fn end_override_by_label_or_name() {
        let local = snapshots("a", &["1", "2", "3"]);
        let remote = snapshots("b", &["1"]);

        let by_label = plan(&local, &remote, Some("2")).unwrap();
        let by_name = plan(&local, &remote, Some("a@2")).unwrap();

        assert_eq!(by_label.end().name(), "a@2");
        assert_eq!(by_label, by_name);
    }

    #[test]
    fn unknown_end_override_is_rejected() {
        let local = snapshots("a", &["1"]);
        assert_eq!(
            plan(&local, &[], Some("9")),
            Err(PlanError::EndSnapshotNotFound("9".to_owned()))
        );
    }

    #[test]
    fn end_before_common_point_is_rejected() {
        let local = snapshots("a", &["1", "2", "3"]);
        let remote = snapshots("b", &["1", "2", "3"]);

        assert_eq!(
            plan(&local, &remote, Some("1")),
            Err(PlanError::EndBeforeBegin {
                begin: "a@3".to_owned(),
                end: "a@1".to_owned(),
            })
        );
    }
}
