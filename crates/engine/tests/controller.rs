//! Run controller scenarios against a scripted in-memory store.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::rc::Rc;

use engine::signal::{CancellationBroadcaster, ShutdownReason};
use engine::{
    Destination, DestinationLock, EngineError, EngineResult, ReplicateConfig, Replicator,
    RunOutcome, RunState, SnapshotStore,
};
use inventory::{Dataset, DatasetKind};
use tempfile::TempDir;
use time::macros::datetime;
use transport::{Stage, TransferFailure, TransferOutcome};

const SOURCE: &str = "tank/a";
const TARGET: &str = "pool/a";

fn snap(dataset: &str, label: &str) -> Dataset {
    Dataset::new(
        format!("{dataset}@{label}"),
        DatasetKind::Snapshot,
        datetime!(2024-01-01 00:00),
    )
}

fn snaps(dataset: &str, labels: &[&str]) -> Vec<Dataset> {
    labels.iter().map(|label| snap(dataset, label)).collect()
}

/// In-memory hosts. The destination mirrors whatever is "sent" to it.
#[derive(Default)]
struct ScriptedStore {
    source_present: bool,
    source: RefCell<Vec<Dataset>>,
    destination: RefCell<Option<Vec<Dataset>>>,
    parent_present: bool,
    outcomes: RefCell<VecDeque<TransferOutcome>>,
    vanish_on_failure: RefCell<Option<String>>,
    failing_destroys: HashSet<String>,
    on_transfer: Option<Box<dyn Fn()>>,
    on_destroy: Option<Box<dyn Fn()>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedStore {
    fn new(local: &[&str], remote: &[&str]) -> Self {
        let store = Self::without_destination(local);
        *store.destination.borrow_mut() = Some(snaps(TARGET, remote));
        store
    }

    fn without_destination(local: &[&str]) -> Self {
        Self {
            source_present: true,
            source: RefCell::new(snaps(SOURCE, local)),
            parent_present: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn destination_labels(&self) -> Option<Vec<String>> {
        self.destination
            .borrow()
            .as_ref()
            .map(|list| list.iter().map(|s| s.label().to_owned()).collect())
    }

    fn apply_transfer(&self, begin: Option<&Dataset>, end: &Dataset) {
        let source = self.source.borrow();
        let start = begin.map_or(0, |begin| {
            source
                .iter()
                .position(|s| s.same_point(begin))
                .map_or(0, |index| index + 1)
        });
        let stop = source
            .iter()
            .position(|s| s.same_point(end))
            .expect("end snapshot is on the source");

        let mut destination = self.destination.borrow_mut();
        let received = destination.get_or_insert_with(Vec::new);
        for sent in &source[start..=stop] {
            received.push(snap(TARGET, sent.label()));
        }
    }
}

impl SnapshotStore for ScriptedStore {
    fn source_exists(&self, dataset: &str) -> EngineResult<bool> {
        Ok(self.source_present && dataset == SOURCE)
    }

    fn source_snapshots(&self, _dataset: &str) -> EngineResult<Vec<Dataset>> {
        Ok(self.source.borrow().clone())
    }

    fn destination_exists(&self, dataset: &str) -> EngineResult<bool> {
        Ok(match dataset {
            TARGET => self.destination.borrow().is_some(),
            "pool" => self.parent_present,
            _ => false,
        })
    }

    fn destination_snapshots(&self, _dataset: &str) -> EngineResult<Vec<Dataset>> {
        Ok(self.destination.borrow().clone().unwrap_or_default())
    }

    fn transfer(
        &self,
        begin: Option<&Dataset>,
        end: &Dataset,
        dataset: &str,
    ) -> EngineResult<TransferOutcome> {
        assert_eq!(dataset, TARGET);
        self.calls.borrow_mut().push(match begin {
            Some(begin) => format!("send -I {} {}", begin.name(), end.name()),
            None => format!("send {}", end.name()),
        });
        if let Some(hook) = &self.on_transfer {
            hook();
        }

        let outcome = self
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(TransferOutcome::Success);
        match &outcome {
            TransferOutcome::Success => self.apply_transfer(begin, end),
            TransferOutcome::TransientSnapshotVanished(_) => {
                if let Some(label) = self.vanish_on_failure.borrow_mut().take() {
                    self.source.borrow_mut().retain(|s| s.label() != label);
                }
            }
            _ => {}
        }
        Ok(outcome)
    }

    fn destroy(&self, snapshot: &Dataset) -> EngineResult<()> {
        self.calls
            .borrow_mut()
            .push(format!("destroy {}", snapshot.name()));
        if let Some(hook) = &self.on_destroy {
            hook();
        }
        if self.failing_destroys.contains(snapshot.name()) {
            return Err(EngineError::CommandFailure {
                command: format!("zfs destroy {}", snapshot.name()),
                code: 1,
                diagnostics: "dataset is busy".to_owned(),
            });
        }
        if let Some(list) = self.destination.borrow_mut().as_mut() {
            list.retain(|s| s.name() != snapshot.name());
        }
        Ok(())
    }
}

struct Harness {
    lock_dir: TempDir,
    signals: Rc<CancellationBroadcaster>,
}

impl Harness {
    fn new() -> Self {
        Self {
            lock_dir: tempfile::tempdir().unwrap(),
            signals: Rc::new(CancellationBroadcaster::new()),
        }
    }

    fn config(&self, unattended: bool) -> ReplicateConfig {
        ReplicateConfig::builder(SOURCE, Destination::parse("nas.lan:pool/a").unwrap())
            .unattended(unattended)
            .lock_dir(self.lock_dir.path())
            .build()
    }

    fn run(&self, store: &ScriptedStore) -> EngineResult<RunOutcome> {
        self.run_with(store, &self.config(false))
    }

    fn run_with(
        &self,
        store: &ScriptedStore,
        config: &ReplicateConfig,
    ) -> EngineResult<RunOutcome> {
        Replicator::new(store, config, &self.signals).run()
    }

    fn lock_dir_is_empty(&self) -> bool {
        dir_is_empty(self.lock_dir.path())
    }
}

fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}

fn replicated(outcome: RunOutcome) -> engine::RunReport {
    match outcome {
        RunOutcome::Replicated(report) => report,
        other => panic!("expected a replication, got {other:?}"),
    }
}

#[test]
fn incremental_transfer_from_common_snapshot() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2", "3"], &["1", "2"]);

    let report = replicated(harness.run(&store).unwrap());

    assert_eq!(store.calls(), ["send -I tank/a@2 tank/a@3"]);
    assert_eq!(report.transfers, ["tank/a@2..tank/a@3"]);
    assert!(report.pruned.is_empty());
    assert_eq!(report.attempts, 1);
    assert!(harness.lock_dir_is_empty());
}

#[test]
fn destination_ahead_is_pruned_without_transfer() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2"], &["1", "2", "3"]);

    let report = replicated(harness.run(&store).unwrap());

    assert_eq!(store.calls(), ["destroy pool/a@3"]);
    assert_eq!(report.pruned, ["pool/a@3"]);
    assert!(report.transfers.is_empty());
    assert_eq!(store.destination_labels().unwrap(), ["1", "2"]);
}

#[test]
fn prune_runs_newest_first_before_transfer() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2", "5"], &["1", "2", "3", "4"]);

    harness.run(&store).unwrap();

    assert_eq!(
        store.calls(),
        [
            "destroy pool/a@4",
            "destroy pool/a@3",
            "send -I tank/a@2 tank/a@5"
        ]
    );
    assert_eq!(store.destination_labels().unwrap(), ["1", "2", "5"]);
}

#[test]
fn missing_destination_gets_staging_then_incremental() {
    let harness = Harness::new();
    let store = ScriptedStore::without_destination(&["1", "2", "3"]);

    let report = replicated(harness.run(&store).unwrap());

    assert_eq!(
        store.calls(),
        ["send tank/a@1", "send -I tank/a@1 tank/a@3"]
    );
    assert_eq!(report.transfers, ["tank/a@1", "tank/a@1..tank/a@3"]);
    assert_eq!(store.destination_labels().unwrap(), ["1", "2", "3"]);
}

#[test]
fn single_snapshot_needs_only_staging() {
    let harness = Harness::new();
    let store = ScriptedStore::without_destination(&["1"]);

    harness.run(&store).unwrap();

    assert_eq!(store.calls(), ["send tank/a@1"]);
}

#[test]
fn vanished_snapshot_restarts_from_planning() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2", "3", "4"], &["1", "2"]);
    store
        .outcomes
        .borrow_mut()
        .push_back(TransferOutcome::TransientSnapshotVanished("tank/a@3".to_owned()));
    *store.vanish_on_failure.borrow_mut() = Some("3".to_owned());

    let report = replicated(harness.run(&store).unwrap());

    assert_eq!(report.attempts, 2);
    assert_eq!(
        store.calls(),
        ["send -I tank/a@2 tank/a@4", "send -I tank/a@2 tank/a@4"]
    );
    assert_eq!(store.destination_labels().unwrap(), ["1", "2", "4"]);
    assert!(harness.lock_dir_is_empty());
}

#[test]
fn vanished_snapshot_after_staging_plans_incrementally() {
    let harness = Harness::new();
    let store = ScriptedStore::without_destination(&["1", "2", "3"]);
    store.outcomes.borrow_mut().extend([
        TransferOutcome::Success,
        TransferOutcome::TransientSnapshotVanished("tank/a@3".to_owned()),
    ]);
    *store.vanish_on_failure.borrow_mut() = Some("3".to_owned());

    let report = replicated(harness.run(&store).unwrap());

    assert_eq!(
        store.calls(),
        [
            "send tank/a@1",
            "send -I tank/a@1 tank/a@3",
            "send -I tank/a@1 tank/a@2"
        ]
    );
    assert_eq!(report.attempts, 2);
    assert_eq!(report.transfers, ["tank/a@1", "tank/a@1..tank/a@2"]);
    assert_eq!(store.destination_labels().unwrap(), ["1", "2"]);
    assert!(harness.lock_dir_is_empty());
}

#[test]
fn second_run_is_a_noop() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2", "3"], &["1"]);

    replicated(harness.run(&store).unwrap());
    let calls = store.calls().len();
    let second = harness.run(&store).unwrap();

    assert_eq!(
        second,
        RunOutcome::UpToDate {
            snapshot: "3".to_owned()
        }
    );
    assert_eq!(store.calls().len(), calls);
}

#[test]
fn up_to_date_run_does_not_take_the_lock() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2"], &["1", "2"]);
    let _held = DestinationLock::acquire(harness.lock_dir.path(), "nas.lan", TARGET).unwrap();

    let outcome = harness.run(&store).unwrap();

    assert!(matches!(outcome, RunOutcome::UpToDate { .. }));
}

#[test]
fn busy_destination_is_skipped_in_unattended_mode() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2"], &["1"]);
    let held = DestinationLock::acquire(harness.lock_dir.path(), "nas", TARGET).unwrap();

    let outcome = harness.run_with(&store, &harness.config(true)).unwrap();

    assert_eq!(
        outcome,
        RunOutcome::SkippedBusy {
            lock: held.path().to_path_buf()
        }
    );
    assert_eq!(outcome.exit_code().as_i32(), 0);
    assert!(store.calls().is_empty());
}

#[test]
fn busy_destination_is_an_error_in_interactive_mode() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2"], &["1"]);
    let _held = DestinationLock::acquire(harness.lock_dir.path(), "nas", TARGET).unwrap();

    let err = harness.run(&store).unwrap_err();

    assert!(matches!(err, EngineError::LockHeld { ref host, .. } if host == "nas.lan"));
    assert!(store.calls().is_empty());
}

#[test]
fn disjoint_histories_are_terminal() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2"], &["x"]);

    let err = harness.run(&store).unwrap_err();

    assert!(matches!(err, EngineError::NoCommonSnapshot { .. }));
    assert!(err.to_string().contains("full replication"));
    assert!(store.calls().is_empty());
}

#[test]
fn missing_source_fails_validation() {
    let harness = Harness::new();
    let mut store = ScriptedStore::new(&["1"], &["1"]);
    store.source_present = false;

    let err = harness.run(&store).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ref message) if message.contains("does not exist")
    ));
}

#[test]
fn source_without_snapshots_fails_validation() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&[], &["1"]);

    let err = harness.run(&store).unwrap_err();
    assert!(matches!(
        err,
        EngineError::Validation(ref message) if message.contains("no snapshots")
    ));
}

#[test]
fn missing_destination_and_parent_fails_validation() {
    let harness = Harness::new();
    let mut store = ScriptedStore::without_destination(&["1"]);
    store.parent_present = false;

    let config = harness.config(false);
    let mut replicator = Replicator::new(&store, &config, &harness.signals);
    let err = replicator.run().unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert_eq!(replicator.state(), RunState::Validating);
}

#[test]
fn transfer_failure_releases_the_lock() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2"], &["1"]);
    store
        .outcomes
        .borrow_mut()
        .push_back(TransferOutcome::Failure(TransferFailure {
            stage: Stage::Consumer,
            code: 1,
            diagnostics: "cannot receive: out of space".to_owned(),
        }));

    let err = harness.run(&store).unwrap_err();

    match err {
        EngineError::TransferFailed {
            snapshot,
            stage,
            diagnostics,
            ..
        } => {
            assert_eq!(snapshot, "tank/a@2");
            assert_eq!(stage, Stage::Consumer);
            assert!(diagnostics.contains("out of space"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness.lock_dir_is_empty());
}

#[test]
fn destroy_failure_stops_pruning() {
    let harness = Harness::new();
    let mut store = ScriptedStore::new(&["1"], &["1", "2", "3"]);
    store.failing_destroys.insert("pool/a@3".to_owned());

    let err = harness.run(&store).unwrap_err();

    assert!(matches!(err, EngineError::CommandFailure { .. }));
    assert_eq!(store.calls(), ["destroy pool/a@3"]);
    assert_eq!(store.destination_labels().unwrap(), ["1", "2", "3"]);
    assert!(harness.lock_dir_is_empty());
}

#[test]
fn signal_during_transfer_aborts_the_run() {
    let harness = Harness::new();
    let signals = Rc::clone(&harness.signals);
    let mut store = ScriptedStore::without_destination(&["1", "2", "3"]);
    store.on_transfer = Some(Box::new(move || {
        signals.fire(ShutdownReason::Terminated);
    }));

    let err = harness.run(&store).unwrap_err();

    assert!(matches!(err, EngineError::SignalAbort(ShutdownReason::Terminated)));
    assert_eq!(store.calls(), ["send tank/a@1"]);
    assert!(harness.lock_dir_is_empty());
}

#[test]
fn signal_during_pruning_stops_before_the_next_destroy() {
    let harness = Harness::new();
    let signals = Rc::clone(&harness.signals);
    let mut store = ScriptedStore::new(&["1", "2"], &["1", "2", "3", "4"]);
    store.on_destroy = Some(Box::new(move || {
        signals.fire(ShutdownReason::Interrupted);
    }));

    let err = harness.run(&store).unwrap_err();

    assert!(matches!(err, EngineError::SignalAbort(ShutdownReason::Interrupted)));
    assert_eq!(store.calls(), ["destroy pool/a@4"]);
    assert_eq!(store.destination_labels().unwrap(), ["1", "2", "3"]);
    assert!(harness.lock_dir_is_empty());
}

#[test]
fn end_snapshot_override_limits_the_transfer() {
    let harness = Harness::new();
    let store = ScriptedStore::new(&["1", "2", "3"], &["1"]);
    let config = ReplicateConfig::builder(SOURCE, Destination::parse("nas:pool/a").unwrap())
        .end_snapshot(Some("2".to_owned()))
        .lock_dir(harness.lock_dir.path())
        .build();

    harness.run_with(&store, &config).unwrap();

    assert_eq!(store.calls(), ["send -I tank/a@1 tank/a@2"]);
}
