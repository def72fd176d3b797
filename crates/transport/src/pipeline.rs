//! crates/transport/src/pipeline.rs
//!
//! The `zfs send | zfs receive` transfer pipeline.
//!
//! The producer's stdout is handed to the consumer as its stdin, so snapshot
//! data flows between the two children without being copied through this
//! process. The parent only watches the producer's stderr and both consumer
//! streams, which are drained concurrently by [`StreamMultiplexer`].

use std::process::{Child, Stdio};

use logging::targets;

use crate::drain::{Stage, StreamKind, StreamMultiplexer, StreamSource};
use crate::error::TransportError;
use crate::invocation::{Invocation, Location};
use crate::process::exit_code_of;

const VANISHED_PREFIX: &str = "warning: cannot send '";
const VANISHED_SUFFIX: &str = "': no such pool or dataset";

/// Exit code of a process killed by SIGPIPE.
#[cfg(unix)]
const BROKEN_PIPE_EXIT: Option<i32> = Some(128 + libc::SIGPIPE);
#[cfg(not(unix))]
const BROKEN_PIPE_EXIT: Option<i32> = None;

/// Diagnostic details of a failed transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferFailure {
    /// Which side failed.
    pub stage: Stage,
    /// Exit code of the failing side.
    pub code: i32,
    /// Standard error collected from the failing side.
    pub diagnostics: String,
}

/// How a transfer ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Both sides exited successfully.
    Success,
    /// The producer reported that a snapshot disappeared mid-run.
    ///
    /// Someone else destroyed the snapshot, typically a rotation job. The
    /// run can be restarted from a fresh inventory.
    TransientSnapshotVanished(String),
    /// One side exited unsuccessfully.
    Failure(TransferFailure),
    /// Dry-run: the pipeline was described but not executed.
    Simulated(String),
}

/// Recognises the producer's vanished-snapshot warning and extracts the name.
///
/// ```
/// use transport::detect_vanished_snapshot;
///
/// assert_eq!(
///     detect_vanished_snapshot("warning: cannot send 'tank/a@s2': no such pool or dataset"),
///     Some("tank/a@s2"),
/// );
/// assert_eq!(detect_vanished_snapshot("cannot open 'tank/a'"), None);
/// ```
#[must_use]
pub fn detect_vanished_snapshot(line: &str) -> Option<&str> {
    let name = line
        .trim_end()
        .strip_prefix(VANISHED_PREFIX)?
        .strip_suffix(VANISHED_SUFFIX)?;
    (!name.is_empty() && !name.contains('\'')).then_some(name)
}

/// Runs `producer | consumer` and resolves the outcome.
///
/// Resolution order: a vanished-snapshot warning from the producer wins over
/// everything, then a producer failure, then a consumer failure. A producer
/// that died of SIGPIPE because the consumer failed first is not reported
/// on its own: the consumer's failure and diagnostics are.
///
/// # Errors
///
/// Fails when either side cannot be spawned or waited on, or when a
/// monitored stream cannot be read. If the consumer fails to start, the
/// already running producer is killed and reaped first.
pub fn run_pipeline(
    producer: &Invocation,
    consumer: &Invocation,
) -> Result<TransferOutcome, TransportError> {
    tracing::info!(target: targets::COMMAND, "+ {producer} | {consumer}");

    let producer_name = producer.program().to_string_lossy().into_owned();
    let consumer_name = consumer.program().to_string_lossy().into_owned();

    let mut producer_child = producer
        .command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| TransportError::Spawn {
            program: producer_name.clone(),
            source,
        })?;

    let Some(payload) = producer_child.stdout.take() else {
        reap(&mut producer_child);
        return Err(TransportError::MissingPipe {
            program: producer_name,
            stream: "stdout",
        });
    };

    // The Command owns the only parent-side copy of the payload pipe and is
    // dropped right after spawning, so the consumer sees EOF when the
    // producer exits.
    let spawned = consumer
        .command()
        .stdin(Stdio::from(payload))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();
    let mut consumer_child = match spawned {
        Ok(child) => child,
        Err(source) => {
            reap(&mut producer_child);
            return Err(TransportError::Spawn {
                program: consumer_name,
                source,
            });
        }
    };

    let mut streams = StreamMultiplexer::new();
    if let Some(stderr) = producer_child.stderr.take() {
        streams.attach(stderr, StreamSource::new(Stage::Producer, StreamKind::Stderr));
    }
    if let Some(stdout) = consumer_child.stdout.take() {
        streams.attach(stdout, StreamSource::new(Stage::Consumer, StreamKind::Stdout));
    }
    if let Some(stderr) = consumer_child.stderr.take() {
        streams.attach(stderr, StreamSource::new(Stage::Consumer, StreamKind::Stderr));
    }

    let mut vanished: Option<String> = None;
    let mut producer_diagnostics = Vec::new();
    let mut consumer_diagnostics = Vec::new();
    let drained = streams.drain(|source, line| {
        tracing::info!(target: targets::REMOTE, "{line}");
        match source.stage {
            Stage::Producer => {
                if vanished.is_none() {
                    vanished = detect_vanished_snapshot(line).map(str::to_owned);
                }
                producer_diagnostics.push(line.to_owned());
            }
            Stage::Consumer | Stage::Command => consumer_diagnostics.push(line.to_owned()),
        }
    });

    let producer_status = producer_child
        .wait()
        .map_err(|source| TransportError::Wait {
            program: producer_name,
            source,
        })?;
    let consumer_status = consumer_child
        .wait()
        .map_err(|source| TransportError::Wait {
            program: consumer_name,
            source,
        })?;
    drained.map_err(|source| TransportError::Stream {
        command: format!("{producer} | {consumer}"),
        source,
    })?;

    let producer = SideResult {
        code: exit_code_of(producer_status),
        diagnostics: producer_diagnostics,
    };
    let consumer = SideResult {
        code: exit_code_of(consumer_status),
        diagnostics: consumer_diagnostics,
    };
    tracing::debug!(
        producer_code = producer.code,
        consumer_code = consumer.code,
        "pipeline finished"
    );
    Ok(resolve(vanished, producer, consumer))
}

struct SideResult {
    code: i32,
    diagnostics: Vec<String>,
}

impl SideResult {
    const fn failed(&self) -> bool {
        self.code != 0
    }
}

/// Picks the outcome reported for a finished pipeline.
///
/// A producer killed by SIGPIPE only saw the consumer go away, so a failing
/// consumer is reported instead. When both sides fail for their own reasons
/// the producer is reported and the consumer's lines are appended to its
/// diagnostics.
fn resolve(
    vanished: Option<String>,
    producer: SideResult,
    consumer: SideResult,
) -> TransferOutcome {
    if let Some(snapshot) = vanished {
        return TransferOutcome::TransientSnapshotVanished(snapshot);
    }

    let producer_broken_pipe = BROKEN_PIPE_EXIT == Some(producer.code);
    if producer.failed() && !(producer_broken_pipe && consumer.failed()) {
        let mut diagnostics = producer.diagnostics;
        if consumer.failed() {
            diagnostics.extend(consumer.diagnostics);
        }
        return TransferOutcome::Failure(TransferFailure {
            stage: Stage::Producer,
            code: producer.code,
            diagnostics: diagnostics.join("\n"),
        });
    }
    if consumer.failed() {
        return TransferOutcome::Failure(TransferFailure {
            stage: Stage::Consumer,
            code: consumer.code,
            diagnostics: consumer.diagnostics.join("\n"),
        });
    }
    TransferOutcome::Success
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Builds and runs transfers of one snapshot range to a destination.
#[derive(Clone, Debug)]
pub struct TransferPipeline {
    zfs: Invocation,
    destination: Location,
    dry_run: bool,
}

impl TransferPipeline {
    /// Creates a pipeline using `zfs` as the base command on both sides.
    #[must_use]
    pub const fn new(zfs: Invocation, destination: Location) -> Self {
        Self {
            zfs,
            destination,
            dry_run: false,
        }
    }

    /// Describes transfers instead of executing them.
    #[must_use]
    pub const fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Sending command: a full stream of `end`, or every snapshot after `begin` up to `end`.
    #[must_use]
    pub fn producer(&self, begin: Option<&str>, end: &str) -> Invocation {
        let mut invocation = self.zfs.clone().arg("send");
        if let Some(begin) = begin {
            invocation = invocation.arg("-I").arg(begin);
        }
        invocation.arg(end)
    }

    /// Receiving command, wrapped for the destination host.
    #[must_use]
    pub fn consumer(&self, dataset: &str) -> Invocation {
        self.destination
            .wrap(self.zfs.clone().args(["receive", "-F", dataset]))
    }

    /// Transfers `begin..=end` into `dataset` on the destination.
    ///
    /// # Errors
    ///
    /// Propagates [`run_pipeline`] errors.
    pub fn run(
        &self,
        begin: Option<&str>,
        end: &str,
        dataset: &str,
    ) -> Result<TransferOutcome, TransportError> {
        let producer = self.producer(begin, end);
        let consumer = self.consumer(dataset);
        if self.dry_run {
            let description = format!("{producer} | {consumer}");
            tracing::info!(target: targets::COMMAND, "+ {description}");
            return Ok(TransferOutcome::Simulated(description));
        }
        run_pipeline(&producer, &consumer)
    }
}
