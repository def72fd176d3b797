#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` is the command-line front-end of `zfs-replicate`. It parses
//! `zfs-replicate [OPTIONS] FILESYSTEM DESTINATION`, builds an
//! [`engine::ReplicateConfig`], installs logging and signal handling, and
//! hands the run to [`engine::Replicator`].
//!
//! # Design
//!
//! [`run`] takes the argument iterator together with handles for standard
//! output and error so the whole surface can be exercised in-process. A
//! [`clap`](https://docs.rs/clap/) builder performs the parse; help and
//! version output are rendered by this crate so their wording stays stable.
//!
//! # Errors
//!
//! Argument errors and run failures are written to the error handle as
//! `zfs-replicate: error: ...` and map to exit code `1`. A busy destination
//! in quiet mode is not an error.
//!
//! # Examples
//!
//! ```
//! let mut stdout = Vec::new();
//! let mut stderr = Vec::new();
//! let status = cli::run(["zfs-replicate", "--version"], &mut stdout, &mut stderr);
//!
//! assert_eq!(status, 0);
//! assert!(String::from_utf8(stdout).unwrap().starts_with("zfs-replicate "));
//! ```

use std::env;
use std::ffi::OsString;
use std::io::Write;

use clap::{Arg, ArgAction, Command, builder::OsStringValueParser};
use engine::signal::{self, install_signal_handlers};
use engine::{Destination, EngineError, ReplicateConfig, Replicator, ZfsStore};
use logging::{PROGRAM_PREFIX, VerbosityConfig, init_tracing};

/// Maximum exit code representable by a Unix process.
const MAX_EXIT_CODE: i32 = u8::MAX as i32;

const HELP_TEXT: &str = concat!(
    "Usage: zfs-replicate [OPTIONS] FILESYSTEM DESTINATION\n",
    "\n",
    "Replicate the snapshots of a local ZFS FILESYSTEM to DESTINATION, given\n",
    "as HOST:DATASET. Only snapshots the destination lacks are sent; snapshots\n",
    "the destination has beyond the newest common one are destroyed first.\n",
    "\n",
    "Options:\n",
    "  -q, --quiet               Unattended mode: skip silently when another run\n",
    "                            holds the destination, print errors only.\n",
    "  -e, --end-snapshot SNAP   Replicate up to SNAP instead of the newest snapshot.\n",
    "  -v, --verbose             Echo every command and relay remote output.\n",
    "  -n, --dry-run             Show what would be sent and destroyed.\n",
    "  -h, --help                Show this help message and exit.\n",
    "  -V, --version             Output version information and exit.\n",
    "\n",
    "Environment:\n",
    "  ZFS_REPLICATE_ZFS         zfs program (default: zfs)\n",
    "  ZFS_REPLICATE_SSH         remote shell program (default: ssh)\n",
    "  ZFS_REPLICATE_LOCK_DIR    directory for lock markers (default: temp dir)\n",
);

const RESUME_NOTE: &str = "completed transfers remain valid; run again to resume";

/// Parsed command produced by [`parse_args`].
#[derive(Debug, Default)]
struct ParsedArgs {
    show_help: bool,
    show_version: bool,
    quiet: bool,
    verbose: u8,
    dry_run: bool,
    end_snapshot: Option<OsString>,
    operands: Vec<OsString>,
}

/// Builds the `clap` command used for parsing.
fn clap_command() -> Command {
    Command::new(PROGRAM_PREFIX)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .arg(
            Arg::new("help")
                .long("help")
                .short('h')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("version")
                .long("version")
                .short('V')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .short('n')
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("end-snapshot")
                .long("end-snapshot")
                .short('e')
                .value_name("SNAP")
                .num_args(1)
                .action(ArgAction::Set)
                .value_parser(OsStringValueParser::new()),
        )
        .arg(
            Arg::new("args")
                .action(ArgAction::Append)
                .num_args(0..)
                .value_parser(OsStringValueParser::new()),
        )
}

/// Parses command-line arguments into a [`ParsedArgs`] structure.
fn parse_args<I, S>(arguments: I) -> Result<ParsedArgs, clap::Error>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut args: Vec<OsString> = arguments.into_iter().map(Into::into).collect();
    if args.is_empty() {
        args.push(OsString::from(PROGRAM_PREFIX));
    }

    let mut matches = clap_command().try_get_matches_from(args)?;
    Ok(ParsedArgs {
        show_help: matches.get_flag("help"),
        show_version: matches.get_flag("version"),
        quiet: matches.get_flag("quiet"),
        verbose: matches.get_count("verbose"),
        dry_run: matches.get_flag("dry-run"),
        end_snapshot: matches.remove_one::<OsString>("end-snapshot"),
        operands: matches
            .remove_many::<OsString>("args")
            .map(Iterator::collect)
            .unwrap_or_default(),
    })
}

fn render_version() -> String {
    format!("{PROGRAM_PREFIX} {}\n", env!("CARGO_PKG_VERSION"))
}

fn report_error<Err: Write>(stderr: &mut Err, message: impl std::fmt::Display) {
    let _ = writeln!(stderr, "{PROGRAM_PREFIX}: error: {message}");
}

/// Runs the CLI using the provided argument iterator and output handles.
///
/// Returns the process exit code: `0` when the destination was updated, was
/// already current, or was skipped as busy in quiet mode, `1` otherwise.
pub fn run<I, S, Out, Err>(arguments: I, stdout: &mut Out, stderr: &mut Err) -> i32
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
    Out: Write,
    Err: Write,
{
    match parse_args(arguments) {
        Ok(parsed) => execute(parsed, stdout, stderr),
        Err(error) => {
            report_error(stderr, error.kind());
            let _ = writeln!(stderr, "Try '{PROGRAM_PREFIX} --help' for more information.");
            1
        }
    }
}

fn execute<Out, Err>(parsed: ParsedArgs, stdout: &mut Out, stderr: &mut Err) -> i32
where
    Out: Write,
    Err: Write,
{
    if parsed.show_help {
        return i32::from(stdout.write_all(HELP_TEXT.as_bytes()).is_err());
    }
    if parsed.show_version {
        return i32::from(stdout.write_all(render_version().as_bytes()).is_err());
    }

    let config = match build_config(parsed) {
        Ok(config) => config,
        Err(message) => {
            report_error(stderr, message);
            let _ = writeln!(stderr, "Try '{PROGRAM_PREFIX} --help' for more information.");
            return 1;
        }
    };

    let _ = init_tracing(VerbosityConfig::new(config.unattended(), config.verbose()));
    if let Err(error) = install_signal_handlers() {
        tracing::warn!(%error, "failed to install signal handlers");
    }

    let store = ZfsStore::new(&config);
    match Replicator::new(&store, &config, signal::global()).run() {
        Ok(outcome) => outcome.exit_code().as_i32(),
        Err(error) => {
            report_error(stderr, &error);
            if matches!(error, EngineError::SignalAbort(_)) {
                let _ = writeln!(stderr, "{PROGRAM_PREFIX}: {RESUME_NOTE}");
            }
            error.exit_code().as_i32()
        }
    }
}

fn build_config(parsed: ParsedArgs) -> Result<ReplicateConfig, String> {
    let ParsedArgs {
        quiet,
        verbose,
        dry_run,
        end_snapshot,
        operands,
        ..
    } = parsed;

    let [filesystem, destination]: [OsString; 2] = operands.try_into().map_err(|_| {
        "expected exactly two operands: FILESYSTEM DESTINATION".to_owned()
    })?;
    let filesystem = utf8(filesystem, "FILESYSTEM")?;
    let destination = utf8(destination, "DESTINATION")?;
    let end_snapshot = end_snapshot
        .map(|snapshot| utf8(snapshot, "--end-snapshot"))
        .transpose()?;
    let destination = Destination::parse(&destination).map_err(|error| error.to_string())?;

    Ok(ReplicateConfig::builder(filesystem, destination)
        .end_snapshot(end_snapshot)
        .unattended(quiet)
        .verbose(verbose)
        .dry_run(dry_run)
        .apply_env(|name| env::var_os(name))
        .build())
}

fn utf8(value: OsString, what: &str) -> Result<String, String> {
    value
        .into_string()
        .map_err(|value| format!("{what} {} is not valid UTF-8", value.to_string_lossy()))
}

/// Converts a numeric exit code into an [`std::process::ExitCode`].
#[must_use]
pub fn exit_code_from(status: i32) -> std::process::ExitCode {
    let clamped = status.clamp(0, MAX_EXIT_CODE);
    std::process::ExitCode::from(u8::try_from(clamped).unwrap_or(u8::MAX))
}
