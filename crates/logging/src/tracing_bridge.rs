//! crates/logging/src/tracing_bridge.rs
//! Bridge between the tracing crate and the quiet/verbose switches.
//!
//! [`ReplicateLayer`] intercepts every tracing event, classifies it with
//! [`LogCategory::from_target`], consults the [`VerbosityConfig`] and renders
//! the surviving events as single lines on the configured writer.
//!
//! ```rust,ignore
//! use logging::{VerbosityConfig, init_tracing};
//!
//! init_tracing(VerbosityConfig::new(false, 1));
//! tracing::info!(target: logging::targets::COMMAND, "+ zfs list -H");
//! ```

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::Mutex;

use super::config::VerbosityConfig;
use super::levels::LogCategory;
use tracing::{Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Prefix placed in front of progress, warning and error lines.
pub const PROGRAM_PREFIX: &str = "zfs-replicate";

/// A tracing layer that renders events according to a [`VerbosityConfig`].
pub struct ReplicateLayer {
    config: VerbosityConfig,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ReplicateLayer {
    /// Creates a layer writing to standard error.
    #[must_use]
    pub fn new(config: VerbosityConfig) -> Self {
        Self::with_writer(config, io::stderr())
    }

    /// Creates a layer writing to an arbitrary sink.
    #[must_use]
    pub fn with_writer<W>(config: VerbosityConfig, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            config,
            writer: Mutex::new(Box::new(writer)),
        }
    }

    fn render(category: LogCategory, level: Level, visitor: &MessageVisitor) -> String {
        let mut line = String::new();
        let decorated = matches!(level, Level::WARN | Level::ERROR)
            || matches!(category, LogCategory::Progress | LogCategory::Diagnostic);

        if decorated {
            line.push_str(PROGRAM_PREFIX);
            line.push_str(": ");
            match level {
                Level::WARN => line.push_str("warning: "),
                Level::ERROR => line.push_str("error: "),
                _ => {}
            }
        }

        if let Some(message) = &visitor.message {
            line.push_str(message);
        }
        for (name, value) in &visitor.fields {
            let _ = write!(line, " {name}={value}");
        }
        line
    }
}

impl<S> Layer<S> for ReplicateLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let category = LogCategory::from_target(metadata.target());
        if !self.config.allows(category, metadata.level()) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = Self::render(category, *metadata.level(), &visitor);

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }
}

/// Visitor to extract the message and structured fields from an event.
#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.fields.push((field.name(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.fields.push((field.name(), value.to_owned()));
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` narrows output further when set. Returns `false` when a global
/// subscriber was already installed, which happens when the CLI entry point
/// runs more than once in a single process.
pub fn init_tracing(config: VerbosityConfig) -> bool {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(ReplicateLayer::new(config))
        .try_init()
        .is_ok()
}
