//! Rolling log output.
//!
//! Received messages land in hourly-rolling `statuses.log.*` files, one bare
//! JSON payload per line. Warnings go to hourly-rolling `warnings.log.*`
//! files and to the console.

use std::io::Write;
use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

use crate::error::StreamResult;
use crate::stream::LineSink;

/// Sink writing message payloads to hourly-rolling statuses files.
///
/// The worker guard is held so buffered lines are flushed when the sink is
/// dropped.
pub struct StatusSink {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

impl StatusSink {
    /// Create a sink rolling `statuses.log.YYYY-MM-DD-HH` files in `log_dir`.
    ///
    /// The writer is lossless: when the appender's buffer fills during a
    /// burst, `accept` blocks until the disk catches up rather than dropping
    /// lines.
    #[must_use]
    pub fn new(log_dir: &Path) -> Self {
        let appender = tracing_appender::rolling::hourly(log_dir, "statuses.log");
        let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(appender);
        Self {
            writer,
            _guard: guard,
        }
    }
}

impl LineSink for StatusSink {
    fn accept(&mut self, line: &str) -> StreamResult<()> {
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Install the global tracing subscriber: a console layer on stderr
/// (`RUST_LOG` controlled, default info) and a WARN-and-above layer writing
/// hourly-rolling `warnings.log.*` files in `log_dir`.
///
/// The returned guard must be kept alive for the life of the process so the
/// warnings file is flushed on shutdown.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let appender = tracing_appender::rolling::hourly(log_dir, "warnings.log");
    let (warn_writer, guard) = tracing_appender::non_blocking(appender);

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let warnings = fmt::layer()
        .with_writer(warn_writer)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(console)
        .with(warnings)
        .init();

    guard
}
