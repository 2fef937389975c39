//! Logging setup on top of `tracing-subscriber`.
//!
//! ```rust,ignore
//! let config = courier_runtime::config::load_config()?;
//! courier_runtime::logging::init_from_config(&config.logging);
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level. The per-target
//! `filters` apply on top either way, e.g. `courier_transport = "trace"` to
//! see every request. Enabling `span_events.new` and `span_events.close`
//! times each `dispatch` span, i.e. each handler run.

use std::path::Path;

use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, format::FmtSpan, writer::BoxMakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const DEFAULT_LOG_FILE: &str = "courier.log";

/// Initializes logging from a [`LoggingConfig`].
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = try_init_from_config(config);
}

/// Installs the global subscriber described by `config`.
///
/// Settings that cannot be honoured fall back to something usable and are
/// reported as warnings once the subscriber is up.
pub fn try_init_from_config(config: &LoggingConfig) -> Result<(), TryInitError> {
    let mut notes = Vec::new();
    let filter = env_filter(config, &mut notes);
    let writer = make_writer(config, &mut notes);
    let layer = format_layer(config, writer, &mut notes);

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;

    for note in notes {
        warn!("{note}");
    }
    Ok(())
}

/// Target filters from the config, sorted so the result is stable.
fn directives(config: &LoggingConfig) -> Vec<String> {
    let mut filters: Vec<_> = config.filters.iter().collect();
    filters.sort_by(|a, b| a.0.cmp(b.0));
    filters
        .into_iter()
        .map(|(target, level)| format!("{target}={}", level.as_str()))
        .collect()
}

fn env_filter(config: &LoggingConfig, notes: &mut Vec<String>) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    for directive in directives(config) {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => notes.push(format!("Ignoring log filter `{directive}`: {e}")),
        }
    }
    filter
}

fn span_events(config: &SpanEventConfig) -> FmtSpan {
    [
        (config.new, FmtSpan::NEW),
        (config.enter, FmtSpan::ENTER),
        (config.exit, FmtSpan::EXIT),
        (config.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |events, (_, event)| events | event)
}

fn make_writer(config: &LoggingConfig, notes: &mut Vec<String>) -> BoxMakeWriter {
    match (config.output, &config.file_path) {
        (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
        (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
        (LogOutput::File, Some(path)) => match file_appender(path) {
            Ok(appender) => BoxMakeWriter::new(appender),
            Err(e) => {
                notes.push(format!(
                    "Cannot open log file {}: {e}, using stderr",
                    path.display()
                ));
                BoxMakeWriter::new(std::io::stderr)
            }
        },
        (LogOutput::File, None) => {
            notes.push("File output requested but no log file configured, using stdout".into());
            BoxMakeWriter::new(std::io::stdout)
        }
    }
}

fn file_appender(
    path: &Path,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE);

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
}

fn format_layer(
    config: &LoggingConfig,
    writer: BoxMakeWriter,
    notes: &mut Vec<String>,
) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events(&config.span_events))
        .with_thread_ids(config.thread_ids)
        .with_file(config.file_location)
        .with_line_number(config.file_location);

    match config.format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Full => layer.boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        #[cfg(feature = "json-log")]
        LogFormat::Json => layer.json().boxed(),
        #[cfg(not(feature = "json-log"))]
        LogFormat::Json => {
            notes.push("JSON log format requires the `json-log` feature, using full format".into());
            layer.boxed()
        }
    }
}
