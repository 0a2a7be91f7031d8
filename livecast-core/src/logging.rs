use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type FmtLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `logging.level`. Output goes to stdout
/// unless `logging.file_path` is set, in which case it is appended to that
/// file without ANSI colors.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(&config.level)?.into())
        .from_env_lossy();

    let (writer, ansi) = match &config.file_path {
        Some(path) => (open_log_file(path)?, false),
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let layer: FmtLayer = if config.format == "json" {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_file(false)
            .with_line_number(true)
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;
    Ok(())
}

fn level_filter(level: &str) -> anyhow::Result<LevelFilter> {
    let normalized = level.trim().to_ascii_lowercase();
    let level = if normalized == "warning" { "warn" } else { normalized.as_str() };
    level
        .parse::<LevelFilter>()
        .with_context(|| format!("Invalid log level: {level}"))
}

fn open_log_file(path: &str) -> anyhow::Result<BoxMakeWriter> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {path}"))?;
    Ok(BoxMakeWriter::new(Arc::new(file)))
}
