use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingSection;

/// Build the filter: `RUST_LOG` wins, then the configured level.
/// `verbose` raises the configured level to `debug`.
pub fn env_filter(settings: &LoggingSection, verbose: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level = if verbose { "debug" } else { settings.level.as_str() };
    let directive = format!("{level},tower_http={level}");
    EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log level '{}'", settings.level))
}

/// Install the global subscriber.
///
/// Console output goes to stderr, as JSON when `settings.json` is set. With
/// `settings.dir`, records are also written as JSON to a daily-rolling file;
/// the returned guard must be held until exit so buffered lines get flushed.
pub fn init_logging(settings: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(settings, verbose)?;

    let (file_layer, guard) = match &settings.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "freelancie.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    let (plain_console, json_console) = if settings.json {
        (None, Some(fmt::layer().json().with_writer(std::io::stderr)))
    } else {
        (
            Some(fmt::layer().with_target(true).with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain_console)
        .with(json_console)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
