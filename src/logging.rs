//! Tracing setup for the CLI.
//!
//! Console output goes to stderr, filtered by `RUST_LOG` (default
//! `devchain=info`). A run additionally mirrors every event into its own log
//! file through a non-blocking writer; the returned guard must be held until
//! the run ends so buffered lines are flushed.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "devchain=info";
const VERBOSE_FILTER: &str = "devchain=debug,info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    pub verbose: bool,
    /// Emit JSON lines instead of the compact format
    pub json: bool,
    /// Run log file to mirror events into
    pub file: Option<PathBuf>,
}

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn console_layer(json: bool) -> BoxedLayer {
    if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    }
}

fn file_layer(path: &Path, json: bool) -> Result<(BoxedLayer, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let layer = if json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_ansi(false).with_writer(writer).boxed()
    };
    Ok((layer, guard))
}

/// Install the global subscriber. Returns the file writer guard when a log
/// file was requested.
pub fn init(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let mut layers = vec![console_layer(settings.json)];
    let mut guard = None;
    if let Some(path) = &settings.file {
        let (layer, file_guard) = file_layer(path, settings.json)?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(env_filter(settings.verbose)))
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}
