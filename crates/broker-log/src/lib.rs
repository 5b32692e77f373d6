//! Tracing setup for the console session broker.
//!
//! This process speaks JSON-RPC on stdout, so stdout is never an acceptable
//! log sink: every layer here writes to stderr (and, optionally, to a plain
//! append-only file).

use std::io;

use anyhow::Context as _;
use camino::Utf8Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct LoggerGuard {
    _stderr_guard: WorkerGuard,
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global tracing subscriber.
///
/// `log_filter` follows `tracing_subscriber::EnvFilter` syntax (e.g. `"info"`,
/// `"broker_core=debug,warn"`). `log_file`, if given, also appends
/// plain-text records to that path (created if missing, appended to
/// otherwise — no rotation, this process is expected to be short-lived).
pub fn init(log_filter: &str, log_file: Option<&Utf8Path>) -> anyhow::Result<LoggerGuard> {
    let env_filter = EnvFilter::try_new(log_filter).context("invalid log filter directives")?;

    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(io::stderr());
    let stderr_layer = fmt::layer().with_writer(stderr_writer).with_target(true);

    let (file_layer, file_guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("couldn't open log file: {path}"))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(LoggerGuard {
        _stderr_guard: stderr_guard,
        _file_guard: file_guard,
    })
}
