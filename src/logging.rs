//! Log plumbing.
//!
//! Status messages go through `tracing`. Output of external tools is handed
//! line by line to a [`LogSink`] that each component receives from its
//! caller, so a run (or a test) decides where compiler chatter ends up.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Which output stream of a child process a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives output of external tools while they run.
pub trait LogSink {
    fn line(&self, program: &str, stream: Stream, line: &str);
}

/// Forwards tool output into `tracing`.
///
/// stdout goes out at `debug` (it lands in the build log, not on the
/// console), stderr at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn line(&self, program: &str, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => tracing::debug!(target: "rootfs_builder::cmd", program, "{}", line),
            Stream::Stderr => tracing::info!(target: "rootfs_builder::cmd", program, "{}", line),
        }
    }
}

/// Collects tool output in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines received so far, in arrival order.
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    /// True if any received line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn line(&self, _program: &str, stream: Stream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

/// File name of the append-only build log inside the logs directory.
pub const BUILD_LOG_NAME: &str = "build.log";

/// Install the global subscriber: console filtered by `RUST_LOG` (default
/// `info`), plus `<logs_dir>/build.log` at `debug` without colors.
pub fn init(logs_dir: &Path) -> Result<()> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;

    let file_writer = tracing_appender::rolling::never(logs_dir, BUILD_LOG_NAME);
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer)
                .with_filter(LevelFilter::DEBUG),
        )
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
