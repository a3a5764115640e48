use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt, TestWriter};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// A level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    pub level: String,

    /// Emit JSON lines instead of plain text.
    pub json: bool,

    /// Also write to stderr. Recent lines are always kept in memory.
    pub stderr: bool,

    /// How many formatted lines [`RecentLogs`] retains.
    pub recent_lines: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
            stderr: true,
            recent_lines: 2_000,
        }
    }
}

impl LoggingConfig {
    /// The configured directives with level aliases spelled out.
    fn directives(&self) -> String {
        let level = self.level.trim();
        if level.is_empty() {
            return "info".to_owned();
        }
        if level.eq_ignore_ascii_case("warning") {
            return "warn".to_owned();
        }
        let lowered = level.to_ascii_lowercase();
        if ["trace", "debug", "info", "warn", "error", "off"].contains(&lowered.as_str()) {
            lowered
        } else {
            level.to_owned()
        }
    }

    /// The effective filter: the configured directives followed by
    /// `RUST_LOG`, which therefore wins for targets both mention. Directives
    /// that fail to parse are dropped.
    pub fn env_filter(&self) -> EnvFilter {
        let mut candidates = Vec::new();
        let configured = self.directives();
        if let Some(env) = std::env::var("RUST_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            candidates.push(format!("{configured},{}", env.trim()));
            candidates.push(env.trim().to_owned());
        }
        candidates.push(configured);
        candidates
            .iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::INFO.into()))
    }
}

/// The most recent formatted log lines, attached to bug reports.
#[derive(Debug)]
pub struct RecentLogs {
    capacity: usize,
    lines: Mutex<VecDeque<String>>,
}

impl RecentLogs {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Up to `n` lines, oldest first.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }
}

#[derive(Clone)]
struct RecentLogsWriter(Arc<RecentLogs>);

impl<'a> MakeWriter<'a> for RecentLogsWriter {
    type Writer = EventLines;

    fn make_writer(&'a self) -> EventLines {
        EventLines {
            logs: Arc::clone(&self.0),
            pending: Vec::new(),
        }
    }
}

/// Buffers one event's output; its lines are recorded when it is dropped.
struct EventLines {
    logs: Arc<RecentLogs>,
    pending: Vec<u8>,
}

impl Write for EventLines {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EventLines {
    fn drop(&mut self) {
        String::from_utf8_lossy(&self.pending)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .for_each(|line| self.logs.push(line));
    }
}

static RECENT_LOGS: OnceLock<Arc<RecentLogs>> = OnceLock::new();

/// Installs the global `tracing` subscriber and returns the in-memory log.
///
/// Only the first call installs anything; later calls return the same log.
/// A subscriber installed by someone else (usually a test harness) is left in
/// place.
pub fn init_tracing(config: &LoggingConfig) -> Arc<RecentLogs> {
    let mut installed = false;
    let logs = RECENT_LOGS.get_or_init(|| {
        installed = true;
        Arc::new(RecentLogs::new(config.recent_lines))
    });
    if !installed {
        return Arc::clone(logs);
    }

    let recent = RecentLogsWriter(Arc::clone(logs));
    let writer = match (config.stderr, cfg!(debug_assertions)) {
        (false, _) => BoxMakeWriter::new(recent),
        // Keeps `cargo test` output captured.
        (true, true) => BoxMakeWriter::new(recent.and(TestWriter::with_stderr)),
        (true, false) => BoxMakeWriter::new(recent.and(io::stderr)),
    };
    let fmt = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);
    let layer = if config.json {
        fmt.json().boxed()
    } else {
        fmt.boxed()
    };
    let subscriber = tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!(target = "strata.config", "global subscriber already installed");
    }
    Arc::clone(logs)
}
