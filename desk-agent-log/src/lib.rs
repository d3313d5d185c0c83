//! Named loggers for the desk-agent workspace.
//!
//! A [`LogSink`] is created once at startup and handed to every component that
//! logs. Each [`Logger`] it produces prefixes messages with its name, writes them
//! to the console and forwards the same text to the native facility: the
//! `tracing` dispatcher plus a broadcast feed that a UI can subscribe to.
//!
//! ```
//! use desk_agent_log::LogSink;
//!
//! let sink = LogSink::new().with_console(false);
//! let log = sink.logger("AppConfig");
//! log.info("Loaded config from dev.appconfig.json");
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt};

const FEED_CAPACITY: usize = 256;

/// `tracing` target used for events forwarded by [`Logger`].
pub const LOG_TARGET: &str = "desk_agent::log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single forwarded log line as seen by feed subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub logger: String,
    /// Already prefixed with `[<logger>] `.
    pub message: String,
}

/// Process-scoped log sink. Cheap to clone; clones share the feed.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    console: AtomicBool,
    feed: broadcast::Sender<LogRecord>,
}

impl LogSink {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(SinkInner {
                console: AtomicBool::new(true),
                feed,
            }),
        }
    }

    pub fn with_console(self, enabled: bool) -> Self {
        self.set_console(enabled);
        self
    }

    pub fn set_console(&self, enabled: bool) {
        self.inner.console.store(enabled, Ordering::Relaxed);
    }

    pub fn console_enabled(&self) -> bool {
        self.inner.console.load(Ordering::Relaxed)
    }

    /// Returns a logger bound to `name`.
    pub fn logger(&self, name: impl Into<String>) -> Logger {
        Logger {
            name: Arc::from(name.into()),
            sink: self.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogRecord> {
        self.inner.feed.subscribe()
    }

    /// Live feed as a stream. Records dropped by a lagging reader are skipped.
    pub fn records(&self) -> impl Stream<Item = LogRecord> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|item| item.ok())
    }

    fn forward(&self, record: LogRecord) {
        // No subscribers is the normal case outside the desktop shell.
        let _ = self.inner.feed.send(record);
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("console", &self.console_enabled())
            .field("subscribers", &self.inner.feed.receiver_count())
            .finish()
    }
}

/// Handle bound to a logger name.
#[derive(Clone)]
pub struct Logger {
    name: Arc<str>,
    sink: LogSink,
}

impl Logger {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn format(&self, message: &str) -> String {
        format!("[{}] {}", self.name, message)
    }

    pub fn trace(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Trace, message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message.as_ref());
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        let formatted = self.format(message);

        if self.sink.console_enabled() {
            match level {
                LogLevel::Trace | LogLevel::Debug | LogLevel::Info => {
                    println!("[{level}] {formatted}")
                }
                LogLevel::Warn | LogLevel::Error => eprintln!("[{level}] {formatted}"),
            }
        }

        emit_tracing(level, &formatted);

        self.sink.forward(LogRecord {
            timestamp: Utc::now(),
            level,
            logger: self.name.to_string(),
            message: formatted,
        });
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("name", &self.name).finish()
    }
}

fn emit_tracing(level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(target: LOG_TARGET, "{message}"),
        LogLevel::Debug => tracing::debug!(target: LOG_TARGET, "{message}"),
        LogLevel::Info => tracing::info!(target: LOG_TARGET, "{message}"),
        LogLevel::Warn => tracing::warn!(target: LOG_TARGET, "{message}"),
        LogLevel::Error => tracing::error!(target: LOG_TARGET, "{message}"),
    }
}

/// Installs the global `tracing` subscriber. Later calls are ignored.
///
/// `RUST_LOG` wins when set; otherwise `warn`, or `off` in quiet mode.
/// Events from named loggers are left out because [`Logger`] already wrote
/// them to the console.
pub fn init_tracing(quiet: bool) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_fmt()
            .with_env_filter(console_filter(quiet, EnvFilter::try_from_default_env().ok()))
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .try_init();
    });
}

fn console_filter(quiet: bool, from_env: Option<EnvFilter>) -> EnvFilter {
    if quiet {
        return EnvFilter::new("off");
    }
    let filter = from_env.unwrap_or_else(|| EnvFilter::new("warn"));
    match format!("{LOG_TARGET}=off").parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}
