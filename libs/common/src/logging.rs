//! Unified logging module for the bridge services
//!
//! Console output plus an append-only diagnostic log file. The file sink is
//! reopenable (SIGHUP) so external log rotation can move the file away.
//!
//! The sink is never hidden in process-wide state: [`init_with_config`] hands
//! back a [`LogHandle`] that owns the writer guard, and
//! [`subscriber_with_writer`] builds a subscriber over any [`MakeWriter`] so
//! tests can capture output with `tracing::subscriber::with_default`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        FmtContext, FormatEvent, FormatFields, MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging setup errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid log filter '{0}'")]
    InvalidFilter(String),

    #[error("Failed to install global subscriber: {0}")]
    Install(String),
}

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Custom event formatter that outputs: `timestamp [LEVEL] span{fields}: message`
///
/// Example output: `2025-12-02T00:50:44.809Z [INFO] job{handle=H:1 port=5010}: Device connected`
pub struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let now = chrono::Utc::now();
        write!(writer, "{} ", now.format("%Y-%m-%dT%H:%M:%S%.6fZ"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m", // magenta
                Level::DEBUG => "\x1b[34m", // blue
                Level::INFO => "\x1b[32m",  // green
                Level::WARN => "\x1b[33m",  // yellow
                Level::ERROR => "\x1b[31m", // red
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        // Span context (job handle, port) ahead of the message
        if let Some(scope) = ctx.event_scope() {
            let mut wrote_span = false;
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<fmt::FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{}}}", fields)?;
                    }
                }
                write!(writer, ":")?;
                wrote_span = true;
            }
            if wrote_span {
                write!(writer, " ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// ============================================================================
// Append-only file sink
// ============================================================================

/// Open `path` for appending, creating parent directories as needed
pub fn open_append(path: &Path) -> Result<File, LoggingError> {
    let open = || -> std::io::Result<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(path)
    };
    open().map_err(|source| LoggingError::OpenFile {
        path: path.to_path_buf(),
        source,
    })
}

/// Append-only log file that can be reopened in place
///
/// Clones share the same underlying handle, so a reopen is visible to the
/// background writer thread immediately.
#[derive(Clone, Debug)]
pub struct ReopenableFile {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl ReopenableFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LoggingError> {
        let path = path.into();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reopen the file at the configured path (e.g. after logrotate moved it)
    pub fn reopen(&self) -> Result<(), LoggingError> {
        let fresh = open_append(&self.path)?;
        let mut slot = self
            .file
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = fresh;
        Ok(())
    }
}

impl Write for ReopenableFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
        file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
        file.flush()
    }
}

// ============================================================================
// Subscriber construction
// ============================================================================

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, reported in the startup line
    pub service_name: String,
    /// Append-only log file; `None` disables file logging
    pub log_file: Option<PathBuf>,
    /// Filter level or directive string ("info", "info,bridgesrv=debug")
    pub level: String,
    /// Enable JSON format for the file sink
    pub enable_json: bool,
    /// Mirror events to stdout
    pub console: bool,
    /// Colored console output
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_file: None,
            level: "info".to_string(),
            enable_json: false,
            console: true,
            ansi: true,
        }
    }
}

/// Build the event filter
///
/// `RUST_LOG` wins when set; otherwise the configured level applies.
pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(env_str) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(&env_str).map_err(|_| LoggingError::InvalidFilter(env_str));
    }
    EnvFilter::try_new(level).map_err(|_| LoggingError::InvalidFilter(level.to_string()))
}

/// Subscriber writing bracketed, uncolored lines to `writer`
///
/// Does not install anything globally; pair with
/// `tracing::subscriber::with_default` / `set_default` or hand it to
/// `set_global_default`.
pub fn subscriber_with_writer<W>(
    level: &str,
    writer: W,
) -> Result<impl tracing::Subscriber + Send + Sync, LoggingError>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_new(level).map_err(|_| LoggingError::InvalidFilter(level.to_string()))?;
    Ok(tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .event_format(BracketedLevelFormat),
    ))
}

/// Live logging state returned by [`init_with_config`]
///
/// Dropping the handle flushes and stops the background file writer, so the
/// caller keeps it alive for the lifetime of the process.
#[derive(Debug)]
pub struct LogHandle {
    file: Option<ReopenableFile>,
    _guard: Option<WorkerGuard>,
}

impl LogHandle {
    pub fn log_file(&self) -> Option<&Path> {
        self.file.as_ref().map(ReopenableFile::path)
    }

    /// Reopen the log file (no-op without file logging)
    pub fn reopen(&self) -> Result<(), LoggingError> {
        match &self.file {
            Some(file) => file.reopen(),
            None => Ok(()),
        }
    }

    /// Install a SIGHUP listener that reopens the log file (Unix only)
    ///
    /// Must be called from within a tokio runtime.
    pub fn enable_sighup_reopen(&self) {
        #[cfg(unix)]
        {
            let Some(file) = self.file.clone() else {
                return;
            };
            use tokio::signal::unix::{signal, SignalKind};
            tokio::spawn(async move {
                match signal(SignalKind::hangup()) {
                    Ok(mut hup) => loop {
                        hup.recv().await;
                        match file.reopen() {
                            Ok(()) => tracing::debug!("Log reopened: {}", file.path().display()),
                            Err(e) => tracing::warn!("SIGHUP reopen: {}", e),
                        }
                    },
                    Err(e) => tracing::warn!("SIGHUP handler: {}", e),
                }
            });
        }
    }
}

/// Initialize the global logging system
pub fn init_with_config(config: LogConfig) -> Result<LogHandle, LoggingError> {
    let filter = build_filter(&config.level)?;

    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_ansi(config.ansi)
            .event_format(BracketedLevelFormat)
            .boxed()
    });

    let (file, guard, file_layer) = match &config.log_file {
        Some(path) => {
            let file = ReopenableFile::open(path.clone())?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file.clone());
            let layer = if config.enable_json {
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_level(true)
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .boxed()
            } else {
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .event_format(BracketedLevelFormat)
                    .boxed()
            };
            (Some(file), Some(guard), Some(layer))
        },
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    match &config.log_file {
        Some(path) => tracing::info!("Logging: {} @ {}", config.service_name, path.display()),
        None => tracing::info!("Logging: {} (console only)", config.service_name),
    }

    Ok(LogHandle {
        file,
        _guard: guard,
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_injected_writer_captures_events() {
        let capture = Capture::default();
        let subscriber = subscriber_with_writer("debug", capture.clone()).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("job", port = 5010);
            let _enter = span.enter();
            tracing::info!("Device connected");
            tracing::trace!("filtered out");
        });

        let out = capture.contents();
        assert!(out.contains("[INFO]"));
        assert!(out.contains("job{port=5010}:"));
        assert!(out.contains("Device connected"));
        assert!(!out.contains("filtered out"));
    }

    #[test]
    fn test_level_filter_respected() {
        let capture = Capture::default();
        let subscriber = subscriber_with_writer("warn", capture.clone()).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("quiet");
            tracing::warn!("loud");
        });

        let out = capture.contents();
        assert!(!out.contains("quiet"));
        assert!(out.contains("[WARN] loud"));
    }

    #[test]
    fn test_open_append_creates_parents_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.log");

        let mut file = ReopenableFile::open(&path).unwrap();
        file.write_all(b"first\n").unwrap();
        file.flush().unwrap();

        let mut again = ReopenableFile::open(&path).unwrap();
        again.write_all(b"second\n").unwrap();
        again.flush().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_reopen_after_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.log");
        let rotated = dir.path().join("bridge.log.1");

        let mut file = ReopenableFile::open(&path).unwrap();
        file.write_all(b"before\n").unwrap();
        fs::rename(&path, &rotated).unwrap();

        file.reopen().unwrap();
        file.write_all(b"after\n").unwrap();
        file.flush().unwrap();

        assert_eq!(fs::read_to_string(&rotated).unwrap(), "before\n");
        assert_eq!(fs::read_to_string(&path).unwrap(), "after\n");
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let result = subscriber_with_writer("bridgesrv=notalevel", Capture::default());
        assert!(matches!(result, Err(LoggingError::InvalidFilter(_))));
    }
}
