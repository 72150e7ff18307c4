//! Tracing subscriber setup
//!
//! Components log through `tracing` macros with structured fields; this module
//! only decides where those events go. File output is non-blocking, so the
//! returned [`LoggingGuard`] must be held until shutdown or buffered lines are
//! lost.
//!
//! ```rust,no_run
//! use inkgo_auth::logging::LoggingConfig;
//!
//! let _guard = LoggingConfig::production("/var/log/inkgo").init()?;
//! # Ok::<(), std::io::Error>(())
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Where log events are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogOutput {
    /// Logging disabled
    None,
    /// Standard error only
    #[default]
    Stderr,
    /// Rolling file only
    FileOnly,
    /// Standard error and rolling file
    Both,
}

/// File rotation period
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    /// New file every minute
    Minute,
    /// New file every hour
    Hourly,
    /// New file every day
    Daily,
    /// Single file
    #[default]
    Never,
}

/// `[logging]` configuration section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub structured: bool,
    /// Output target
    pub output: LogOutput,
    /// Log directory, required for file output
    pub directory: Option<PathBuf>,
    /// File name prefix
    pub file_prefix: String,
    /// Rotation period
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            structured: false,
            output: LogOutput::Stderr,
            directory: None,
            file_prefix: "inkgo-auth".to_string(),
            rotation: LogRotation::Never,
        }
    }
}

/// Flushes buffered file output on drop
#[derive(Debug)]
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    _stderr_guard: Option<WorkerGuard>,
}

impl LoggingConfig {
    /// Verbose human-readable stderr logging for local work
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "inkgo_auth=debug,info".to_string(),
            ..Self::default()
        }
    }

    /// JSON logs to stderr and a daily-rotated file under `dir`
    #[must_use]
    pub fn production(dir: impl Into<PathBuf>) -> Self {
        Self {
            level: "info".to_string(),
            structured: true,
            output: LogOutput::Both,
            directory: Some(dir.into()),
            rotation: LogRotation::Daily,
            ..Self::default()
        }
    }

    /// Install the global subscriber
    ///
    /// Returns a guard for file-backed outputs, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Fails when file output has no directory, the directory cannot be
    /// created, or a global subscriber is already installed.
    pub fn init(&self) -> io::Result<Option<LoggingGuard>> {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));

        match self.output {
            LogOutput::None => Ok(None),
            LogOutput::Stderr => {
                self.install(filter, io::stderr)?;
                Ok(None)
            }
            LogOutput::FileOnly => {
                let (writer, file_guard) = tracing_appender::non_blocking(self.appender()?);
                self.install(filter, writer)?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: None,
                }))
            }
            LogOutput::Both => {
                let (file_writer, file_guard) = tracing_appender::non_blocking(self.appender()?);
                let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(io::stderr());
                self.install(filter, file_writer.and(stderr_writer))?;
                Ok(Some(LoggingGuard {
                    _file_guard: file_guard,
                    _stderr_guard: Some(stderr_guard),
                }))
            }
        }
    }

    fn appender(&self) -> io::Result<RollingFileAppender> {
        let dir = self.directory.as_deref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "file logging requires `logging.directory`",
            )
        })?;
        std::fs::create_dir_all(dir)?;
        Ok(rolling(self.rotation, dir, &self.file_prefix))
    }

    fn install<W>(&self, filter: EnvFilter, writer: W) -> io::Result<()>
    where
        W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let registry = tracing_subscriber::registry().with(filter);
        let result = if self.structured {
            registry.with(fmt::layer().json().with_writer(writer)).try_init()
        } else {
            registry.with(fmt::layer().with_writer(writer)).try_init()
        };
        result.map_err(|e| io::Error::other(e.to_string()))
    }
}

fn rolling(rotation: LogRotation, dir: &Path, prefix: &str) -> RollingFileAppender {
    match rotation {
        LogRotation::Minute => tracing_appender::rolling::minutely(dir, prefix),
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        LogRotation::Never => tracing_appender::rolling::never(dir, prefix),
    }
}
