//! Logging setup.
//!
//! Installs a `tracing-subscriber` registry with an `EnvFilter` (`RUST_LOG`
//! wins over the configured default level), a stderr formatter with local
//! RFC 3339 timestamps, and an optional non-blocking file writer.

use std::path::PathBuf;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directives appended to the default filter to quiet the SDK and HTTP stack.
const THIRD_PARTY_FILTER: &str = "aws_config=warn,aws_smithy_runtime=warn,aws_sdk_s3=warn,hyper_util=warn,reqwest=warn";

/// Errors installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// The log file path has no file name component.
    #[error("invalid log file path: {0}")]
    InvalidPath(PathBuf),

    /// A global subscriber is already installed.
    #[error("failed to install log subscriber: {0}")]
    Init(String),
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set (e.g. `info`, `s3relay=debug`).
    pub default_filter: String,
    /// Also write logs to this file.
    pub file: Option<PathBuf>,
    /// Use ANSI colours on stderr.
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            file: None,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Raise the default level to `debug`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.default_filter = "debug".to_string();
        }
        self
    }

    /// Also log to `path`.
    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file = Some(path);
        self
    }
}

/// Keeps the file writer flushing until dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Call once, before the Tokio runtime spawns worker threads, so the local
/// UTC offset can be determined.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.default_filter)));

    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let timer = OffsetTime::new(offset, Rfc3339);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_ansi(config.ansi);

    let (file_layer, file_guard) = match &config.file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggingError::InvalidPath(path.clone()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn default_directives(level: &str) -> String {
    format!("{},{}", level, THIRD_PARTY_FILTER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.default_filter, "info");
        assert!(config.file.is_none());
    }

    #[test]
    fn test_verbose_raises_level() {
        assert_eq!(LogConfig::default().verbose(true).default_filter, "debug");
        assert_eq!(LogConfig::default().verbose(false).default_filter, "info");
    }

    #[test]
    fn test_default_directives_quiet_sdk() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("aws_smithy_runtime=warn"));
    }

    #[test]
    fn test_file_without_name_is_rejected() {
        let config = LogConfig::default().with_file(PathBuf::from("/"));
        assert!(matches!(
            init_logging(&config),
            Err(LoggingError::InvalidPath(_))
        ));
    }
}
