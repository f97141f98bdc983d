//! Structured logging to stderr or a file.
//!
//! Stale-data serves are logged at info level, so `--log-level info` is the
//! useful setting for operating the proxy.

use std::fs::OpenOptions;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

const LOG_LEVEL_ENV: &str = "COINCACHE_LOG";
const LOG_FORMAT_ENV: &str = "COINCACHE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "COINCACHE_LOG_FILE";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable logs.
    #[default]
    Human,
    /// JSON logs (one event per line).
    Json,
    /// Compact logs (single line, terse).
    Compact,
}

impl LogFormat {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" => Some(Self::Human),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

/// Log level from CLI argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    /// Parse from CLI argument.
    #[must_use]
    pub fn from_arg(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "verbose" | "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Convert to tracing filter string.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::Critical => "error",
        }
    }

    /// Convert to tracing level.
    #[must_use]
    pub const fn as_tracing_level(self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Convert from tracing level.
    #[must_use]
    pub const fn from_tracing_level(level: Level) -> Self {
        match level {
            Level::TRACE => Self::Trace,
            Level::DEBUG => Self::Debug,
            Level::INFO => Self::Info,
            Level::WARN => Self::Warn,
            Level::ERROR => Self::Error,
        }
    }
}

/// Parse log level from `COINCACHE_LOG`.
#[must_use]
pub fn parse_log_level_from_env() -> Option<Level> {
    std::env::var(LOG_LEVEL_ENV).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            LogLevel::from_arg(trimmed).map(LogLevel::as_tracing_level)
        }
    })
}

/// Parse log format from `COINCACHE_LOG_FORMAT`.
#[must_use]
pub fn parse_log_format_from_env() -> Option<LogFormat> {
    std::env::var(LOG_FORMAT_ENV).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            LogFormat::from_arg(trimmed)
        }
    })
}

/// Parse log file path from `COINCACHE_LOG_FILE`.
#[must_use]
pub fn parse_log_file_from_env() -> Option<PathBuf> {
    std::env::var(LOG_FILE_ENV).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(PathBuf::from(trimmed))
        }
    })
}

/// Logging settings after merging CLI flags with `COINCACHE_LOG*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    pub verbose: bool,
}

impl LogSettings {
    /// Resolve settings: `--log-level` beats `COINCACHE_LOG`, and
    /// `--json-output` beats `COINCACHE_LOG_FORMAT`.
    #[must_use]
    pub fn resolve(log_level: Option<&str>, json_output: bool, verbose: bool) -> Self {
        let level = log_level
            .and_then(LogLevel::from_arg)
            .or_else(|| parse_log_level_from_env().map(LogLevel::from_tracing_level))
            .unwrap_or_default();
        let format = if json_output {
            LogFormat::Json
        } else {
            parse_log_format_from_env().unwrap_or_default()
        };
        Self {
            level,
            format,
            file: parse_log_file_from_env(),
            verbose,
        }
    }

    /// Install the global subscriber. Later calls are no-ops.
    pub fn init(self) {
        init(self.level, self.format, self.file, self.verbose);
    }
}

/// Initialize logging with the given settings.
///
/// `verbose` raises anything quieter than debug to debug.
pub fn init(level: LogLevel, format: LogFormat, log_file: Option<PathBuf>, verbose: bool) {
    let level = effective_level(level, verbose);

    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()
    });

    let make_writer = |file: Option<&std::fs::File>| -> BoxMakeWriter {
        if let Some(file) = file.and_then(|inner| inner.try_clone().ok()) {
            BoxMakeWriter::new(file)
        } else {
            BoxMakeWriter::new(std::io::stderr)
        }
    };

    let make_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("coincache={}", level.as_filter())))
    };

    match format {
        LogFormat::Json => {
            let filter = make_filter();
            let writer = make_writer(file.as_ref());
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .try_init()
                .ok();
        }
        LogFormat::Compact => {
            let filter = make_filter();
            let writer = make_writer(file.as_ref());
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .compact()
                .with_writer(writer)
                .with_target(true)
                .try_init()
                .ok();
        }
        LogFormat::Human => {
            let filter = make_filter();
            let writer = make_writer(file.as_ref());
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_target(false)
                .try_init()
                .ok();
        }
    }
}

fn effective_level(level: LogLevel, verbose: bool) -> LogLevel {
    if verbose
        && matches!(
            level,
            LogLevel::Info | LogLevel::Warn | LogLevel::Error | LogLevel::Critical
        )
    {
        LogLevel::Debug
    } else {
        level
    }
}
