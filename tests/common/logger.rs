//! Per-test structured logging.
//!
//! ```rust,ignore
//! let log = TestLogger::new("stale_fallback_on_429");
//! log.phase("setup");
//! // ...
//! log.finish_ok();
//! ```
//!
//! `TEST_LOG_LEVEL` (trace/debug/info/warn/error, default info) filters
//! output and `TEST_LOG_JSON=1` switches to JSON lines on stderr.

use std::env;
use std::fmt::Display;
use std::sync::{Mutex, OnceLock};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

/// Log severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse from string, case-insensitive.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Serialize)]
struct LogEntry<'a> {
    timestamp: String,
    level: LogLevel,
    test: &'a str,
    phase: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u128>,
}

struct Settings {
    min_level: LogLevel,
    json: bool,
}

fn settings() -> &'static Settings {
    static SETTINGS: OnceLock<Settings> = OnceLock::new();
    SETTINGS.get_or_init(|| Settings {
        min_level: env::var("TEST_LOG_LEVEL")
            .ok()
            .and_then(|s| LogLevel::parse(&s))
            .unwrap_or(LogLevel::Info),
        json: env::var("TEST_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}

/// Per-test logger with phase and duration tracking.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
    phase: Mutex<String>,
}

impl TestLogger {
    #[must_use]
    pub fn new(test_name: &str) -> Self {
        let logger = Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            phase: Mutex::new("init".to_string()),
        };
        logger.log(LogLevel::Info, "Test starting", None);
        logger
    }

    /// Set the current phase ("setup", "execute", "verify", ...).
    pub fn phase(&self, phase: &str) {
        if let Ok(mut current) = self.phase.lock() {
            *current = phase.to_string();
        }
        self.log(LogLevel::Debug, &format!("Phase: {phase}"), None);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, None);
    }

    /// Log an outgoing HTTP request.
    pub fn http_request(&self, method: &str, url: &str) {
        self.debug(&format!("HTTP {method} {url}"));
    }

    /// Log the cache path a proxied response took.
    pub fn cache_status(&self, status: &str) {
        self.debug(&format!("X-Cache: {status}"));
    }

    /// Mark the test as passed.
    pub fn finish_ok(&self) {
        let elapsed = self.start_time.elapsed().as_millis();
        self.log(
            LogLevel::Info,
            &format!("Test passed (duration: {elapsed}ms)"),
            Some(elapsed),
        );
    }

    fn log(&self, level: LogLevel, message: &str, duration_ms: Option<u128>) {
        let settings = settings();
        if level < settings.min_level {
            return;
        }

        let phase = self
            .phase
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

        if settings.json {
            let entry = LogEntry {
                timestamp,
                level,
                test: &self.test_name,
                phase: &phase,
                message,
                duration_ms,
            };
            if let Ok(json) = serde_json::to_string(&entry) {
                eprintln!("{json}");
            }
        } else {
            eprintln!("[{timestamp}] [{level}] [{}/{phase}] {message}", self.test_name);
        }
    }
}
