//! Logging and Tracing Setup
//!
//! Configures a `tracing` subscriber for binaries and tests that embed the swap engine.
//! The engine itself only emits `tracing` events; nothing is printed unless a subscriber
//! is installed through [`setup_logging`] or by the host application.

use std::env;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::Error;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Logging level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: LogLevel,
    /// Output format (JSON, Compact, Pretty)
    pub format: LogFormat,
    /// Target for log output
    pub output_target: LogTarget,
    /// Whether to enable colored output
    pub enable_colors: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to log span close events
    pub include_spans: bool,
    /// Whether to include file/line information
    pub include_file_line: bool,
    /// Custom environment filter, overrides `level` when set
    pub custom_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output_target: LogTarget::Stderr,
            enable_colors: true,
            include_thread_ids: false,
            include_spans: false,
            include_file_line: false,
            custom_filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = env::var("SWAP_LOG_LEVEL") {
            config.level = level.parse().unwrap_or(LogLevel::Info);
        }

        if let Ok(format) = env::var("SWAP_LOG_FORMAT") {
            config.format = format.parse().unwrap_or(LogFormat::Compact);
        }

        if let Ok(target) = env::var("SWAP_LOG_TARGET") {
            config.output_target = target.parse().unwrap_or(LogTarget::Stderr);
        }

        if let Ok(colors) = env::var("SWAP_LOG_COLORS") {
            config.enable_colors = colors.parse().unwrap_or(true);
        }

        if let Ok(thread_ids) = env::var("SWAP_LOG_THREAD_IDS") {
            config.include_thread_ids = thread_ids.parse().unwrap_or(false);
        }

        if let Ok(spans) = env::var("SWAP_LOG_SPANS") {
            config.include_spans = spans.parse().unwrap_or(false);
        }

        if let Ok(file_line) = env::var("SWAP_LOG_FILE_LINE") {
            config.include_file_line = file_line.parse().unwrap_or(false);
        }

        if let Ok(filter) = env::var("SWAP_LOG_FILTER") {
            config.custom_filter = Some(filter);
        }

        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(filter) = &self.custom_filter {
            EnvFilter::try_new(filter)
                .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", filter, e)))?;
        }
        Ok(())
    }

    fn env_filter(&self) -> Result<EnvFilter, Error> {
        let directive = match &self.custom_filter {
            Some(filter) => filter.clone(),
            None => default_filter(self.level),
        };
        EnvFilter::try_new(&directive)
            .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directive, e)))
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Supported logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Supported log output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// Structured JSON format
    Json,
    /// Compact human-readable format
    Compact,
    /// Pretty human-readable format with indentation
    Pretty,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Supported log output targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

impl std::str::FromStr for LogTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stdout" => Ok(LogTarget::Stdout),
            "stderr" => Ok(LogTarget::Stderr),
            _ => Err(format!("Invalid log target: {}", s)),
        }
    }
}

/// Default filter: the requested level for this crate, warnings for everything else
pub fn default_filter(level: LogLevel) -> String {
    let level = Level::from(level).to_string().to_lowercase();
    format!("warn,swap_express_sdk={},swap_sim={}", level, level)
}

/// Install the global tracing subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed, so repeated calls from
/// tests are harmless.
pub fn setup_logging(config: &LoggingConfig) -> Result<bool, Error> {
    config.validate()?;
    match config.output_target {
        LogTarget::Stdout => install(config, std::io::stdout),
        LogTarget::Stderr => install(config, std::io::stderr),
    }
}

fn install<W>(config: &LoggingConfig, writer: W) -> Result<bool, Error>
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_span_events(config.span_events())
                    .with_thread_ids(config.include_thread_ids)
                    .with_file(config.include_file_line)
                    .with_line_number(config.include_file_line),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(writer)
                    .with_span_events(config.span_events())
                    .with_thread_ids(config.include_thread_ids)
                    .with_file(config.include_file_line)
                    .with_line_number(config.include_file_line)
                    .with_ansi(config.enable_colors),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_span_events(config.span_events())
                    .with_thread_ids(config.include_thread_ids)
                    .with_file(config.include_file_line)
                    .with_line_number(config.include_file_line)
                    .with_ansi(config.enable_colors),
            )
            .try_init(),
    };

    Ok(result.is_ok())
}
