//! Logging System
//!
//! Structured logging via `tracing`. Level, format and destination come from
//! the `[logging]` config section, overridden by `QUARRY_LOG`,
//! `QUARRY_LOG_FORMAT`, `QUARRY_LOG_OUTPUT` and `QUARRY_LOG_MODULES`.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

pub const ENV_FILTER: &str = "QUARRY_LOG";
pub const ENV_FORMAT: &str = "QUARRY_LOG_FORMAT";
pub const ENV_OUTPUT: &str = "QUARRY_LOG_OUTPUT";
pub const ENV_MODULES: &str = "QUARRY_LOG_MODULES";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// json or text
    #[serde(default = "default_format")]
    pub format: String,

    /// stdout, stderr or file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file when output is `file`; defaults to `logs/quarry_<session>.log`
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// ANSI colors (text format on a terminal stream only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific levels, e.g. `quarry::recovery = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_output() -> String {
    "stdout".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: None,
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        parse_level(&self.level)?;
        LogFormat::parse(&self.format)?;
        LogOutput::parse(&self.output)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!(
                "Invalid log format: {} (must be 'json' or 'text')",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    File,
}

impl LogOutput {
    fn parse(value: &str) -> Result<Self, String> {
        match value {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            "file" => Ok(LogOutput::File),
            other => Err(format!(
                "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
                other
            )),
        }
    }
}

fn parse_level(level: &str) -> Result<(), String> {
    match level {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => Ok(()),
        other => Err(format!("Invalid log level: {}", other)),
    }
}

/// Default log file for a session
pub fn default_log_file(session_label: &str) -> PathBuf {
    PathBuf::from("logs").join(format!("quarry_{}.log", session_label))
}

/// Initialize the global subscriber.
///
/// Priority: `QUARRY_LOG*` environment variables, then `config`, then defaults.
/// `session_label` names the default log file.
pub fn init_logging(config: Option<&LoggingConfig>, session_label: &str) -> Result<(), ApiError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let (writer, ansi) = match output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), config.color),
        LogOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), config.color),
        LogOutput::File => {
            let log_file = config
                .file
                .clone()
                .unwrap_or_else(|| default_log_file(session_label));
            if let Some(parent) = log_file.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ApiError::ConfigError(format!("Failed to create log directory: {}", e))
                })?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .map_err(|e| {
                    ApiError::ConfigError(format!("Failed to open log file {:?}: {}", log_file, e))
                })?;
            (BoxMakeWriter::new(file), false)
        }
    };

    let layer: Box<dyn Layer<Layered<EnvFilter, Registry>> + Send + Sync> = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_writer(writer)
            .boxed(),
        LogFormat::Text => fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    };

    Registry::default()
        .with(filter)
        .with(layer)
        .try_init()
        .map_err(|e| ApiError::ConfigError(format!("Failed to initialize logging: {}", e)))
}

fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, ApiError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER) {
        return Ok(filter);
    }

    parse_level(&config.level).map_err(ApiError::ConfigError)?;
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, module_level) in &config.modules {
        filter = add_directive(filter, module, module_level)?;
    }
    if let Ok(modules) = std::env::var(ENV_MODULES) {
        for spec in modules.split(',').filter(|s| !s.trim().is_empty()) {
            if let Some((module, level)) = spec.split_once('=') {
                filter = add_directive(filter, module.trim(), level.trim())?;
            }
        }
    }
    Ok(filter)
}

fn add_directive(filter: EnvFilter, module: &str, level: &str) -> Result<EnvFilter, ApiError> {
    let directive = format!("{}={}", module, level)
        .parse()
        .map_err(|e| ApiError::ConfigError(format!("Invalid log directive '{}={}': {}", module, level, e)))?;
    Ok(filter.add_directive(directive))
}

fn determine_format(config: &LoggingConfig) -> Result<LogFormat, ApiError> {
    if let Ok(format) = std::env::var(ENV_FORMAT) {
        if let Ok(parsed) = LogFormat::parse(&format) {
            return Ok(parsed);
        }
    }
    LogFormat::parse(&config.format).map_err(ApiError::ConfigError)
}

fn determine_output(config: &LoggingConfig) -> Result<LogOutput, ApiError> {
    if let Ok(output) = std::env::var(ENV_OUTPUT) {
        return LogOutput::parse(&output).map_err(ApiError::ConfigError);
    }
    LogOutput::parse(&config.output).map_err(ApiError::ConfigError)
}
