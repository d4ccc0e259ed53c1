//! Configuration System
//!
//! Layered configuration: built-in defaults, then a TOML/JSON config file,
//! then `QUARRY__SECTION__KEY` environment variables. CLI flags are applied on
//! top by the binary. Tests included.

use crate::error::ApiError;
use crate::governor::GovernorLimits;
use crate::logging::LoggingConfig;
use crate::metrics::Pricing;
use crate::request::TemplateRequestSource;
use crate::retry::RetryPolicy;
use crate::session::SessionSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use crate::provider::{ProviderConfig, ProviderType};

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;
pub use sources::config_file::DEFAULT_CONFIG_FILE;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuarryConfig {
    #[serde(default)]
    pub batch: BatchConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub resources: ResourceConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_target_records")]
    pub target_records: u64,

    /// Records between checkpoints
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,

    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Session ledger database; defaults to `<checkpoint_dir>/ledger`
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,

    /// Fields every accepted record must carry with a non-empty value
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
}

fn default_target_records() -> u64 {
    1000
}

fn default_checkpoint_interval() -> u64 {
    100
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

fn default_required_fields() -> Vec<String> {
    ["short_description", "description", "work_notes", "close_notes"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            target_records: default_target_records(),
            checkpoint_interval: default_checkpoint_interval(),
            checkpoint_dir: default_checkpoint_dir(),
            ledger_path: None,
            required_fields: default_required_fields(),
        }
    }
}

impl BatchConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| self.checkpoint_dir.join("ledger"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries beyond the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay; attempt n waits `n * retry_delay_ms`
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f64,

    /// Ceiling on host memory in use
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: f64,

    #[serde(default = "default_cooling_period_secs")]
    pub cooling_period_secs: u64,

    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,

    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
}

fn default_max_cpu_percent() -> f64 {
    80.0
}

fn default_max_memory_mb() -> f64 {
    2048.0
}

fn default_cooling_period_secs() -> u64 {
    30
}

fn default_sample_interval_secs() -> u64 {
    30
}

fn default_max_samples() -> usize {
    120
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_cpu_percent: default_max_cpu_percent(),
            max_memory_mb: default_max_memory_mb(),
            cooling_period_secs: default_cooling_period_secs(),
            sample_interval_secs: default_sample_interval_secs(),
            max_samples: default_max_samples(),
        }
    }
}

/// Axes and template for the built-in request source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    #[serde(default = "default_priorities")]
    pub priorities: Vec<String>,

    #[serde(default = "default_departments")]
    pub departments: Vec<String>,

    /// Placeholders: `{category}`, `{priority}`, `{department}`, `{sequence}`
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn default_categories() -> Vec<String> {
    strings(&["Hardware", "Software", "Network", "Security", "Database", "Email"])
}

fn default_priorities() -> Vec<String> {
    strings(&["1 - Critical", "2 - High", "3 - Moderate", "4 - Low"])
}

fn default_departments() -> Vec<String> {
    strings(&[
        "Engineering",
        "Operations",
        "Finance",
        "Sales",
        "Customer Service",
        "IT",
    ])
}

fn default_prompt_template() -> String {
    "Write IT service desk incident #{sequence}.\n\
     Category: {category}\nPriority: {priority}\nReporting department: {department}\n\n\
     Respond with a single JSON object with the string fields \
     \"short_description\", \"description\", \"work_notes\" and \"close_notes\". \
     Do not add any text outside the JSON object."
        .to_string()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            priorities: default_priorities(),
            departments: default_departments(),
            prompt_template: default_prompt_template(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("synthetic_data_output")
}

fn default_max_records_per_file() -> usize {
    5000
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            output_dir: default_output_dir(),
            max_records_per_file: default_max_records_per_file(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Batch(String),
    Retry(String),
    Resources(String),
    Provider(String),
    Context(String),
    Export(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Batch(msg) => write!(f, "batch: {}", msg),
            ValidationError::Retry(msg) => write!(f, "retry: {}", msg),
            ValidationError::Resources(msg) => write!(f, "resources: {}", msg),
            ValidationError::Provider(msg) => write!(f, "provider: {}", msg),
            ValidationError::Context(msg) => write!(f, "context: {}", msg),
            ValidationError::Export(msg) => write!(f, "export: {}", msg),
            ValidationError::Logging(msg) => write!(f, "logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl QuarryConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.batch.checkpoint_interval == 0 {
            errors.push(ValidationError::Batch(
                "checkpoint_interval must be at least 1".to_string(),
            ));
        }
        if self.batch.checkpoint_dir.as_os_str().is_empty() {
            errors.push(ValidationError::Batch("checkpoint_dir cannot be empty".to_string()));
        }
        if self.batch.required_fields.iter().any(|f| f.trim().is_empty()) {
            errors.push(ValidationError::Batch(
                "required_fields cannot contain blank names".to_string(),
            ));
        }

        if self.retry.max_retries > 20 {
            errors.push(ValidationError::Retry(format!(
                "max_retries {} is unreasonably high (max 20)",
                self.retry.max_retries
            )));
        }

        let resources = &self.resources;
        if !(resources.max_cpu_percent > 0.0 && resources.max_cpu_percent <= 100.0) {
            errors.push(ValidationError::Resources(format!(
                "max_cpu_percent must be within (0, 100]: {}",
                resources.max_cpu_percent
            )));
        }
        if resources.max_memory_mb <= 0.0 {
            errors.push(ValidationError::Resources(
                "max_memory_mb must be positive".to_string(),
            ));
        }
        if resources.sample_interval_secs == 0 {
            errors.push(ValidationError::Resources(
                "sample_interval_secs must be at least 1".to_string(),
            ));
        }
        if resources.max_samples == 0 {
            errors.push(ValidationError::Resources(
                "max_samples must be at least 1".to_string(),
            ));
        }

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }

        let context = &self.context;
        if context.categories.is_empty()
            || context.priorities.is_empty()
            || context.departments.is_empty()
        {
            errors.push(ValidationError::Context(
                "categories, priorities and departments must not be empty".to_string(),
            ));
        }
        if context.prompt_template.trim().is_empty() {
            errors.push(ValidationError::Context("prompt_template cannot be empty".to_string()));
        }

        if self.export.max_records_per_file == 0 {
            errors.push(ValidationError::Export(
                "max_records_per_file must be at least 1".to_string(),
            ));
        }

        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding all problems into one `ConfigError`
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            target_count: self.batch.target_records,
            checkpoint_interval: self.batch.checkpoint_interval,
            cooling_period: Duration::from_secs(self.resources.cooling_period_secs),
            required_fields: self.batch.required_fields.clone(),
            pricing: Pricing {
                prompt_per_1k: self.provider.prompt_cost_per_1k,
                completion_per_1k: self.provider.completion_cost_per_1k,
            },
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry.max_retries,
            base_delay: Duration::from_millis(self.retry.retry_delay_ms),
        }
    }

    pub fn governor_limits(&self) -> GovernorLimits {
        GovernorLimits {
            max_cpu_percent: self.resources.max_cpu_percent,
            max_memory_mb: self.resources.max_memory_mb,
            max_samples: self.resources.max_samples,
            sample_interval: Duration::from_secs(self.resources.sample_interval_secs),
        }
    }

    pub fn request_source(&self) -> Result<TemplateRequestSource, ApiError> {
        TemplateRequestSource::new(
            self.context.prompt_template.clone(),
            self.context.categories.clone(),
            self.context.priorities.clone(),
            self.context.departments.clone(),
        )
    }
}
