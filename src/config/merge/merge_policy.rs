//! Merge rules: built-in defaults lowest, then config file, then environment.

use config::builder::DefaultState;
use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with the scalar defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("batch.target_records", 1000)?
        .set_default("batch.checkpoint_interval", 100)?
        .set_default("batch.checkpoint_dir", "checkpoints")?
        .set_default("retry.max_retries", 3)?
        .set_default("retry.retry_delay_ms", 1000)?
        .set_default("resources.max_cpu_percent", 80.0)?
        .set_default("resources.max_memory_mb", 2048.0)?
        .set_default("resources.cooling_period_secs", 30)?
        .set_default("resources.sample_interval_secs", 30)?
        .set_default("resources.max_samples", 120)?
        .set_default("provider.default_options.temperature", 0.7)?
        .set_default("provider.default_options.max_tokens", 2000)?
        .set_default("export.enabled", true)?
        .set_default("export.output_dir", "synthetic_data_output")?
        .set_default("export.max_records_per_file", 5000)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stdout")
}
