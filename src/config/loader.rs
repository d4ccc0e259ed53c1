//! Config loading: assemble sources in precedence order and deserialize.

use super::merge::merge_policy;
use super::sources::{config_file, environment};
use super::QuarryConfig;
use config::ConfigError;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration: defaults, then `explicit` (or `./quarry.toml`), then environment.
    pub fn load(explicit: Option<&Path>) -> Result<QuarryConfig, ConfigError> {
        let working_dir = std::env::current_dir().map_err(|e| {
            ConfigError::Message(format!("Cannot determine working directory: {}", e))
        })?;
        Self::load_from(explicit, &working_dir)
    }

    pub fn load_from(explicit: Option<&Path>, working_dir: &Path) -> Result<QuarryConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = config_file::add_to_builder(builder, explicit, working_dir)?;
        let builder = environment::add_to_builder(builder);
        builder.build()?.try_deserialize()
    }

    /// Defaults and environment only
    pub fn load_without_file() -> Result<QuarryConfig, ConfigError> {
        let builder = environment::add_to_builder(merge_policy::builder_with_defaults()?);
        builder.build()?.try_deserialize()
    }
}
