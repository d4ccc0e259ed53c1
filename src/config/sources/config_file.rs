//! Config file source: an explicit `--config` path, or `quarry.toml` in the working directory.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "quarry.toml";

/// Candidate file when no path is given.
pub fn default_config_path(working_dir: &Path) -> PathBuf {
    working_dir.join(DEFAULT_CONFIG_FILE)
}

/// Add the config file to the builder. An explicit path must exist; the
/// default one is optional. The format follows the file extension.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    explicit: Option<&Path>,
    working_dir: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::Message(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            debug!(config_path = %path.display(), "Loading config file");
            Ok(builder.add_source(File::from(path).required(true)))
        }
        None => {
            let path = default_config_path(working_dir);
            if path.exists() {
                debug!(config_path = %path.display(), "Loading default config file");
                Ok(builder.add_source(File::from(path.as_path()).required(false)))
            } else {
                Ok(builder)
            }
        }
    }
}
