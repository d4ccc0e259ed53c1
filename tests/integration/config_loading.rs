//! Layered configuration: defaults, file, environment, then validation.

use quarry::config::{ConfigLoader, ProviderType, ValidationError};
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes tests that touch `QUARRY__*` variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

#[test]
fn file_overrides_defaults_section_by_section() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("batch.toml");
    fs::write(
        &path,
        r#"
[batch]
target_records = 250
checkpoint_interval = 25

[provider]
provider_type = "azure_openai"
model = "incident-writer"
endpoint = "https://example.openai.azure.com"
api_version = "2024-02-01"

[provider.default_options]
temperature = 0.2

[context]
categories = ["Hardware"]
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from(Some(&path), dir.path()).unwrap();
    assert_eq!(config.batch.target_records, 250);
    assert_eq!(config.batch.checkpoint_interval, 25);
    assert_eq!(config.provider.provider_type, ProviderType::AzureOpenAI);
    assert_eq!(config.provider.default_options.temperature, Some(0.2));
    assert_eq!(config.provider.default_options.max_tokens, Some(2000));
    assert_eq!(config.context.categories, vec!["Hardware".to_string()]);
    assert_eq!(config.context.priorities.len(), 4);
    assert_eq!(config.retry.max_retries, 3);
    assert!(config.validate().is_ok());
}

#[test]
fn environment_overrides_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("quarry.toml"),
        "[batch]\ntarget_records = 10\n\n[resources]\nmax_cpu_percent = 50.0\n",
    )
    .unwrap();

    std::env::set_var("QUARRY__BATCH__TARGET_RECORDS", "42");
    std::env::set_var("QUARRY__EXPORT__ENABLED", "false");
    let loaded = ConfigLoader::load_from(None, dir.path());
    std::env::remove_var("QUARRY__BATCH__TARGET_RECORDS");
    std::env::remove_var("QUARRY__EXPORT__ENABLED");

    let config = loaded.unwrap();
    assert_eq!(config.batch.target_records, 42);
    assert!(!config.export.enabled);
    assert_eq!(config.resources.max_cpu_percent, 50.0);
}

#[test]
fn invalid_values_are_reported_together() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{
            "batch": {"checkpoint_interval": 0},
            "resources": {"max_cpu_percent": 0.0, "max_memory_mb": -1.0},
            "logging": {"format": "xml"}
        }"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from(Some(&path), dir.path()).unwrap();
    let errors = config.validate().unwrap_err();
    assert!(errors.iter().any(|e| matches!(e, ValidationError::Batch(_))));
    assert_eq!(
        errors
            .iter()
            .filter(|e| matches!(e, ValidationError::Resources(_)))
            .count(),
        2
    );
    assert!(errors.iter().any(|e| matches!(e, ValidationError::Logging(_))));
    assert!(config.ensure_valid().is_err());
}

#[test]
fn malformed_file_is_an_error() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[batch\ntarget_records = ").unwrap();
    assert!(ConfigLoader::load_from(Some(&path), dir.path()).is_err());
}
