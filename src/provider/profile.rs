//! Provider configuration and client construction.

use super::{ChatCompletionsClient, CompletionOptions, GenerationProvider};
use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "azure_openai")]
    AzureOpenAI,
}

impl ProviderType {
    /// Environment variable consulted when no key is configured inline
    pub fn default_api_key_env(self) -> &'static str {
        match self {
            ProviderType::OpenAI => "OPENAI_API_KEY",
            ProviderType::AzureOpenAI => "AZURE_OPENAI_API_KEY",
        }
    }
}

fn default_provider_type() -> ProviderType {
    ProviderType::OpenAI
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_prompt_cost_per_1k() -> f64 {
    0.00015
}

fn default_completion_cost_per_1k() -> f64 {
    0.0006
}

/// Provider section of the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_type")]
    pub provider_type: ProviderType,

    /// Model name, or deployment name for Azure
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL (OpenAI-compatible) or resource endpoint (Azure)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Azure API version
    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub default_options: CompletionOptions,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// USD per 1000 prompt tokens
    #[serde(default = "default_prompt_cost_per_1k")]
    pub prompt_cost_per_1k: f64,

    /// USD per 1000 completion tokens
    #[serde(default = "default_completion_cost_per_1k")]
    pub completion_cost_per_1k: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            model: default_model(),
            endpoint: None,
            api_key: None,
            api_key_env: None,
            api_version: None,
            system_prompt: None,
            default_options: CompletionOptions::default(),
            request_timeout_secs: default_request_timeout_secs(),
            prompt_cost_per_1k: default_prompt_cost_per_1k(),
            completion_cost_per_1k: default_completion_cost_per_1k(),
        }
    }
}

impl ProviderConfig {
    /// Static validation; credentials are resolved later
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("Model name cannot be empty".to_string());
        }
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("Endpoint must be an http(s) URL: {}", endpoint));
            }
        }
        if self.provider_type == ProviderType::AzureOpenAI {
            if self.endpoint.is_none() {
                return Err("Azure OpenAI requires an endpoint".to_string());
            }
            if self.api_version.is_none() {
                return Err("Azure OpenAI requires an api_version".to_string());
            }
        }
        if let Some(temperature) = self.default_options.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(format!("Temperature must be within 0.0-2.0: {}", temperature));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("Request timeout must be positive".to_string());
        }
        if self.prompt_cost_per_1k < 0.0 || self.completion_cost_per_1k < 0.0 {
            return Err("Token prices cannot be negative".to_string());
        }
        Ok(())
    }

    /// Inline key first, then the configured (or default) environment variable
    pub fn resolve_api_key(&self) -> Result<String, ApiError> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        let env_name = self
            .api_key_env
            .clone()
            .unwrap_or_else(|| self.provider_type.default_api_key_env().to_string());
        match std::env::var(&env_name) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(ApiError::ProviderNotConfigured(format!(
                "No API key configured; set provider.api_key or {}",
                env_name
            ))),
        }
    }

    pub fn create_client(&self) -> Result<Arc<dyn GenerationProvider>, ApiError> {
        self.validate().map_err(ApiError::ConfigError)?;
        let api_key = self.resolve_api_key()?;
        let timeout = Duration::from_secs(self.request_timeout_secs);
        let client = match self.provider_type {
            ProviderType::OpenAI => ChatCompletionsClient::openai(
                self.model.clone(),
                api_key,
                self.endpoint.clone(),
                timeout,
            )?,
            ProviderType::AzureOpenAI => ChatCompletionsClient::azure(
                self.model.clone(),
                api_key,
                self.endpoint.clone().unwrap_or_default(),
                self.api_version.clone().unwrap_or_default(),
                timeout,
            )?,
        };
        Ok(Arc::new(
            client
                .with_options(self.default_options.clone())
                .with_system_prompt(self.system_prompt.clone()),
        ))
    }
}
