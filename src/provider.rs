//! Generation Provider Abstraction
//!
//! The pipeline treats the text-generation provider as a black box: a rendered
//! prompt goes in, raw text (plus token usage) comes out, or an error tagged as
//! transient or fatal. The production client speaks the OpenAI chat-completions
//! protocol, either against OpenAI-compatible endpoints or Azure OpenAI
//! deployments.

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub mod profile;

pub use profile::{ProviderConfig, ProviderType};

/// Completion options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub temperature: Option<f32>, // 0.0-2.0
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: Some(0.7),
            max_tokens: Some(2000),
            top_p: None,
        }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw provider output for one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: Option<String>,
}

/// Text-generation provider boundary
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate raw text for a rendered prompt
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ApiError>;

    /// Startup reachability/credential check; any error here fails the session
    async fn probe(&self) -> Result<(), ApiError>;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

// OpenAI-compatible API request/response structures
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Map an HTTP status (and body text) to the error taxonomy
pub(crate) fn map_status(status: u16, body: &str) -> ApiError {
    match status {
        401 | 403 => ApiError::ProviderAuthFailed(format!("Authentication failed: {}", body)),
        404 => ApiError::ProviderModelNotFound(format!("Model not found: {}", body)),
        408 | 504 => ApiError::ProviderTimeout(format!("Request timeout ({}): {}", status, body)),
        429 => ApiError::ProviderRateLimit(format!("Rate limit exceeded: {}", body)),
        _ => ApiError::ProviderRequestFailed(format!(
            "Request failed with status {}: {}",
            status, body
        )),
    }
}

// Helper function to map transport errors to ApiError
fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        map_status(status.as_u16(), &error.to_string())
    } else if error.is_timeout() {
        ApiError::ProviderTimeout(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::ProviderRequestFailed(format!("Connection error: {}", error))
    } else {
        ApiError::ProviderError(format!("HTTP error: {}", error))
    }
}

const PROVIDER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn build_provider_http_client(request_timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .connect_timeout(PROVIDER_HTTP_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
        .map_err(|e| ApiError::ProviderError(format!("Failed to create HTTP client: {}", e)))
}

/// Where and how chat-completion requests are addressed
#[derive(Debug, Clone)]
enum Endpoint {
    OpenAI {
        base_url: String,
    },
    Azure {
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

/// Chat-completions client for OpenAI-compatible and Azure OpenAI endpoints
pub struct ChatCompletionsClient {
    client: Client,
    endpoint: Endpoint,
    model: String,
    api_key: String,
    system_prompt: Option<String>,
    options: CompletionOptions,
}

impl ChatCompletionsClient {
    pub fn openai(
        model: String,
        api_key: String,
        base_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base_url = base_url
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client: build_provider_http_client(request_timeout)?,
            endpoint: Endpoint::OpenAI { base_url },
            model,
            api_key,
            system_prompt: None,
            options: CompletionOptions::default(),
        })
    }

    pub fn azure(
        deployment: String,
        api_key: String,
        endpoint: String,
        api_version: String,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_provider_http_client(request_timeout)?,
            endpoint: Endpoint::Azure {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                deployment: deployment.clone(),
                api_version,
            },
            model: deployment,
            api_key,
            system_prompt: None,
            options: CompletionOptions::default(),
        })
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    fn completions_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAI { base_url } => format!("{}/chat/completions", base_url),
            Endpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint, deployment, api_version
            ),
        }
    }

    fn models_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAI { base_url } => format!("{}/models", base_url),
            Endpoint::Azure {
                endpoint,
                api_version,
                ..
            } => format!("{}/openai/models?api-version={}", endpoint, api_version),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.endpoint {
            Endpoint::OpenAI { .. } => {
                request.header("Authorization", format!("Bearer {}", self.api_key))
            }
            Endpoint::Azure { .. } => request.header("api-key", &self.api_key),
        }
    }

    fn build_messages(&self, prompt: &str) -> Vec<OpenAIMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(OpenAIMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
        messages
    }
}

#[async_trait]
impl GenerationProvider for ChatCompletionsClient {
    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, ApiError> {
        let model = match self.endpoint {
            Endpoint::OpenAI { .. } => Some(self.model.as_str()),
            // Azure addresses the model through the deployment path
            Endpoint::Azure { .. } => None,
        };
        let request = ChatCompletionRequest {
            model,
            messages: self.build_messages(prompt),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            top_p: self.options.top_p,
            stream: false,
        };

        let response = self
            .authorize(self.client.post(self.completions_url()))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &error_text));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ProviderError(format!("Failed to parse response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::ProviderError("No choices in response".to_string()))?;

        let usage = completion.usage.unwrap_or(Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        });

        debug!(
            provider = self.provider_name(),
            total_tokens = usage.total_tokens,
            "provider completion received"
        );

        Ok(ProviderResponse {
            content: choice.message.content,
            model: completion.model.unwrap_or_else(|| self.model.clone()),
            usage: TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            finish_reason: choice.finish_reason,
        })
    }

    async fn probe(&self) -> Result<(), ApiError> {
        let response = self
            .authorize(self.client.get(self.models_url()))
            .send()
            .await
            .map_err(|e| ApiError::ProviderUnreachable(format!("{}", e)))?;

        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status().as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        match map_status(status, &error_text) {
            err @ (ApiError::ProviderAuthFailed(_) | ApiError::ProviderModelNotFound(_)) => Err(err),
            other => Err(ApiError::ProviderUnreachable(other.to_string())),
        }
    }

    fn provider_name(&self) -> &str {
        match self.endpoint {
            Endpoint::OpenAI { .. } => "openai",
            Endpoint::Azure { .. } => "azure_openai",
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
