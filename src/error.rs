//! Error types for the quarry batch generation pipeline.

use crate::recovery::RejectionReason;
use thiserror::Error;

/// Storage-related errors (checkpoints, ledger, exports)
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Checkpoint corrupt for session {session_id}: {reason}")]
    CorruptCheckpoint { session_id: String, reason: String },

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Pipeline-level errors.
///
/// Provider variants carry the transient/fatal split used by the retry
/// executor; see [`ApiError::is_transient`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    #[error("Provider request failed: {0}")]
    ProviderRequestFailed(String),

    #[error("Provider request timed out: {0}")]
    ProviderTimeout(String),

    #[error("Provider authentication failed: {0}")]
    ProviderAuthFailed(String),

    #[error("Provider rate limit exceeded: {0}")]
    ProviderRateLimit(String),

    #[error("Provider model not found: {0}")]
    ProviderModelNotFound(String),

    #[error("Provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("Invalid context fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("Response rejected: {0}")]
    ResponseRejected(RejectionReason),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Session failed: {0}")]
    SessionFailed(String),
}

impl ApiError {
    /// Whether a unit of work that failed with this error may be attempted again.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::ProviderTimeout(_)
            | ApiError::ProviderRateLimit(_)
            | ApiError::ProviderRequestFailed(_)
            | ApiError::ProviderError(_)
            | ApiError::ResponseRejected(_) => true,
            ApiError::ProviderNotConfigured(_)
            | ApiError::ProviderAuthFailed(_)
            | ApiError::ProviderModelNotFound(_)
            | ApiError::ProviderUnreachable(_)
            | ApiError::InvalidFingerprint(_)
            | ApiError::ConfigError(_)
            | ApiError::SessionFailed(_)
            | ApiError::StorageError(_) => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
