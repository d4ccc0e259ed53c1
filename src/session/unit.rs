//! The unit of work run by a batch session: call the provider, recover the response.

use crate::error::ApiError;
use crate::provider::{GenerationProvider, TokenUsage};
use crate::recovery::{RecoveryOutcome, ResponseRecovery};
use crate::request::GenerationRequest;
use crate::retry::UnitOfWork;
use tracing::debug;

pub struct GenerationUnit<'a> {
    provider: &'a dyn GenerationProvider,
    request: &'a GenerationRequest,
    recovery: &'a ResponseRecovery,
    usage: Vec<TokenUsage>,
}

impl<'a> GenerationUnit<'a> {
    pub fn new(
        provider: &'a dyn GenerationProvider,
        request: &'a GenerationRequest,
        recovery: &'a ResponseRecovery,
    ) -> Self {
        Self {
            provider,
            request,
            recovery,
            usage: Vec::new(),
        }
    }

    /// Usage of every provider call that returned a response
    pub fn usage(&self) -> &[TokenUsage] {
        &self.usage
    }
}

impl UnitOfWork for GenerationUnit<'_> {
    async fn attempt(&mut self, attempt: u32) -> Result<RecoveryOutcome, ApiError> {
        self.request.validate()?;
        let response = self.provider.generate(self.request.prompt()).await?;
        self.usage.push(response.usage);
        debug!(
            attempt,
            fingerprint = %self.request.fingerprint(),
            completion_tokens = response.usage.completion_tokens,
            finish_reason = ?response.finish_reason,
            "Provider response received"
        );
        Ok(self.recovery.recover(&response.content))
    }
}
