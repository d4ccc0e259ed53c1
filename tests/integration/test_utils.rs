//! Shared test utilities for integration tests
//!
//! A scripted provider whose replies are queued per call, plus a config
//! builder that keeps every path inside a temp directory.

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry::config::QuarryConfig;
use quarry::error::ApiError;
use quarry::provider::{GenerationProvider, ProviderResponse, TokenUsage};
use quarry::session::CancellationFlag;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

type CallHook = Box<dyn Fn(u64) + Send + Sync>;

/// A reply carrying every default required field
pub fn good_reply(n: u64) -> String {
    format!(
        r#"{{"short_description": "Laptop {n} will not boot", "description": "Black screen after update", "work_notes": "Reseated RAM", "close_notes": "Resolved"}}"#
    )
}

pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ApiError>>>,
    calls: Mutex<u64>,
    cancel_after: Option<(u64, CancellationFlag)>,
    on_call: Option<CallHook>,
}

impl ScriptedProvider {
    /// Queued replies are used first; afterwards every call succeeds.
    pub fn new(replies: Vec<Result<String, ApiError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
            cancel_after: None,
            on_call: None,
        }
    }

    pub fn always_ok() -> Self {
        Self::new(Vec::new())
    }

    /// Raise `flag` during call number `calls`, as a signal would mid-run.
    pub fn cancelling_after(mut self, calls: u64, flag: CancellationFlag) -> Self {
        self.cancel_after = Some((calls, flag));
        self
    }

    /// Run `hook` with the 1-based call number before each reply.
    pub fn on_call(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> u64 {
        *self.calls.lock()
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    async fn generate(&self, _prompt: &str) -> Result<ProviderResponse, ApiError> {
        let call = {
            let mut calls = self.calls.lock();
            *calls += 1;
            *calls
        };
        if let Some(hook) = &self.on_call {
            hook(call);
        }
        if let Some((after, flag)) = &self.cancel_after {
            if call >= *after {
                flag.cancel();
            }
        }
        let content = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(good_reply(call)))?;
        Ok(ProviderResponse {
            content,
            model: "scripted-model".to_string(),
            usage: TokenUsage {
                prompt_tokens: 100,
                completion_tokens: 50,
                total_tokens: 150,
            },
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn probe(&self) -> Result<(), ApiError> {
        Ok(())
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted-model"
    }
}

/// Config rooted at `root` with no retry delay and a short cooling period.
pub fn test_config(root: &Path, target: u64, interval: u64) -> QuarryConfig {
    let mut config = QuarryConfig::default();
    config.batch.target_records = target;
    config.batch.checkpoint_interval = interval;
    config.batch.checkpoint_dir = root.join("checkpoints");
    config.batch.ledger_path = Some(root.join("ledger"));
    config.retry.retry_delay_ms = 0;
    config.resources.cooling_period_secs = 0;
    config.export.output_dir = root.join("out");
    config
}

/// Copy the regular files of `from` into `to`, as a crash would leave them.
pub fn copy_dir_files(from: &Path, to: &Path) {
    fs::create_dir_all(to).unwrap();
    for entry in fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        if entry.file_type().unwrap().is_file() {
            fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
        }
    }
}
