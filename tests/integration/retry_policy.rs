//! Transient provider errors are retried; fatal ones stop the session resumably.

use crate::integration::test_utils::{test_config, ScriptedProvider};
use quarry::checkpoint::CheckpointStore;
use quarry::error::ApiError;
use quarry::ledger::{LedgerStatus, SessionLedger};
use quarry::runner::{BatchRunner, RunOptions};
use quarry::session::SessionState;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn transient_errors_are_retried_until_success() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), 3, 10);
    config.export.enabled = false;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Err(ApiError::ProviderRateLimit("429".to_string())),
        Err(ApiError::ProviderTimeout("read timed out".to_string())),
    ]));
    let mut runner = BatchRunner::new(config, provider.clone());
    let outcome = runner.run(RunOptions::default()).await.unwrap();

    assert_eq!(outcome.report.state, SessionState::Completed);
    assert_eq!(outcome.records[0].attempts, 3);
    assert_eq!(outcome.report.progress.failed_count, 0);
    assert_eq!(provider.calls(), 5);
    // Failed calls report no usage
    assert_eq!(outcome.report.metrics.provider_calls, 3);
}

#[tokio::test]
async fn fatal_error_fails_session_after_checkpointing() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 5, 10);
    let mut replies: Vec<Result<String, ApiError>> = (1..=3)
        .map(|n| Ok(crate::integration::test_utils::good_reply(n)))
        .collect();
    replies.push(Err(ApiError::ProviderAuthFailed("401 invalid key".to_string())));
    let provider = Arc::new(ScriptedProvider::new(replies));
    let ledger = SessionLedger::open(config.batch.ledger_path()).unwrap();
    let mut runner = BatchRunner::new(config.clone(), provider.clone()).with_ledger(ledger.clone());

    let result = runner
        .run(RunOptions {
            session_id: Some("batch_fatal".to_string()),
            ..RunOptions::default()
        })
        .await;
    assert!(matches!(result, Err(ApiError::ProviderAuthFailed(_))));
    // No retries after a fatal error
    assert_eq!(provider.calls(), 4);

    let store = CheckpointStore::new(&config.batch.checkpoint_dir);
    let saved = store.load("batch_fatal").unwrap().expect("checkpoint on failure");
    assert_eq!(saved.state, SessionState::Failed);
    assert_eq!(saved.progress.completed_count, 3);
    assert_eq!(saved.progress.failed_count, 0);

    let record = ledger.session("batch_fatal").unwrap().unwrap();
    assert_eq!(record.status, LedgerStatus::Failed);
    assert!(record.error.unwrap().contains("401"));
    assert!(record.status.is_resumable());

    // Nothing exported for a failed session
    assert!(!config.export.output_dir.exists());
}

#[tokio::test]
async fn failed_session_can_be_resumed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 4, 2);
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok(crate::integration::test_utils::good_reply(1)),
        Err(ApiError::ProviderModelNotFound("gpt-x".to_string())),
    ]));
    let mut runner = BatchRunner::new(config.clone(), provider);
    assert!(runner
        .run(RunOptions {
            session_id: Some("batch_refail".to_string()),
            ..RunOptions::default()
        })
        .await
        .is_err());

    let mut runner = BatchRunner::new(config, Arc::new(ScriptedProvider::always_ok()));
    let outcome = runner
        .run(RunOptions {
            resume: Some("batch_refail".to_string()),
            ..RunOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(outcome.report.state, SessionState::Completed);
    assert_eq!(outcome.report.resumed_from, Some(1));
    assert_eq!(outcome.records.len(), 4);
}
