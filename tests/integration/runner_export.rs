//! End-to-end runs: export on completion, checkpoint cleanup, ledger bookkeeping.

use crate::integration::test_utils::{test_config, ScriptedProvider};
use quarry::checkpoint::CheckpointStore;
use quarry::error::StorageError;
use quarry::export::{ExportSummary, RecordSink};
use quarry::ledger::{LedgerStatus, SessionLedger};
use quarry::record::GeneratedRecord;
use quarry::runner::{BatchRunner, RunOptions};
use quarry::session::SessionState;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

struct BrokenSink;

impl RecordSink for BrokenSink {
    fn write(&mut self, _session_id: &str, _records: &[GeneratedRecord]) -> Result<ExportSummary, StorageError> {
        Err(StorageError::IoError(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only output",
        )))
    }
}

#[tokio::test]
async fn completed_run_exports_in_parts_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), 10, 4);
    config.export.max_records_per_file = 4;
    let mut runner = BatchRunner::new(config.clone(), Arc::new(ScriptedProvider::always_ok()));
    let outcome = runner
        .run(RunOptions {
            session_id: Some("batch_export".to_string()),
            ..RunOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(outcome.report.state, SessionState::Completed);
    let export = outcome.export.unwrap();
    assert_eq!(export.records, 10);
    assert_eq!(export.files.len(), 3);
    assert!(export.files[0].ends_with("batch_export_records_001.json"));
    assert!(export.files[2].ends_with("batch_export_records_003.json"));

    let first: Vec<Value> = serde_json::from_slice(&std::fs::read(&export.files[0]).unwrap()).unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(first[0]["sequence"], 1);
    assert!(first[0]["category"].is_string());
    assert_eq!(first[0]["close_notes"], "Resolved");

    assert!(outcome.checkpoint_removed);
    let store = CheckpointStore::new(&config.batch.checkpoint_dir);
    assert!(store.list_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn skipped_export_still_cleans_up() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 3, 1);
    let mut runner = BatchRunner::new(config.clone(), Arc::new(ScriptedProvider::always_ok()));
    let outcome = runner
        .run(RunOptions {
            skip_export: true,
            ..RunOptions::default()
        })
        .await
        .unwrap();
    assert!(outcome.export.is_none());
    assert!(outcome.checkpoint_removed);
    assert!(!config.export.output_dir.exists());
}

#[tokio::test]
async fn export_failure_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 3, 10);
    let mut runner = BatchRunner::new(config.clone(), Arc::new(ScriptedProvider::always_ok()))
        .with_sink(Box::new(BrokenSink));
    let result = runner
        .run(RunOptions {
            session_id: Some("batch_sinkfail".to_string()),
            ..RunOptions::default()
        })
        .await;
    assert!(result.is_err());

    let store = CheckpointStore::new(&config.batch.checkpoint_dir);
    let saved = store.load("batch_sinkfail").unwrap().unwrap();
    assert_eq!(saved.state, SessionState::Completed);
    assert_eq!(saved.records.len(), 3);
}

#[tokio::test]
async fn existing_checkpoint_blocks_fresh_session_with_same_id() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 3, 10);
    let mut runner = BatchRunner::new(config.clone(), Arc::new(ScriptedProvider::always_ok()))
        .with_sink(Box::new(BrokenSink));
    let options = RunOptions {
        session_id: Some("batch_taken".to_string()),
        ..RunOptions::default()
    };
    assert!(runner.run(options.clone()).await.is_err());

    let mut runner = BatchRunner::new(config, Arc::new(ScriptedProvider::always_ok()));
    assert!(runner.run(options).await.is_err());
}

#[tokio::test]
async fn invalid_session_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 3, 10);
    let mut runner = BatchRunner::new(config, Arc::new(ScriptedProvider::always_ok()));
    let result = runner
        .run(RunOptions {
            session_id: Some("../escape".to_string()),
            ..RunOptions::default()
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn stale_active_sessions_are_marked_interrupted() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 2, 10);
    let ledger = SessionLedger::open(config.batch.ledger_path()).unwrap();
    ledger.start_session("batch_crashed", 100, 40).unwrap();

    let mut runner = BatchRunner::new(config, Arc::new(ScriptedProvider::always_ok()))
        .with_ledger(ledger.clone());
    let outcome = runner
        .run(RunOptions {
            session_id: Some("batch_next".to_string()),
            skip_export: true,
            ..RunOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(outcome.report.state, SessionState::Completed);

    let crashed = ledger.session("batch_crashed").unwrap().unwrap();
    assert_eq!(crashed.status, LedgerStatus::Interrupted);
    let next = ledger.session("batch_next").unwrap().unwrap();
    assert_eq!(next.status, LedgerStatus::Completed);
    assert_eq!(next.completed_count, 2);
}
