//! Interrupted runs resume from their checkpoint without duplicating records.

use crate::integration::test_utils::{copy_dir_files, test_config, ScriptedProvider};
use quarry::checkpoint::CheckpointStore;
use quarry::ledger::{event, LedgerStatus, SessionLedger};
use quarry::runner::{BatchRunner, RunOptions};
use quarry::session::{CancellationFlag, SessionState};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const SESSION: &str = "batch_resume_test";

#[tokio::test]
async fn stopped_run_resumes_to_target_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 10, 3);
    let store = CheckpointStore::new(&config.batch.checkpoint_dir);

    // First run: cancellation arrives while the 7th record is generated
    let cancel = CancellationFlag::new();
    let provider = Arc::new(ScriptedProvider::always_ok().cancelling_after(7, cancel.clone()));
    let mut runner = BatchRunner::new(config.clone(), provider.clone())
        .with_cancellation(cancel)
        .with_ledger(SessionLedger::open(config.batch.ledger_path()).unwrap());
    let first = runner
        .run(RunOptions {
            session_id: Some(SESSION.to_string()),
            ..RunOptions::default()
        })
        .await
        .unwrap();
    drop(runner);

    assert_eq!(first.report.state, SessionState::Stopped);
    assert_eq!(first.report.progress.completed_count, 7);
    assert_eq!(first.report.last_checkpoint, Some(7));
    assert!(!first.checkpoint_removed);

    // The stopped run exports what it has; the checkpoint stays for resuming
    let partial = first.export.expect("partial export on stop");
    assert_eq!(partial.records, 7);
    let exported: Vec<Value> =
        serde_json::from_slice(&std::fs::read(&partial.files[0]).unwrap()).unwrap();
    assert_eq!(exported.len(), 7);
    assert_eq!(provider.calls(), 7);

    let saved = store.load(SESSION).unwrap().expect("checkpoint after stop");
    assert_eq!(saved.state, SessionState::Stopped);
    assert_eq!(saved.records.len(), 7);
    assert_eq!(saved.progress.target_count, 10);

    // Second run resumes; the configured target is ignored in favour of the checkpoint
    let mut resumed_config = config.clone();
    resumed_config.batch.target_records = 50;
    let provider = Arc::new(ScriptedProvider::always_ok());
    let mut runner = BatchRunner::new(resumed_config, provider.clone())
        .with_ledger(SessionLedger::open(config.batch.ledger_path()).unwrap());
    let second = runner
        .run(RunOptions {
            resume: Some(SESSION.to_string()),
            ..RunOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(second.report.state, SessionState::Completed);
    assert_eq!(second.report.progress.completed_count, 10);
    assert_eq!(second.report.resumed_from, Some(7));
    assert_eq!(provider.calls(), 3);

    let sequences: Vec<u64> = second.records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=10).collect::<Vec<_>>());
    let unique: HashSet<u64> = sequences.iter().copied().collect();
    assert_eq!(unique.len(), 10);

    // Metrics carry across the restart
    assert_eq!(second.report.metrics.total_generated, 10);
    assert_eq!(second.report.metrics.total_tokens, 10 * 150);

    let export = second.export.expect("export on completion");
    assert_eq!(export.records, 10);
    assert_eq!(export.files, partial.files);
    let exported: Vec<Value> =
        serde_json::from_slice(&std::fs::read(&export.files[0]).unwrap()).unwrap();
    assert_eq!(exported.len(), 10);
    assert_eq!(exported[9]["sequence"], 10);

    assert!(second.checkpoint_removed);
    assert!(store.load(SESSION).unwrap().is_none());

    drop(runner);
    let ledger = SessionLedger::open(config.batch.ledger_path()).unwrap();
    let record = ledger.session(SESSION).unwrap().unwrap();
    assert_eq!(record.status, LedgerStatus::Completed);
    assert_eq!(record.resume_count, 1);
    assert_eq!(record.completed_count, 10);
    let starts = ledger
        .events(SESSION)
        .unwrap()
        .into_iter()
        .filter(|e| e.event_type == event::SESSION_STARTED)
        .count();
    assert_eq!(starts, 2);
}

#[tokio::test]
async fn resume_without_checkpoint_is_an_error() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 5, 2);
    let mut runner = BatchRunner::new(config, Arc::new(ScriptedProvider::always_ok()));
    let result = runner
        .run(RunOptions {
            resume: Some("batch_missing".to_string()),
            ..RunOptions::default()
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn corrupt_checkpoint_is_not_resumed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 6, 2);
    let store = CheckpointStore::new(&config.batch.checkpoint_dir);

    let cancel = CancellationFlag::new();
    let provider = Arc::new(ScriptedProvider::always_ok().cancelling_after(2, cancel.clone()));
    let mut runner = BatchRunner::new(config.clone(), provider).with_cancellation(cancel);
    runner
        .run(RunOptions {
            session_id: Some(SESSION.to_string()),
            ..RunOptions::default()
        })
        .await
        .unwrap();

    let metadata = store.read_metadata(SESSION).unwrap();
    let records_path = store.records_path(SESSION, metadata.records_generation);
    let mut bytes = std::fs::read(&records_path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&records_path, bytes).unwrap();

    let mut runner = BatchRunner::new(config, Arc::new(ScriptedProvider::always_ok()));
    let result = runner
        .run(RunOptions {
            resume: Some(SESSION.to_string()),
            ..RunOptions::default()
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn failed_checkpoint_save_is_retried_on_next_record() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 9, 3);
    // A regular file where the checkpoint directory belongs makes saves fail
    let blocker = config.batch.checkpoint_dir.clone();
    std::fs::write(&blocker, b"not a directory").unwrap();

    let unblock = blocker.clone();
    let provider = Arc::new(ScriptedProvider::always_ok().on_call(move |call| {
        if call == 4 {
            std::fs::remove_file(&unblock).unwrap();
        }
    }));
    let mut runner = BatchRunner::new(config.clone(), provider)
        .with_ledger(SessionLedger::open(config.batch.ledger_path()).unwrap());
    let outcome = runner
        .run(RunOptions {
            session_id: Some("batch_save_retry".to_string()),
            skip_export: true,
            ..RunOptions::default()
        })
        .await
        .unwrap();
    drop(runner);

    assert_eq!(outcome.report.state, SessionState::Completed);
    assert_eq!(outcome.report.progress.completed_count, 9);
    assert_eq!(outcome.report.last_checkpoint, Some(9));

    let ledger = SessionLedger::open(config.batch.ledger_path()).unwrap();
    let events = ledger.events("batch_save_retry").unwrap();
    let completed_at = |kind: &str| -> Vec<u64> {
        events
            .iter()
            .filter(|e| e.event_type == kind)
            .filter_map(|e| e.data["completed_count"].as_u64())
            .collect()
    };
    // The save due at record 3 fails and is retried at 4, not deferred to 6
    assert_eq!(completed_at(event::CHECKPOINT_FAILED), vec![3]);
    assert_eq!(completed_at(event::CHECKPOINT_SAVED), vec![4, 7, 9]);
}

#[tokio::test]
async fn resume_after_crash_regenerates_records_past_the_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), 9, 3);
    let crash_dir = dir.path().join("crashed");

    // Freeze the checkpoint files as the 8th record is requested: 7 records
    // are held in memory while the last save covered 6. That copy is what a
    // process killed at this point leaves on disk.
    let live = config.batch.checkpoint_dir.clone();
    let frozen = crash_dir.clone();
    let provider = Arc::new(ScriptedProvider::always_ok().on_call(move |call| {
        if call == 8 {
            copy_dir_files(&live, &frozen);
        }
    }));
    let mut runner = BatchRunner::new(config.clone(), provider);
    let first = runner
        .run(RunOptions {
            session_id: Some(SESSION.to_string()),
            skip_export: true,
            ..RunOptions::default()
        })
        .await
        .unwrap();
    assert_eq!(first.report.state, SessionState::Completed);

    let left_behind = CheckpointStore::new(&crash_dir)
        .load(SESSION)
        .unwrap()
        .expect("checkpoint left by the crash");
    assert_eq!(left_behind.records.len(), 6);
    assert_eq!(left_behind.progress.completed_count, 6);
    // Re-work after a crash stays under one checkpoint interval
    assert!(7 - left_behind.progress.completed_count < 3);

    let mut crashed_config = config.clone();
    crashed_config.batch.checkpoint_dir = crash_dir;
    let provider = Arc::new(ScriptedProvider::always_ok());
    let mut runner = BatchRunner::new(crashed_config, provider.clone());
    let resumed = runner
        .run(RunOptions {
            resume: Some(SESSION.to_string()),
            skip_export: true,
            ..RunOptions::default()
        })
        .await
        .unwrap();

    assert_eq!(resumed.report.state, SessionState::Completed);
    assert_eq!(resumed.report.resumed_from, Some(6));
    assert_eq!(provider.calls(), 3);
    let sequences: Vec<u64> = resumed.records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, (1..=9).collect::<Vec<_>>());
}
