//! Checkpoint persistence across sessions and integrity rules on load.

use quarry::checkpoint::{CheckpointSnapshot, CheckpointStore};
use quarry::error::StorageError;
use quarry::metrics::{Pricing, SessionMetrics};
use quarry::provider::TokenUsage;
use quarry::record::GeneratedRecord;
use quarry::request::{GenerationRequest, RequestContext};
use quarry::session::{SessionProgress, SessionState};
use serde_json::{Map, Value};
use tempfile::TempDir;

fn record(sequence: u64) -> GeneratedRecord {
    let request = GenerationRequest::new(
        format!("incident {}", sequence),
        RequestContext::new()
            .with("category", "Network")
            .with("priority", "2 - High"),
    );
    let mut fields = Map::new();
    fields.insert(
        "short_description".to_string(),
        Value::from(format!("Switch {} flapping", sequence)),
    );
    GeneratedRecord::new(sequence, &request, fields, 1)
}

fn snapshot(session_id: &str, sequences: &[u64]) -> CheckpointSnapshot {
    let records: Vec<GeneratedRecord> = sequences.iter().copied().map(record).collect();
    let mut metrics = SessionMetrics::new(Pricing::default());
    for r in &records {
        let context = RequestContext::new().with("category", r.attributes["category"].clone());
        metrics.record_unit_started();
        metrics.record_provider_call(&TokenUsage {
            prompt_tokens: 20,
            completion_tokens: 10,
            total_tokens: 30,
        });
        metrics.record_success(&context, 40);
    }
    let mut progress = SessionProgress::new(session_id, 10);
    progress.completed_count = records.len() as u64;
    CheckpointSnapshot {
        progress,
        records,
        metrics: metrics.snapshot(),
        state: SessionState::Stopped,
    }
}

#[test]
fn sessions_are_isolated() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path());
    store.save("batch_b", &snapshot("batch_b", &[1, 2])).unwrap();
    store.save("batch_a", &snapshot("batch_a", &[1, 2, 3])).unwrap();

    assert_eq!(store.list_sessions().unwrap(), vec!["batch_a", "batch_b"]);

    store.cleanup("batch_a").unwrap();
    assert_eq!(store.list_sessions().unwrap(), vec!["batch_b"]);
    assert_eq!(store.load("batch_b").unwrap().unwrap().records.len(), 2);
}

#[test]
fn metrics_and_records_survive_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path());
    let original = snapshot("batch_rt", &[1, 2, 3, 4]);
    store.save("batch_rt", &original).unwrap();

    let loaded = store.load("batch_rt").unwrap().unwrap();
    assert_eq!(loaded, original);
    assert_eq!(loaded.metrics.category_distribution["Network"], 4);
    assert_eq!(loaded.metrics.total_tokens, 120);
    assert_eq!(
        loaded.records[3].field("short_description"),
        Some(&Value::from("Switch 4 flapping"))
    );
}

#[test]
fn duplicated_sequences_are_rejected() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path());
    store.save("batch_dup", &snapshot("batch_dup", &[1, 2, 2])).unwrap();

    assert!(store.load("batch_dup").unwrap().is_none());
    assert!(matches!(
        store.inspect("batch_dup"),
        Err(StorageError::CorruptCheckpoint { .. })
    ));
}

#[test]
fn later_save_supersedes_earlier() {
    let dir = TempDir::new().unwrap();
    let store = CheckpointStore::new(dir.path());
    store.save("batch_up", &snapshot("batch_up", &[1, 2, 3])).unwrap();
    store
        .save("batch_up", &snapshot("batch_up", &[1, 2, 3, 4, 5, 6]))
        .unwrap();

    let loaded = store.load("batch_up").unwrap().unwrap();
    assert_eq!(loaded.progress.completed_count, 6);
    let metadata = store.read_metadata("batch_up").unwrap();
    assert_eq!(metadata.record_count, 6);
    assert!(!store.records_path("batch_up", metadata.records_generation - 1).exists());
}
