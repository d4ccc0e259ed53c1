//! On-disk checkpoint artifacts: JSON metadata plus a bincode records file.
//!
//! `serde_json::Value` does not round-trip through bincode, so record fields are
//! carried as a JSON string inside [`RecordWire`].

use crate::error::StorageError;
use crate::metrics::SessionMetricsSnapshot;
use crate::record::GeneratedRecord;
use crate::session::{SessionProgress, SessionState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FORMAT_VERSION: u32 = 1;

/// Everything needed to rebuild a session
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointSnapshot {
    pub progress: SessionProgress,
    pub records: Vec<GeneratedRecord>,
    pub metrics: SessionMetricsSnapshot,
    /// State of the session when the snapshot was taken
    pub state: SessionState,
}

/// Contents of `<id>.checkpoint.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub format_version: u32,
    pub session_id: String,
    pub state: SessionState,
    pub progress: SessionProgress,
    pub metrics: SessionMetricsSnapshot,
    /// Generation of the records file this metadata commits
    pub records_generation: u64,
    /// blake3 of the records file, lowercase hex
    pub records_digest: String,
    pub record_count: u64,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordWire {
    sequence: u64,
    fingerprint: String,
    attributes: BTreeMap<String, String>,
    fields_json: String,
    attempts: u32,
    generated_at_ms: i64,
}

pub fn encode_records(records: &[GeneratedRecord]) -> Result<Vec<u8>, StorageError> {
    let mut wire = Vec::with_capacity(records.len());
    for record in records {
        let fields_json = serde_json::to_string(&record.fields)
            .map_err(|e| StorageError::Serialization(format!("record {}: {}", record.sequence, e)))?;
        wire.push(RecordWire {
            sequence: record.sequence,
            fingerprint: record.fingerprint.clone(),
            attributes: record.attributes.clone(),
            fields_json,
            attempts: record.attempts,
            generated_at_ms: record.generated_at_ms,
        });
    }
    bincode::serialize(&wire).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub fn decode_records(bytes: &[u8]) -> Result<Vec<GeneratedRecord>, StorageError> {
    let wire: Vec<RecordWire> =
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;
    wire.into_iter()
        .map(|w| {
            let fields = serde_json::from_str(&w.fields_json).map_err(|e| {
                StorageError::Serialization(format!("record {}: {}", w.sequence, e))
            })?;
            Ok(GeneratedRecord {
                sequence: w.sequence,
                fingerprint: w.fingerprint,
                attributes: w.attributes,
                fields,
                attempts: w.attempts,
                generated_at_ms: w.generated_at_ms,
            })
        })
        .collect()
}

pub fn digest(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

/// Sequences must run 1..=n with no gaps or repeats.
pub fn check_sequences(records: &[GeneratedRecord]) -> Result<(), String> {
    for (index, record) in records.iter().enumerate() {
        let expected = index as u64 + 1;
        if record.sequence != expected {
            return Err(format!(
                "record at position {} has sequence {}",
                expected, record.sequence
            ));
        }
    }
    Ok(())
}
