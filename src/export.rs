//! Record export
//!
//! Completed sessions hand their records to a [`RecordSink`]. The built-in
//! sink writes JSON arrays, splitting output into files of at most
//! `max_records_per_file` records.

use crate::error::StorageError;
use crate::record::GeneratedRecord;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub files: Vec<PathBuf>,
    pub records: usize,
}

pub trait RecordSink {
    fn write(&mut self, session_id: &str, records: &[GeneratedRecord]) -> Result<ExportSummary, StorageError>;
}

/// Flatten a record for export: metadata, then context attributes, then fields.
/// Fields win over attributes of the same name.
pub fn export_value(record: &GeneratedRecord) -> Value {
    let mut object = Map::new();
    object.insert("sequence".to_string(), Value::from(record.sequence));
    object.insert("fingerprint".to_string(), Value::from(record.fingerprint.clone()));
    object.insert("attempts".to_string(), Value::from(record.attempts));
    if let Some(at) = Utc.timestamp_millis_opt(record.generated_at_ms).single() {
        object.insert("generated_at".to_string(), Value::from(at.to_rfc3339()));
    }
    for (key, value) in &record.attributes {
        object.insert(key.clone(), Value::from(value.clone()));
    }
    for (key, value) in &record.fields {
        object.insert(key.clone(), value.clone());
    }
    Value::Object(object)
}

pub struct JsonFileSink {
    output_dir: PathBuf,
    max_records_per_file: usize,
}

impl JsonFileSink {
    pub fn new<P: AsRef<Path>>(output_dir: P, max_records_per_file: usize) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            max_records_per_file: max_records_per_file.max(1),
        }
    }

    pub fn file_path(&self, session_id: &str, part: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_records_{:03}.json", session_id, part))
    }
}

impl RecordSink for JsonFileSink {
    fn write(&mut self, session_id: &str, records: &[GeneratedRecord]) -> Result<ExportSummary, StorageError> {
        if records.is_empty() {
            return Ok(ExportSummary::default());
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create export directory {:?}: {}", self.output_dir, e),
            ))
        })?;

        let mut summary = ExportSummary::default();
        for (index, chunk) in records.chunks(self.max_records_per_file).enumerate() {
            let path = self.file_path(session_id, index + 1);
            let values: Vec<Value> = chunk.iter().map(export_value).collect();
            let json = serde_json::to_vec_pretty(&values)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let temp_path = path.with_extension("json.tmp");
            fs::write(&temp_path, &json)?;
            fs::rename(&temp_path, &path).map_err(|e| {
                let _ = fs::remove_file(&temp_path);
                StorageError::IoError(e)
            })?;

            info!(path = %path.display(), records = chunk.len(), "Exported records");
            summary.records += chunk.len();
            summary.files.push(path);
        }
        Ok(summary)
    }
}
