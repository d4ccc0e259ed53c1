//! Checkpoint store
//!
//! Durable snapshots of a batch session, one file pair per session:
//! `{dir}/{id}.checkpoint.json` and `{dir}/{id}.records.{generation}.bin`.
//!
//! A save writes a fresh records generation first and then replaces the
//! metadata file, which names that generation and its digest. The metadata
//! rename is the commit point: a crash at any step leaves either the previous
//! checkpoint or the new one loadable, never a mixture.

pub mod artifact;

pub use artifact::{CheckpointMetadata, CheckpointSnapshot};

use crate::error::StorageError;
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const METADATA_SUFFIX: &str = ".checkpoint.json";
const RECORDS_INFIX: &str = ".records.";
const RECORDS_SUFFIX: &str = ".bin";
const MAX_SESSION_ID_LEN: usize = 128;

/// Session ids become file names, so they are limited to `[A-Za-z0-9_-]`.
pub fn validate_session_id(session_id: &str) -> Result<(), StorageError> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(StorageError::InvalidSessionId(format!(
            "'{}' must be 1-{} characters",
            session_id, MAX_SESSION_ID_LEN
        )));
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StorageError::InvalidSessionId(format!(
            "'{}' may only contain letters, digits, '_' and '-'",
            session_id
        )));
    }
    Ok(())
}

pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store rooted at `dir`; the directory is created on first save.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn metadata_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}{}", session_id, METADATA_SUFFIX))
    }

    pub fn records_path(&self, session_id: &str, generation: u64) -> PathBuf {
        self.dir.join(format!(
            "{}{}{}{}",
            session_id, RECORDS_INFIX, generation, RECORDS_SUFFIX
        ))
    }

    /// Persist a snapshot, replacing any previous checkpoint for the session.
    pub fn save(&self, session_id: &str, snapshot: &CheckpointSnapshot) -> Result<(), StorageError> {
        validate_session_id(session_id)?;
        if snapshot.progress.session_id != session_id {
            return Err(StorageError::InvalidSessionId(format!(
                "snapshot belongs to '{}', not '{}'",
                snapshot.progress.session_id, session_id
            )));
        }

        fs::create_dir_all(&self.dir).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to create checkpoint directory {:?}: {}", self.dir, e),
            ))
        })?;

        let previous = self.record_generations(session_id)?;
        let generation = previous.iter().copied().max().map_or(1, |g| g + 1);

        let bytes = artifact::encode_records(&snapshot.records)?;
        let records_path = self.records_path(session_id, generation);
        write_atomic(&records_path, &bytes)?;

        let metadata = CheckpointMetadata {
            format_version: artifact::FORMAT_VERSION,
            session_id: session_id.to_string(),
            state: snapshot.state,
            progress: snapshot.progress.clone(),
            metrics: snapshot.metrics.clone(),
            records_generation: generation,
            records_digest: artifact::digest(&bytes),
            record_count: snapshot.records.len() as u64,
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if let Err(e) = write_atomic(&self.metadata_path(session_id), &json) {
            let _ = fs::remove_file(&records_path);
            return Err(e);
        }

        for old in previous {
            let path = self.records_path(session_id, old);
            if let Err(e) = fs::remove_file(&path) {
                debug!(path = ?path, error = %e, "Failed to remove superseded records file");
            }
        }

        debug!(
            session_id,
            generation,
            records = snapshot.records.len(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load the committed checkpoint, or `None` if it is missing or unusable.
    pub fn load(&self, session_id: &str) -> Result<Option<CheckpointSnapshot>, StorageError> {
        validate_session_id(session_id)?;
        if !self.metadata_path(session_id).exists() {
            return Ok(None);
        }
        match self.inspect(session_id) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(session_id, error = %e, "Ignoring unusable checkpoint");
                Ok(None)
            }
        }
    }

    /// Like [`load`](Self::load) but reports why a checkpoint is unusable.
    pub fn inspect(&self, session_id: &str) -> Result<CheckpointSnapshot, StorageError> {
        validate_session_id(session_id)?;
        let corrupt = |reason: String| StorageError::CorruptCheckpoint {
            session_id: session_id.to_string(),
            reason,
        };

        let metadata = self.read_metadata(session_id)?;
        if metadata.session_id != session_id || metadata.progress.session_id != session_id {
            return Err(corrupt(format!(
                "metadata names session '{}'",
                metadata.session_id
            )));
        }

        let records_path = self.records_path(session_id, metadata.records_generation);
        let bytes = fs::read(&records_path).map_err(|e| {
            corrupt(format!("records file {:?} unreadable: {}", records_path, e))
        })?;
        let actual_digest = artifact::digest(&bytes);
        if actual_digest != metadata.records_digest {
            return Err(corrupt(format!(
                "records digest {} does not match {}",
                actual_digest, metadata.records_digest
            )));
        }
        let records = artifact::decode_records(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if records.len() as u64 != metadata.record_count
            || metadata.progress.completed_count != records.len() as u64
        {
            return Err(corrupt(format!(
                "completed_count {} but {} records",
                metadata.progress.completed_count,
                records.len()
            )));
        }
        artifact::check_sequences(&records).map_err(corrupt)?;

        Ok(CheckpointSnapshot {
            progress: metadata.progress,
            records,
            metrics: metadata.metrics,
            state: metadata.state,
        })
    }

    /// Committed metadata without reading records
    pub fn read_metadata(&self, session_id: &str) -> Result<CheckpointMetadata, StorageError> {
        validate_session_id(session_id)?;
        let path = self.metadata_path(session_id);
        let bytes = fs::read(&path)?;
        let metadata: CheckpointMetadata =
            serde_json::from_slice(&bytes).map_err(|e| StorageError::CorruptCheckpoint {
                session_id: session_id.to_string(),
                reason: format!("metadata unparseable: {}", e),
            })?;
        if metadata.format_version != artifact::FORMAT_VERSION {
            return Err(StorageError::CorruptCheckpoint {
                session_id: session_id.to_string(),
                reason: format!("unsupported format version {}", metadata.format_version),
            });
        }
        Ok(metadata)
    }

    /// Remove every file belonging to the session. Missing files are not an error.
    pub fn cleanup(&self, session_id: &str) -> Result<(), StorageError> {
        validate_session_id(session_id)?;
        remove_if_exists(&self.metadata_path(session_id))?;
        for generation in self.record_generations(session_id)? {
            remove_if_exists(&self.records_path(session_id, generation))?;
        }
        for tmp in self.temp_files(session_id)? {
            remove_if_exists(&tmp)?;
        }
        debug!(session_id, "Checkpoint cleaned up");
        Ok(())
    }

    /// Session ids that have a metadata file, sorted
    pub fn list_sessions(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        for name in self.file_names()? {
            if let Some(id) = name.strip_suffix(METADATA_SUFFIX) {
                if validate_session_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn record_generations(&self, session_id: &str) -> Result<Vec<u64>, StorageError> {
        let prefix = format!("{}{}", session_id, RECORDS_INFIX);
        let mut generations = Vec::new();
        for name in self.file_names()? {
            let generation = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(RECORDS_SUFFIX))
                .and_then(|g| g.parse::<u64>().ok());
            if let Some(generation) = generation {
                generations.push(generation);
            }
        }
        generations.sort_unstable();
        Ok(generations)
    }

    fn temp_files(&self, session_id: &str) -> Result<Vec<PathBuf>, StorageError> {
        Ok(self
            .file_names()?
            .into_iter()
            .filter(|name| {
                name.ends_with(".tmp")
                    && (name.starts_with(&format!("{}{}", session_id, RECORDS_INFIX))
                        || name.starts_with(&format!("{}{}", session_id, METADATA_SUFFIX)))
            })
            .map(|name| self.dir.join(name))
            .collect())
    }

    fn file_names(&self) -> Result<Vec<String>, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

/// Write to `{path}.tmp`, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut temp_name = path.as_os_str().to_os_string();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, bytes).map_err(|e| {
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to write {:?}: {}", temp_path, e),
        ))
    })?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        StorageError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to rename temp file to {:?}: {}", path, e),
        ))
    })
}

fn remove_if_exists(path: &Path) -> Result<(), StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
