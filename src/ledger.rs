//! Session ledger
//!
//! A sled database indexing every batch session and its lifecycle events.
//! The ledger is observability only: checkpoints remain the source of truth
//! for resume, and event writes from the generation loop are best-effort.

pub mod event;
pub mod store;

pub use event::LedgerEvent;
pub use store::{LedgerMeta, LedgerSessionRecord, LedgerStatus, LedgerStore};

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::{ApiError, StorageError};

#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<LedgerStore>,
    // Serializes sequence allocation per ledger handle.
    seq_lock: Arc<Mutex<()>>,
}

impl SessionLedger {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref()).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open ledger at {:?}: {}", path.as_ref(), e),
            ))
        })?;
        Self::new(db)
    }

    pub fn new(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            store: Arc::new(LedgerStore::new(db)?),
            seq_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn store(&self) -> &LedgerStore {
        &self.store
    }

    /// Register a session as active. A known session id counts as a resume.
    pub fn start_session(
        &self,
        session_id: &str,
        target_count: u64,
        completed_count: u64,
    ) -> Result<(), ApiError> {
        let now = now_millis();
        let record = match self.store.get_session(session_id)? {
            Some(mut existing) => {
                existing.status = LedgerStatus::Active;
                existing.ended_at_ms = None;
                existing.error = None;
                existing.target_count = target_count;
                existing.completed_count = completed_count;
                existing.resume_count += 1;
                existing
            }
            None => LedgerSessionRecord {
                session_id: session_id.to_string(),
                started_at_ms: now,
                ended_at_ms: None,
                status: LedgerStatus::Active,
                target_count,
                completed_count,
                failed_count: 0,
                resume_count: 0,
                error: None,
            },
        };
        self.store.put_session(&record)?;
        if self.store.get_meta(session_id)?.is_none() {
            self.store.put_meta(
                session_id,
                &LedgerMeta {
                    next_seq: 1,
                    updated_at_ms: now,
                },
            )?;
        }
        self.emit_event(
            session_id,
            event::SESSION_STARTED,
            json!({
                "target_count": target_count,
                "completed_count": completed_count,
                "resumed": record.resume_count > 0,
            }),
        )?;
        Ok(())
    }

    pub fn finish_session(
        &self,
        session_id: &str,
        status: LedgerStatus,
        completed_count: u64,
        failed_count: u64,
        error: Option<String>,
    ) -> Result<(), ApiError> {
        self.emit_event(
            session_id,
            event::SESSION_ENDED,
            json!({
                "status": status.as_str(),
                "completed_count": completed_count,
                "failed_count": failed_count,
                "error": error,
            }),
        )?;
        let mut record = self.store.get_session(session_id)?.ok_or_else(|| {
            ApiError::StorageError(StorageError::InvalidSessionId(format!(
                "session '{}' not registered in ledger",
                session_id
            )))
        })?;
        record.status = status;
        record.ended_at_ms = Some(now_millis());
        record.completed_count = completed_count;
        record.failed_count = failed_count;
        record.error = error;
        self.store.put_session(&record)?;
        self.store.flush()?;
        Ok(())
    }

    pub fn emit_event(&self, session_id: &str, event_type: &str, data: Value) -> Result<(), ApiError> {
        let _guard = self.seq_lock.lock();
        let now = now_millis();
        let mut meta = self.store.get_meta(session_id)?.unwrap_or(LedgerMeta {
            next_seq: 1,
            updated_at_ms: now,
        });
        let event = LedgerEvent {
            ts: now,
            session: session_id.to_string(),
            seq: meta.next_seq,
            event_type: event_type.to_string(),
            data,
        };
        self.store.append_event(&event)?;
        meta.next_seq += 1;
        meta.updated_at_ms = now;
        self.store.put_meta(session_id, &meta)?;
        self.store.flush()?;
        Ok(())
    }

    pub fn emit_event_best_effort(&self, session_id: &str, event_type: &str, data: Value) {
        if let Err(err) = self.emit_event(session_id, event_type, data) {
            warn!(
                session_id = %session_id,
                event_type = %event_type,
                error = %err,
                "failed to record ledger event"
            );
        }
    }

    /// Sessions still `active` belong to a process that died; mark them interrupted.
    pub fn mark_interrupted_sessions(&self) -> Result<usize, ApiError> {
        let mut changed = 0usize;
        for mut session in self.store.list_sessions()? {
            if session.status == LedgerStatus::Active {
                session.status = LedgerStatus::Interrupted;
                self.store.put_session(&session)?;
                changed += 1;
            }
        }
        self.store.flush()?;
        Ok(changed)
    }

    pub fn sessions(&self) -> Result<Vec<LedgerSessionRecord>, ApiError> {
        Ok(self.store.list_sessions()?)
    }

    pub fn session(&self, session_id: &str) -> Result<Option<LedgerSessionRecord>, ApiError> {
        Ok(self.store.get_session(session_id)?)
    }

    pub fn events(&self, session_id: &str) -> Result<Vec<LedgerEvent>, ApiError> {
        Ok(self.store.read_events(session_id)?)
    }

    /// Drop a session and its events (after a completed run's checkpoint is cleaned up)
    pub fn forget(&self, session_id: &str) -> Result<(), ApiError> {
        self.store.delete_session(session_id)?;
        self.store.flush()?;
        Ok(())
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
