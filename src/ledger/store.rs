//! sled trees backing the session ledger.

use std::io;

use serde::{Deserialize, Serialize};
use sled::{Db, Tree};

use crate::error::StorageError;
use crate::ledger::event::LedgerEvent;

const TREE_SESSIONS: &str = "ledger_sessions";
const TREE_EVENTS: &str = "ledger_events";
const TREE_META: &str = "ledger_session_meta";
const EVENT_KEY_PAD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Active,
    Completed,
    Stopped,
    Failed,
    Interrupted,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LedgerStatus::Active => "active",
            LedgerStatus::Completed => "completed",
            LedgerStatus::Stopped => "stopped",
            LedgerStatus::Failed => "failed",
            LedgerStatus::Interrupted => "interrupted",
        }
    }

    /// Sessions in these states may still have a checkpoint worth resuming.
    pub fn is_resumable(self) -> bool {
        matches!(
            self,
            LedgerStatus::Stopped | LedgerStatus::Failed | LedgerStatus::Interrupted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSessionRecord {
    pub session_id: String,
    pub started_at_ms: u64,
    pub ended_at_ms: Option<u64>,
    pub status: LedgerStatus,
    pub target_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
    /// Number of times the session was resumed from a checkpoint
    pub resume_count: u32,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerMeta {
    pub next_seq: u64,
    pub updated_at_ms: u64,
}

#[derive(Clone)]
pub struct LedgerStore {
    db: Db,
    sessions: Tree,
    events: Tree,
    meta: Tree,
}

impl LedgerStore {
    pub fn new(db: Db) -> Result<Self, StorageError> {
        let sessions = db.open_tree(TREE_SESSIONS).map_err(to_storage_io)?;
        let events = db.open_tree(TREE_EVENTS).map_err(to_storage_io)?;
        let meta = db.open_tree(TREE_META).map_err(to_storage_io)?;
        Ok(Self {
            db,
            sessions,
            events,
            meta,
        })
    }

    pub fn put_session(&self, record: &LedgerSessionRecord) -> Result<(), StorageError> {
        let value = serde_json::to_vec(record).map_err(to_storage_data)?;
        self.sessions
            .insert(record.session_id.as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<LedgerSessionRecord>, StorageError> {
        let Some(raw) = self
            .sessions
            .get(session_id.as_bytes())
            .map_err(to_storage_io)?
        else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(to_storage_data)?;
        Ok(Some(parsed))
    }

    /// Newest first
    pub fn list_sessions(&self) -> Result<Vec<LedgerSessionRecord>, StorageError> {
        let mut out = Vec::new();
        for result in self.sessions.iter() {
            let (_, value) = result.map_err(to_storage_io)?;
            let rec: LedgerSessionRecord = serde_json::from_slice(&value).map_err(to_storage_data)?;
            out.push(rec);
        }
        out.sort_by_key(|s| std::cmp::Reverse(s.started_at_ms));
        Ok(out)
    }

    pub fn put_meta(&self, session_id: &str, meta: &LedgerMeta) -> Result<(), StorageError> {
        let value = serde_json::to_vec(meta).map_err(to_storage_data)?;
        self.meta
            .insert(session_id.as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(())
    }

    pub fn get_meta(&self, session_id: &str) -> Result<Option<LedgerMeta>, StorageError> {
        let Some(raw) = self.meta.get(session_id.as_bytes()).map_err(to_storage_io)? else {
            return Ok(None);
        };
        let parsed = serde_json::from_slice(&raw).map_err(to_storage_data)?;
        Ok(Some(parsed))
    }

    pub fn append_event(&self, event: &LedgerEvent) -> Result<(), StorageError> {
        let key = encode_event_key(&event.session, event.seq);
        let value = serde_json::to_vec(event).map_err(to_storage_data)?;
        self.events
            .insert(key.as_bytes(), value)
            .map_err(to_storage_io)?;
        Ok(())
    }

    pub fn read_events(&self, session_id: &str) -> Result<Vec<LedgerEvent>, StorageError> {
        // Terminate the prefix so that "batch_1" does not match "batch_10".
        let prefix = format!("{session_id}:");
        let mut out = Vec::new();
        for result in self.events.scan_prefix(prefix.as_bytes()) {
            let (_, value) = result.map_err(to_storage_io)?;
            out.push(serde_json::from_slice::<LedgerEvent>(&value).map_err(to_storage_data)?);
        }
        out.sort_by_key(|e| e.seq);
        Ok(out)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), StorageError> {
        self.sessions
            .remove(session_id.as_bytes())
            .map_err(to_storage_io)?;
        self.meta
            .remove(session_id.as_bytes())
            .map_err(to_storage_io)?;
        let prefix = format!("{session_id}:");
        let keys: Vec<Vec<u8>> = self
            .events
            .scan_prefix(prefix.as_bytes())
            .filter_map(|r| r.ok().map(|(k, _)| k.to_vec()))
            .collect();
        for key in keys {
            self.events.remove(key).map_err(to_storage_io)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(to_storage_io)?;
        Ok(())
    }
}

pub(crate) fn encode_event_key(session_id: &str, seq: u64) -> String {
    format!("{session_id}:{seq:0EVENT_KEY_PAD$}")
}

fn to_storage_io(err: sled::Error) -> StorageError {
    StorageError::IoError(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

fn to_storage_data(err: serde_json::Error) -> StorageError {
    StorageError::Serialization(err.to_string())
}
