//! Ledger event schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SESSION_STARTED: &str = "session_started";
pub const SESSION_ENDED: &str = "session_ended";
pub const CHECKPOINT_SAVED: &str = "checkpoint_saved";
pub const CHECKPOINT_FAILED: &str = "checkpoint_failed";
pub const UNIT_FAILED: &str = "unit_failed";
pub const RESOURCE_COOLING: &str = "resource_cooling";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Unix epoch milliseconds
    pub ts: u64,
    pub session: String,
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}
