//! Session lifecycle state and progress counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Stopped | SessionState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Stopped => "stopped",
            SessionState::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters mutated only by the owning session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub session_id: String,
    pub completed_count: u64,
    pub target_count: u64,
    pub failed_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl SessionProgress {
    pub fn new(session_id: impl Into<String>, target_count: u64) -> Self {
        Self {
            session_id: session_id.into(),
            completed_count: 0,
            target_count,
            failed_count: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn is_target_reached(&self) -> bool {
        self.completed_count >= self.target_count
    }

    pub fn remaining(&self) -> u64 {
        self.target_count.saturating_sub(self.completed_count)
    }

    pub fn percent_complete(&self) -> f64 {
        if self.target_count == 0 {
            100.0
        } else {
            (self.completed_count as f64 / self.target_count as f64 * 100.0).min(100.0)
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}
