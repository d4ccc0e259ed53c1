//! Read-only outcome of a session run.

use crate::governor::ResourceSummary;
use crate::metrics::SessionMetricsSnapshot;
use crate::session::{SessionProgress, SessionState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub state: SessionState,
    pub progress: SessionProgress,
    pub metrics: SessionMetricsSnapshot,
    pub resources: ResourceSummary,
    /// Completed count the run resumed from, when started from a checkpoint
    pub resumed_from: Option<u64>,
    /// Completed count covered by the latest successful checkpoint
    pub last_checkpoint: Option<u64>,
    pub runtime_secs: f64,
}

impl SessionReport {
    pub fn success_rate(&self) -> f64 {
        self.metrics.success_rate()
    }

    pub fn average_generation_secs(&self) -> f64 {
        self.metrics.generation_timing.avg_ms() / 1000.0
    }
}

/// `1h 02m 03s`, `4m 05s`, `6s`
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0).round() as u64;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
