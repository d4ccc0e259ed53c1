//! Session metrics
//!
//! Append-only aggregates for one batch session: unit counts, distribution of
//! accepted records by category/priority/department, token totals, estimated
//! cost and timing, kept apart for generated and for exhausted units. Owned by the session; reporting collaborators only
//! ever see a [`SessionMetricsSnapshot`].

use crate::provider::TokenUsage;
use crate::request::{RequestContext, ATTR_CATEGORY, ATTR_DEPARTMENT, ATTR_PRIORITY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Token prices used for the cost estimate (USD per 1000 tokens)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub prompt_per_1k: f64,
    pub completion_per_1k: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            prompt_per_1k: 0.0,
            completion_per_1k: 0.0,
        }
    }
}

impl Pricing {
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.prompt_per_1k
            + (usage.completion_tokens as f64 / 1000.0) * self.completion_per_1k
    }
}

/// Per-unit timing aggregates in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingAggregate {
    pub total_ms: u64,
    pub min_ms: Option<u64>,
    pub max_ms: Option<u64>,
    pub samples: u64,
}

impl TimingAggregate {
    fn observe(&mut self, elapsed_ms: u64) {
        self.total_ms = self.total_ms.saturating_add(elapsed_ms);
        self.min_ms = Some(self.min_ms.map_or(elapsed_ms, |m| m.min(elapsed_ms)));
        self.max_ms = Some(self.max_ms.map_or(elapsed_ms, |m| m.max(elapsed_ms)));
        self.samples += 1;
    }

    pub fn avg_ms(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.samples as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetricsSnapshot {
    /// Units of work started (each resolves to generated, failed, or a fatal halt)
    pub attempted_units: u64,
    pub total_generated: u64,
    pub total_failed: u64,
    /// Provider calls across all attempts
    pub provider_calls: u64,
    pub category_distribution: BTreeMap<String, u64>,
    pub priority_distribution: BTreeMap<String, u64>,
    pub department_distribution: BTreeMap<String, u64>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_estimate: f64,
    /// Units that produced a record; drives the average generation time and ETA
    pub generation_timing: TimingAggregate,
    /// Units that exhausted their retries
    #[serde(default)]
    pub failure_timing: TimingAggregate,
}

impl SessionMetricsSnapshot {
    /// Generated units as a percentage of resolved units
    pub fn success_rate(&self) -> f64 {
        let resolved = self.total_generated + self.total_failed;
        if resolved == 0 {
            0.0
        } else {
            self.total_generated as f64 / resolved as f64 * 100.0
        }
    }
}

/// Mutable aggregate owned by a batch session
#[derive(Debug, Clone, Default)]
pub struct SessionMetrics {
    pricing: Pricing,
    data: SessionMetricsSnapshot,
}

impl SessionMetrics {
    pub fn new(pricing: Pricing) -> Self {
        Self {
            pricing,
            data: SessionMetricsSnapshot::default(),
        }
    }

    /// Continue aggregating on top of a checkpointed snapshot
    pub fn from_snapshot(pricing: Pricing, snapshot: SessionMetricsSnapshot) -> Self {
        Self {
            pricing,
            data: snapshot,
        }
    }

    pub fn record_unit_started(&mut self) {
        self.data.attempted_units += 1;
    }

    /// Token usage of one provider call, successful or not
    pub fn record_provider_call(&mut self, usage: &TokenUsage) {
        self.data.provider_calls += 1;
        self.data.prompt_tokens += u64::from(usage.prompt_tokens);
        self.data.completion_tokens += u64::from(usage.completion_tokens);
        self.data.total_tokens += u64::from(usage.total_tokens);
        self.data.cost_estimate += self.pricing.cost(usage);
    }

    pub fn record_success(&mut self, context: &RequestContext, elapsed_ms: u64) {
        self.data.total_generated += 1;
        self.data.generation_timing.observe(elapsed_ms);
        bump(&mut self.data.category_distribution, context.get(ATTR_CATEGORY));
        bump(&mut self.data.priority_distribution, context.get(ATTR_PRIORITY));
        bump(&mut self.data.department_distribution, context.get(ATTR_DEPARTMENT));
    }

    pub fn record_failure(&mut self, elapsed_ms: u64) {
        self.data.total_failed += 1;
        self.data.failure_timing.observe(elapsed_ms);
    }

    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        self.data.clone()
    }

    pub fn current(&self) -> &SessionMetricsSnapshot {
        &self.data
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: Option<&str>) {
    if let Some(key) = key {
        *map.entry(key.to_string()).or_insert(0) += 1;
    }
}
