//! Resource governor
//!
//! Keeps a rolling window of host CPU/memory samples taken by a background
//! task and answers whether a new unit of work may start. The governor never
//! sleeps; callers apply the cooling period when admission is denied.

pub mod sampler;

pub use sampler::{HostSampler, ResourceSample, SysinfoSampler};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Samples older than this (relative to the newest) are evicted.
pub const MAX_SAMPLE_AGE: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GovernorLimits {
    pub max_cpu_percent: f64,
    pub max_memory_mb: f64,
    pub max_samples: usize,
    pub sample_interval: Duration,
}

impl Default for GovernorLimits {
    fn default() -> Self {
        Self {
            max_cpu_percent: 80.0,
            max_memory_mb: 2048.0,
            max_samples: 120,
            sample_interval: Duration::from_secs(30),
        }
    }
}

/// Immutable view of the sample window; replaced wholesale on every sample.
#[derive(Debug, Clone, Default)]
pub struct GovernorWindow {
    samples: VecDeque<ResourceSample>,
}

impl GovernorWindow {
    fn with_sample(&self, sample: ResourceSample, max_samples: usize) -> Self {
        let mut samples = self.samples.clone();
        samples.push_back(sample);
        while samples.len() > max_samples.max(1) {
            samples.pop_front();
        }
        while let Some(oldest) = samples.front() {
            if sample.at.saturating_duration_since(oldest.at) > MAX_SAMPLE_AGE {
                samples.pop_front();
            } else {
                break;
            }
        }
        Self { samples }
    }

    pub fn latest(&self) -> Option<&ResourceSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSample> {
        self.samples.iter()
    }
}

/// Aggregate over the current window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub avg_cpu_percent: f64,
    pub peak_cpu_percent: f64,
    pub avg_memory_mb: f64,
    pub peak_memory_mb: f64,
    pub sample_count: usize,
    pub runtime_secs: f64,
}

pub struct ResourceGovernor {
    limits: GovernorLimits,
    window: RwLock<Arc<GovernorWindow>>,
    started: Instant,
    sampler_task: Mutex<Option<JoinHandle<()>>>,
}

impl ResourceGovernor {
    pub fn new(limits: GovernorLimits) -> Self {
        Self {
            limits,
            window: RwLock::new(Arc::new(GovernorWindow::default())),
            started: Instant::now(),
            sampler_task: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> &GovernorLimits {
        &self.limits
    }

    /// Current window snapshot
    pub fn window(&self) -> Arc<GovernorWindow> {
        self.window.read().clone()
    }

    pub fn latest(&self) -> Option<ResourceSample> {
        self.window().latest().copied()
    }

    /// Describe which ceiling a sample exceeds, if any. Equal to the ceiling is within limits.
    pub fn exceeded_ceiling(&self, sample: &ResourceSample) -> Option<String> {
        if sample.cpu_percent > self.limits.max_cpu_percent {
            Some(format!(
                "cpu {:.1}% above {:.1}%",
                sample.cpu_percent, self.limits.max_cpu_percent
            ))
        } else if sample.memory_mb > self.limits.max_memory_mb {
            Some(format!(
                "memory {:.0} MB above {:.0} MB",
                sample.memory_mb, self.limits.max_memory_mb
            ))
        } else {
            None
        }
    }

    /// Whether a new unit of work may start, judged on the latest sample.
    pub fn admit(&self) -> bool {
        match self.latest() {
            Some(sample) => self.exceeded_ceiling(&sample).is_none(),
            None => true,
        }
    }

    pub fn record_sample(&self, sample: ResourceSample) {
        if let Some(reason) = self.exceeded_ceiling(&sample) {
            warn!(
                cpu_percent = sample.cpu_percent,
                memory_mb = sample.memory_mb,
                reason = %reason,
                "Resource usage above configured ceiling"
            );
        }
        let mut window = self.window.write();
        let next = window.with_sample(sample, self.limits.max_samples);
        *window = Arc::new(next);
    }

    pub fn summary(&self) -> ResourceSummary {
        let window = self.window();
        let runtime_secs = self.started.elapsed().as_secs_f64();
        if window.is_empty() {
            return ResourceSummary {
                runtime_secs,
                ..ResourceSummary::default()
            };
        }
        let count = window.len();
        let (mut cpu_sum, mut mem_sum, mut cpu_peak, mut mem_peak) = (0.0, 0.0, 0.0_f64, 0.0_f64);
        for sample in window.iter() {
            cpu_sum += sample.cpu_percent;
            mem_sum += sample.memory_mb;
            cpu_peak = cpu_peak.max(sample.cpu_percent);
            mem_peak = mem_peak.max(sample.memory_mb);
        }
        ResourceSummary {
            avg_cpu_percent: cpu_sum / count as f64,
            peak_cpu_percent: cpu_peak,
            avg_memory_mb: mem_sum / count as f64,
            peak_memory_mb: mem_peak,
            sample_count: count,
            runtime_secs,
        }
    }

    /// Start background sampling; a running sampler is left alone.
    pub fn start(self: &Arc<Self>, mut sampler: Box<dyn HostSampler>) {
        let mut task = self.sampler_task.lock();
        if task.is_some() {
            return;
        }
        let governor = Arc::clone(self);
        let period = self.limits.sample_interval.max(Duration::from_millis(10));
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let sample = sampler.sample();
                debug!(
                    cpu_percent = sample.cpu_percent,
                    memory_mb = sample.memory_mb,
                    "Resource sample"
                );
                governor.record_sample(sample);
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "Started resource sampler");
    }

    pub fn stop(&self) {
        if let Some(handle) = self.sampler_task.lock().take() {
            handle.abort();
            debug!("Stopped resource sampler");
        }
    }

    pub fn is_sampling(&self) -> bool {
        self.sampler_task.lock().is_some()
    }
}

impl Drop for ResourceGovernor {
    fn drop(&mut self) {
        if let Some(handle) = self.sampler_task.get_mut().take() {
            handle.abort();
        }
    }
}
