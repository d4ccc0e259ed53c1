//! Host resource sampling.

use std::time::Instant;
use sysinfo::System;

/// One CPU/memory reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSample {
    /// Global CPU utilisation, 0-100
    pub cpu_percent: f64,
    /// Host memory in use, MiB
    pub memory_mb: f64,
    pub at: Instant,
}

impl ResourceSample {
    pub fn new(cpu_percent: f64, memory_mb: f64) -> Self {
        Self {
            cpu_percent,
            memory_mb,
            at: Instant::now(),
        }
    }

    pub fn at(cpu_percent: f64, memory_mb: f64, at: Instant) -> Self {
        Self {
            cpu_percent,
            memory_mb,
            at,
        }
    }
}

/// Source of resource readings for the governor's background task
pub trait HostSampler: Send + 'static {
    fn sample(&mut self) -> ResourceSample;
}

/// Production sampler backed by `sysinfo`
pub struct SysinfoSampler {
    system: System,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first one.
        system.refresh_cpu();
        system.refresh_memory();
        Self { system }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSampler for SysinfoSampler {
    fn sample(&mut self) -> ResourceSample {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        ResourceSample::new(
            f64::from(self.system.global_cpu_info().cpu_usage()),
            self.system.used_memory() as f64 / (1024.0 * 1024.0),
        )
    }
}
