//! Batch session
//!
//! State machine driving one generation run: `Idle → Running → {Completed,
//! Stopped, Failed}`. The session exclusively owns its progress counters,
//! accepted records and metrics; collaborators are borrowed for the duration
//! of [`BatchSession::run`].
//!
//! Per-unit failures are absorbed (counted, logged, checkpointed). Only a
//! failing startup probe or a fatal provider error ends the run with an error.

pub mod cancel;
pub mod report;
pub mod state;
pub mod unit;

pub use cancel::CancellationFlag;
pub use report::{format_duration, SessionReport};
pub use state::{SessionProgress, SessionState};
pub use unit::GenerationUnit;

use crate::checkpoint::{CheckpointSnapshot, CheckpointStore};
use crate::error::ApiError;
use crate::governor::ResourceGovernor;
use crate::ledger::{event, LedgerStatus, SessionLedger};
use crate::metrics::{Pricing, SessionMetrics};
use crate::provider::GenerationProvider;
use crate::record::GeneratedRecord;
use crate::recovery::ResponseRecovery;
use crate::request::RequestSource;
use crate::retry::{AttemptResult, RetryExecutor};
use chrono::Local;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Default session id: `batch_YYYYmmdd_HHMMSS` in local time.
pub fn generate_session_id() -> String {
    Local::now().format("batch_%Y%m%d_%H%M%S").to_string()
}

/// Save when at least `interval` records were completed since the last save.
pub fn checkpoint_due(completed: u64, last_checkpointed: u64, interval: u64) -> bool {
    completed.saturating_sub(last_checkpointed) >= interval.max(1)
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub target_count: u64,
    pub checkpoint_interval: u64,
    pub cooling_period: Duration,
    pub required_fields: Vec<String>,
    pub pricing: Pricing,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            target_count: 1000,
            checkpoint_interval: 100,
            cooling_period: Duration::from_secs(30),
            required_fields: vec![
                "short_description".to_string(),
                "description".to_string(),
                "work_notes".to_string(),
                "close_notes".to_string(),
            ],
            pricing: Pricing::default(),
        }
    }
}

/// Collaborators borrowed by a running session
pub struct SessionServices<'a> {
    pub provider: &'a dyn GenerationProvider,
    pub requests: &'a mut dyn RequestSource,
    pub executor: &'a RetryExecutor,
    pub governor: &'a ResourceGovernor,
    pub checkpoints: &'a CheckpointStore,
    pub cancel: &'a CancellationFlag,
    pub ledger: Option<&'a SessionLedger>,
}

pub struct BatchSession {
    state: SessionState,
    progress: SessionProgress,
    records: Vec<GeneratedRecord>,
    metrics: SessionMetrics,
    settings: SessionSettings,
    recovery: ResponseRecovery,
    last_checkpointed: u64,
    last_checkpoint_ok: Option<u64>,
    resumed_from: Option<u64>,
}

impl BatchSession {
    pub fn new(session_id: impl Into<String>, settings: SessionSettings) -> Self {
        let progress = SessionProgress::new(session_id, settings.target_count);
        Self {
            state: SessionState::Idle,
            progress,
            records: Vec::new(),
            metrics: SessionMetrics::new(settings.pricing),
            recovery: ResponseRecovery::new(settings.required_fields.clone()),
            settings,
            last_checkpointed: 0,
            last_checkpoint_ok: None,
            resumed_from: None,
        }
    }

    /// Rebuild an idle session from a loaded checkpoint.
    ///
    /// The checkpoint's target wins over `settings.target_count`.
    pub fn from_checkpoint(
        snapshot: CheckpointSnapshot,
        settings: SessionSettings,
    ) -> Result<Self, ApiError> {
        let CheckpointSnapshot {
            progress,
            records,
            metrics,
            ..
        } = snapshot;
        if progress.completed_count != records.len() as u64 {
            return Err(ApiError::SessionFailed(format!(
                "checkpoint for {} has completed_count {} but {} records",
                progress.session_id,
                progress.completed_count,
                records.len()
            )));
        }
        if progress.target_count != settings.target_count {
            warn!(
                session_id = %progress.session_id,
                checkpoint_target = progress.target_count,
                configured_target = settings.target_count,
                "Configured target differs from checkpoint; keeping checkpoint target"
            );
        }
        let completed = progress.completed_count;
        info!(
            session_id = %progress.session_id,
            completed,
            target = progress.target_count,
            failed = progress.failed_count,
            "Restored session from checkpoint"
        );
        Ok(Self {
            state: SessionState::Idle,
            progress,
            records,
            metrics: SessionMetrics::from_snapshot(settings.pricing, metrics),
            recovery: ResponseRecovery::new(settings.required_fields.clone()),
            settings,
            last_checkpointed: completed,
            last_checkpoint_ok: Some(completed),
            resumed_from: Some(completed),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.progress.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn progress(&self) -> &SessionProgress {
        &self.progress
    }

    pub fn records(&self) -> &[GeneratedRecord] {
        &self.records
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    pub fn resumed_from(&self) -> Option<u64> {
        self.resumed_from
    }

    /// Frozen copy for the checkpoint store
    pub fn snapshot(&self) -> CheckpointSnapshot {
        CheckpointSnapshot {
            progress: self.progress.clone(),
            records: self.records.clone(),
            metrics: self.metrics.snapshot(),
            state: self.state,
        }
    }

    pub async fn run(&mut self, services: SessionServices<'_>) -> Result<SessionReport, ApiError> {
        if self.state != SessionState::Idle {
            return Err(ApiError::SessionFailed(format!(
                "session {} is {}, only idle sessions can run",
                self.session_id(),
                self.state
            )));
        }
        let started = Instant::now();
        self.state = SessionState::Running;
        info!(
            session_id = %self.session_id(),
            target = self.progress.target_count,
            completed = self.progress.completed_count,
            checkpoint_interval = self.settings.checkpoint_interval,
            provider = services.provider.provider_name(),
            model = services.provider.model_name(),
            "Batch session started"
        );
        if let Some(ledger) = services.ledger {
            if let Err(err) = ledger.start_session(
                self.session_id(),
                self.progress.target_count,
                self.progress.completed_count,
            ) {
                warn!(error = %err, "failed to register session in ledger");
            }
        }

        if let Err(err) = services.provider.probe().await {
            error!(session_id = %self.session_id(), error = %err, "Provider probe failed");
            self.state = SessionState::Failed;
            self.finish_ledger(&services, Some(err.to_string()));
            return Err(err);
        }

        loop {
            if self.progress.is_target_reached() {
                self.state = SessionState::Completed;
                break;
            }
            if services.cancel.is_cancelled() {
                info!(session_id = %self.session_id(), "Cancellation requested, stopping");
                self.state = SessionState::Stopped;
                break;
            }
            if !self.wait_for_admission(&services).await {
                info!(session_id = %self.session_id(), "Cancelled while cooling, stopping");
                self.state = SessionState::Stopped;
                break;
            }

            let sequence = self.progress.completed_count + 1;
            let request = match services
                .requests
                .next_request(sequence, self.progress.failed_count)
            {
                Ok(request) => request,
                Err(err) => return Err(self.fail(&services, err)),
            };

            self.metrics.record_unit_started();
            let (result, usage) = {
                let mut unit = GenerationUnit::new(services.provider, &request, &self.recovery);
                let result = services.executor.execute(&mut unit).await;
                (result, unit.usage().to_vec())
            };
            for call in &usage {
                self.metrics.record_provider_call(call);
            }

            match result {
                AttemptResult {
                    succeeded: true,
                    record: Some(fields),
                    attempts_used,
                    elapsed_ms,
                    ..
                } => {
                    self.records
                        .push(GeneratedRecord::new(sequence, &request, fields, attempts_used));
                    self.progress.completed_count += 1;
                    self.progress.touch();
                    self.metrics.record_success(request.context(), elapsed_ms);
                    self.log_progress();
                    if checkpoint_due(
                        self.progress.completed_count,
                        self.last_checkpointed,
                        self.settings.checkpoint_interval,
                    ) {
                        self.save_checkpoint(&services);
                    }
                }
                result if result.is_fatal() => {
                    let err = result.error.unwrap_or_else(|| {
                        ApiError::SessionFailed("fatal unit failure without error".to_string())
                    });
                    return Err(self.fail(&services, err));
                }
                AttemptResult {
                    error,
                    attempts_used,
                    elapsed_ms,
                    ..
                } => {
                    self.progress.failed_count += 1;
                    self.progress.touch();
                    self.metrics.record_failure(elapsed_ms);
                    let error = error.map(|e| e.to_string());
                    warn!(
                        session_id = %self.session_id(),
                        sequence,
                        attempts = attempts_used,
                        error = ?error,
                        failed = self.progress.failed_count,
                        "Unit of work failed, continuing"
                    );
                    if let Some(ledger) = services.ledger {
                        ledger.emit_event_best_effort(
                            self.session_id(),
                            event::UNIT_FAILED,
                            json!({ "sequence": sequence, "attempts": attempts_used, "error": error }),
                        );
                    }
                }
            }
        }

        self.save_checkpoint(&services);
        self.finish_ledger(&services, None);
        let report = self.report(services.governor, started);
        info!(
            session_id = %report.session_id,
            state = %report.state,
            completed = report.progress.completed_count,
            failed = report.progress.failed_count,
            success_rate = report.success_rate(),
            runtime = %format_duration(report.runtime_secs),
            "Batch session ended"
        );
        Ok(report)
    }

    /// Block while the governor denies admission. Returns false if cancelled meanwhile.
    async fn wait_for_admission(&self, services: &SessionServices<'_>) -> bool {
        while !services.governor.admit() {
            let latest = services.governor.latest();
            warn!(
                session_id = %self.session_id(),
                cpu_percent = latest.map(|s| s.cpu_percent),
                memory_mb = latest.map(|s| s.memory_mb),
                cooling_secs = self.settings.cooling_period.as_secs_f64(),
                "Resource usage high, cooling down"
            );
            if let Some(ledger) = services.ledger {
                ledger.emit_event_best_effort(
                    self.session_id(),
                    event::RESOURCE_COOLING,
                    json!({
                        "cpu_percent": latest.map(|s| s.cpu_percent),
                        "memory_mb": latest.map(|s| s.memory_mb),
                    }),
                );
            }
            tokio::time::sleep(self.settings.cooling_period).await;
            if services.cancel.is_cancelled() {
                return false;
            }
        }
        true
    }

    /// Move to Failed after a fatal error, checkpointing first so the run can resume.
    fn fail(&mut self, services: &SessionServices<'_>, err: ApiError) -> ApiError {
        error!(
            session_id = %self.session_id(),
            completed = self.progress.completed_count,
            error = %err,
            "Fatal error, stopping session"
        );
        self.state = SessionState::Failed;
        self.save_checkpoint(services);
        self.finish_ledger(services, Some(err.to_string()));
        err
    }

    fn save_checkpoint(&mut self, services: &SessionServices<'_>) -> bool {
        let snapshot = self.snapshot();
        let completed = self.progress.completed_count;
        match services.checkpoints.save(self.session_id(), &snapshot) {
            Ok(()) => {
                self.last_checkpointed = completed;
                self.last_checkpoint_ok = Some(completed);
                info!(
                    session_id = %self.session_id(),
                    completed,
                    state = %self.state,
                    "Checkpoint saved"
                );
                if let Some(ledger) = services.ledger {
                    ledger.emit_event_best_effort(
                        self.session_id(),
                        event::CHECKPOINT_SAVED,
                        json!({ "completed_count": completed }),
                    );
                }
                true
            }
            Err(err) => {
                warn!(
                    session_id = %self.session_id(),
                    completed,
                    error = %err,
                    "Checkpoint save failed, will retry"
                );
                if let Some(ledger) = services.ledger {
                    ledger.emit_event_best_effort(
                        self.session_id(),
                        event::CHECKPOINT_FAILED,
                        json!({ "completed_count": completed, "error": err.to_string() }),
                    );
                }
                false
            }
        }
    }

    fn finish_ledger(&self, services: &SessionServices<'_>, error: Option<String>) {
        let Some(ledger) = services.ledger else {
            return;
        };
        let status = match self.state {
            SessionState::Completed => LedgerStatus::Completed,
            SessionState::Stopped => LedgerStatus::Stopped,
            _ => LedgerStatus::Failed,
        };
        if let Err(err) = ledger.finish_session(
            self.session_id(),
            status,
            self.progress.completed_count,
            self.progress.failed_count,
            error,
        ) {
            warn!(error = %err, "failed to record session end in ledger");
        }
    }

    fn log_progress(&self) {
        let timing = &self.metrics.current().generation_timing;
        let eta_secs = timing.avg_ms() / 1000.0 * self.progress.remaining() as f64;
        info!(
            session_id = %self.session_id(),
            completed = self.progress.completed_count,
            target = self.progress.target_count,
            percent = %format!("{:.1}", self.progress.percent_complete()),
            eta = %format_duration(eta_secs),
            "Progress"
        );
    }

    fn report(&self, governor: &ResourceGovernor, started: Instant) -> SessionReport {
        SessionReport {
            session_id: self.session_id().to_string(),
            state: self.state,
            progress: self.progress.clone(),
            metrics: self.metrics.snapshot(),
            resources: governor.summary(),
            resumed_from: self.resumed_from,
            last_checkpoint: self.last_checkpoint_ok,
            runtime_secs: started.elapsed().as_secs_f64(),
        }
    }
}
