//! Batch runner
//!
//! Wires one run end to end: pick a fresh or resumed session, start resource
//! sampling, drive the session, then export and clean up on completion. The
//! checkpoint is removed only after export has succeeded. A stopped run
//! exports the records it has so far and keeps its checkpoint for resuming.

use crate::checkpoint::{validate_session_id, CheckpointStore};
use crate::config::QuarryConfig;
use crate::error::ApiError;
use crate::export::{ExportSummary, JsonFileSink, RecordSink};
use crate::governor::{HostSampler, ResourceGovernor};
use crate::ledger::SessionLedger;
use crate::provider::GenerationProvider;
use crate::record::GeneratedRecord;
use crate::retry::RetryExecutor;
use crate::session::{
    generate_session_id, BatchSession, CancellationFlag, SessionReport, SessionServices,
    SessionState,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Resume this session from its checkpoint
    pub resume: Option<String>,
    /// Id for a fresh session; generated when absent
    pub session_id: Option<String>,
    /// Skip export even when enabled in config
    pub skip_export: bool,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: SessionReport,
    pub export: Option<ExportSummary>,
    pub checkpoint_removed: bool,
    pub records: Vec<GeneratedRecord>,
}

pub struct BatchRunner {
    config: QuarryConfig,
    provider: Arc<dyn GenerationProvider>,
    cancel: CancellationFlag,
    sampler: Option<Box<dyn HostSampler>>,
    ledger: Option<SessionLedger>,
    sink: Option<Box<dyn RecordSink + Send>>,
}

impl BatchRunner {
    pub fn new(config: QuarryConfig, provider: Arc<dyn GenerationProvider>) -> Self {
        Self {
            config,
            provider,
            cancel: CancellationFlag::new(),
            sampler: None,
            ledger: None,
            sink: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Enable background resource sampling; without a sampler the governor always admits.
    pub fn with_sampler(mut self, sampler: Box<dyn HostSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_ledger(mut self, ledger: SessionLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Replace the JSON file sink built from `[export]`
    pub fn with_sink(mut self, sink: Box<dyn RecordSink + Send>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    pub fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.config.batch.checkpoint_dir)
    }

    pub async fn run(&mut self, options: RunOptions) -> Result<RunOutcome, ApiError> {
        self.config.ensure_valid()?;
        let store = self.checkpoint_store();
        let mut session = self.prepare_session(&store, &options)?;
        let session_id = session.session_id().to_string();

        if let Some(ledger) = &self.ledger {
            match ledger.mark_interrupted_sessions() {
                Ok(0) => {}
                Ok(count) => info!(count, "Marked sessions from a previous process as interrupted"),
                Err(err) => warn!(error = %err, "failed to mark interrupted sessions"),
            }
        }

        let governor = Arc::new(ResourceGovernor::new(self.config.governor_limits()));
        if let Some(sampler) = self.sampler.take() {
            governor.start(sampler);
        }
        let executor = RetryExecutor::new(self.config.retry_policy());
        let mut requests = self.config.request_source()?;

        let result = session
            .run(SessionServices {
                provider: self.provider.as_ref(),
                requests: &mut requests,
                executor: &executor,
                governor: governor.as_ref(),
                checkpoints: &store,
                cancel: &self.cancel,
                ledger: self.ledger.as_ref(),
            })
            .await;
        governor.stop();
        let report = result?;

        let export_wanted = self.config.export.enabled
            && !options.skip_export
            && !session.records().is_empty();
        let mut export = None;
        let mut checkpoint_removed = false;
        if report.state == SessionState::Completed {
            if export_wanted {
                // An export failure leaves the checkpoint in place for a later resume.
                export = Some(self.export(&session_id, session.records())?);
            }
            match store.cleanup(&session_id) {
                Ok(()) => checkpoint_removed = true,
                Err(err) => warn!(session_id = %session_id, error = %err, "Checkpoint cleanup failed"),
            }
        } else if report.state == SessionState::Stopped {
            if export_wanted {
                // Partial results; a completed resume rewrites the same files.
                export = Some(self.export(&session_id, session.records())?);
            }
            info!(
                session_id = %session_id,
                completed = report.progress.completed_count,
                "Session stopped; resume with --resume {}",
                session_id
            );
        }

        let records = session.records().to_vec();
        Ok(RunOutcome {
            report,
            export,
            checkpoint_removed,
            records,
        })
    }

    fn prepare_session(
        &self,
        store: &CheckpointStore,
        options: &RunOptions,
    ) -> Result<BatchSession, ApiError> {
        let settings = self.config.session_settings();
        match &options.resume {
            Some(session_id) => {
                validate_session_id(session_id)?;
                match store.load(session_id)? {
                    Some(snapshot) => BatchSession::from_checkpoint(snapshot, settings),
                    None => Err(ApiError::SessionFailed(format!(
                        "No usable checkpoint for session {} in {}",
                        session_id,
                        store.dir().display()
                    ))),
                }
            }
            None => {
                let session_id = options.session_id.clone().unwrap_or_else(generate_session_id);
                validate_session_id(&session_id)?;
                if store.metadata_path(&session_id).exists() {
                    return Err(ApiError::SessionFailed(format!(
                        "Session {} already has a checkpoint; resume it instead",
                        session_id
                    )));
                }
                Ok(BatchSession::new(session_id, settings))
            }
        }
    }

    fn export(&mut self, session_id: &str, records: &[GeneratedRecord]) -> Result<ExportSummary, ApiError> {
        let summary = match self.sink.as_mut() {
            Some(sink) => sink.write(session_id, records)?,
            None => JsonFileSink::new(
                &self.config.export.output_dir,
                self.config.export.max_records_per_file,
            )
            .write(session_id, records)?,
        };
        info!(
            session_id,
            files = summary.files.len(),
            records = summary.records,
            "Export complete"
        );
        Ok(summary)
    }
}
