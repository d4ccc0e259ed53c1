//! CLI route: single route table and run context. Dispatches to the runner, stores and presentation.

use crate::checkpoint::CheckpointStore;
use crate::config::{ConfigLoader, QuarryConfig};
use crate::error::{ApiError, StorageError};
use crate::governor::SysinfoSampler;
use crate::ledger::{LedgerSessionRecord, SessionLedger};
use crate::runner::{BatchRunner, RunOptions};
use crate::session::CancellationFlag;
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::cli::output::{
    format_checkpoint_text, format_run_summary, format_sessions_text,
};
use crate::cli::parse::{CheckpointCommands, Commands};

/// Runtime context for CLI execution: the merged configuration and its source.
pub struct RunContext {
    config: QuarryConfig,
    config_path: Option<PathBuf>,
}

impl RunContext {
    /// Load configuration: defaults, then the config file, then `QUARRY__*` environment.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn from_config(config: QuarryConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    pub fn config(&self) -> &QuarryConfig {
        &self.config
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let started = Instant::now();
        let result = self.execute_inner(command);
        info!(
            command = command_name(command),
            ok = result.is_ok(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Command finished"
        );
        result
    }

    fn execute_inner(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Run {
                target,
                checkpoint_interval,
                max_cpu,
                max_memory,
                resume,
                session_id,
                no_export,
                no_governor,
                format,
            } => {
                let mut config = self.config.clone();
                if let Some(target) = target {
                    config.batch.target_records = *target;
                }
                if let Some(interval) = checkpoint_interval {
                    config.batch.checkpoint_interval = *interval;
                }
                if let Some(cpu) = max_cpu {
                    config.resources.max_cpu_percent = *cpu;
                }
                if let Some(memory) = max_memory {
                    config.resources.max_memory_mb = *memory;
                }
                let options = RunOptions {
                    resume: resume.clone(),
                    session_id: session_id.clone(),
                    skip_export: *no_export,
                };
                self.handle_run(config, options, !*no_governor, format)
            }
            Commands::Sessions { format } => self.handle_sessions(format),
            Commands::Checkpoint { command } => self.handle_checkpoint_command(command),
            Commands::Validate => {
                self.config.ensure_valid()?;
                let source = self
                    .config_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "defaults, ./quarry.toml and environment".to_string());
                Ok(format!("Configuration valid ({})", source))
            }
        }
    }

    fn handle_run(
        &self,
        config: QuarryConfig,
        options: RunOptions,
        sample_resources: bool,
        format: &str,
    ) -> Result<String, ApiError> {
        config.ensure_valid()?;
        let provider = config.provider.create_client()?;
        let cancel = CancellationFlag::new();

        let mut runner = BatchRunner::new(config.clone(), provider).with_cancellation(cancel.clone());
        match SessionLedger::open(config.batch.ledger_path()) {
            Ok(ledger) => runner = runner.with_ledger(ledger),
            Err(e) => warn!(error = %e, "Session ledger unavailable; continuing without it"),
        }
        if sample_resources {
            runner = runner.with_sampler(Box::new(SysinfoSampler::new()));
        }

        let rt = tokio::runtime::Runtime::new().map_err(|e| {
            ApiError::SessionFailed(format!("Failed to create tokio runtime: {}", e))
        })?;
        let outcome = rt.block_on(async {
            let signal_cancel = cancel.clone();
            let watcher = tokio::spawn(async move {
                wait_for_shutdown_signal().await;
                warn!("Shutdown requested; stopping after the current record");
                signal_cancel.cancel();
            });
            let outcome = runner.run(options).await;
            watcher.abort();
            outcome
        })?;

        if format == "json" {
            let value = json!({
                "report": outcome.report,
                "export": outcome.export,
                "checkpoint_removed": outcome.checkpoint_removed,
            });
            serde_json::to_string_pretty(&value)
                .map_err(|e| ApiError::StorageError(StorageError::Serialization(e.to_string())))
        } else {
            Ok(format_run_summary(&outcome))
        }
    }

    fn handle_sessions(&self, format: &str) -> Result<String, ApiError> {
        let ledger_path = self.config.batch.ledger_path();
        let records: Vec<LedgerSessionRecord> = if ledger_path.exists() {
            SessionLedger::open(&ledger_path)?.sessions()?
        } else {
            Vec::new()
        };
        let checkpoints = self.checkpoint_store().list_sessions()?;

        if format == "json" {
            let value = json!({
                "sessions": records,
                "checkpoints": checkpoints,
            });
            serde_json::to_string_pretty(&value)
                .map_err(|e| ApiError::StorageError(StorageError::Serialization(e.to_string())))
        } else {
            Ok(format_sessions_text(&records, &checkpoints))
        }
    }

    fn handle_checkpoint_command(&self, command: &CheckpointCommands) -> Result<String, ApiError> {
        let store = self.checkpoint_store();
        match command {
            CheckpointCommands::Show { session_id, format } => {
                if format == "json" {
                    let metadata = store.read_metadata(session_id)?;
                    serde_json::to_string_pretty(&metadata).map_err(|e| {
                        ApiError::StorageError(StorageError::Serialization(e.to_string()))
                    })
                } else {
                    let snapshot = store.inspect(session_id)?;
                    Ok(format_checkpoint_text(&snapshot))
                }
            }
            CheckpointCommands::Verify { session_id } => {
                let snapshot = store.inspect(session_id)?;
                Ok(format!(
                    "Checkpoint {} verified: {} records, {} of {} complete",
                    session_id,
                    snapshot.records.len(),
                    snapshot.progress.completed_count,
                    snapshot.progress.target_count
                ))
            }
            CheckpointCommands::Remove { session_id, forget } => {
                if !store.metadata_path(session_id).exists() {
                    return Err(ApiError::SessionFailed(format!(
                        "No checkpoint for session {}",
                        session_id
                    )));
                }
                store.cleanup(session_id)?;
                if *forget {
                    let ledger_path = self.config.batch.ledger_path();
                    if ledger_path.exists() {
                        SessionLedger::open(&ledger_path)?.forget(session_id)?;
                    }
                }
                Ok(format!("Removed checkpoint for session {}", session_id))
            }
        }
    }

    fn checkpoint_store(&self) -> CheckpointStore {
        CheckpointStore::new(&self.config.batch.checkpoint_dir)
    }
}

/// Stable command name for logs
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Run { .. } => "run",
        Commands::Sessions { .. } => "sessions",
        Commands::Checkpoint { command } => match command {
            CheckpointCommands::Show { .. } => "checkpoint.show",
            CheckpointCommands::Verify { .. } => "checkpoint.verify",
            CheckpointCommands::Remove { .. } => "checkpoint.remove",
        },
        Commands::Validate => "validate",
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
