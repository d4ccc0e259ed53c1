//! CLI output: error mapping and human-readable rendering of run results.

use crate::checkpoint::CheckpointSnapshot;
use crate::error::ApiError;
use crate::ledger::LedgerSessionRecord;
use crate::runner::RunOutcome;
use crate::session::{format_duration, SessionState};
use chrono::{TimeZone, Utc};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ProviderAuthFailed(_) => {
            format!("{} (check the provider API key)", e)
        }
        other => other.to_string(),
    }
}

/// Bold, underlined section heading
pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_millis(ms: u64) -> String {
    Utc.timestamp_millis_opt(ms as i64)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

/// Summary printed after `quarry run`
pub fn format_run_summary(outcome: &RunOutcome) -> String {
    let report = &outcome.report;
    let metrics = &report.metrics;
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Batch Summary")));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Session".to_string(), report.session_id.clone()]);
    table.add_row(vec!["State".to_string(), report.state.to_string()]);
    table.add_row(vec!["Runtime".to_string(), format_duration(report.runtime_secs)]);
    table.add_row(vec![
        "Generated".to_string(),
        format!(
            "{} / {}",
            report.progress.completed_count, report.progress.target_count
        ),
    ]);
    table.add_row(vec!["Failed".to_string(), report.progress.failed_count.to_string()]);
    table.add_row(vec![
        "Success rate".to_string(),
        format!("{:.1}%", report.success_rate()),
    ]);
    table.add_row(vec![
        "Avg generation time".to_string(),
        format!("{:.2}s", report.average_generation_secs()),
    ]);
    table.add_row(vec![
        "Tokens".to_string(),
        format!(
            "{} ({} prompt, {} completion)",
            metrics.total_tokens, metrics.prompt_tokens, metrics.completion_tokens
        ),
    ]);
    table.add_row(vec![
        "Estimated cost".to_string(),
        format!("${:.4}", metrics.cost_estimate),
    ]);
    if report.resources.sample_count > 0 {
        table.add_row(vec![
            "CPU avg / peak".to_string(),
            format!(
                "{:.1}% / {:.1}%",
                report.resources.avg_cpu_percent, report.resources.peak_cpu_percent
            ),
        ]);
        table.add_row(vec![
            "Memory avg / peak".to_string(),
            format!(
                "{:.0} MB / {:.0} MB",
                report.resources.avg_memory_mb, report.resources.peak_memory_mb
            ),
        ]);
    }
    if let Some(resumed) = report.resumed_from {
        table.add_row(vec!["Resumed from".to_string(), resumed.to_string()]);
    }
    if let Some(last) = report.last_checkpoint {
        table.add_row(vec!["Last checkpoint".to_string(), last.to_string()]);
    }
    out.push_str(&format!("{}\n", table));

    if !metrics.category_distribution.is_empty() {
        out.push_str(&format!("\n{}\n\n", format_section_heading("Categories")));
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec!["Category", "Records"]);
        for (category, count) in &metrics.category_distribution {
            table.add_row(vec![category.clone(), count.to_string()]);
        }
        out.push_str(&format!("{}\n", table));
    }

    if let Some(export) = &outcome.export {
        out.push_str(&format!(
            "\nExported {} records to {} file(s)\n",
            export.records,
            export.files.len()
        ));
        for file in &export.files {
            out.push_str(&format!("  {}\n", file.display()));
        }
    }
    let resumable = report.state == SessionState::Stopped
        || (report.state == SessionState::Failed && report.last_checkpoint.is_some());
    if resumable && !outcome.checkpoint_removed {
        out.push_str(&format!(
            "\nResume with: quarry run --resume {}\n",
            report.session_id
        ));
    }
    out
}

/// Ledger sessions plus checkpoint ids that have no ledger entry
pub fn format_sessions_text(records: &[LedgerSessionRecord], checkpoints: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Sessions")));
    if records.is_empty() && checkpoints.is_empty() {
        out.push_str("No sessions recorded.\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Session", "Status", "Completed", "Failed", "Target", "Resumes", "Started", "Checkpoint",
    ]);
    for record in records {
        let has_checkpoint = checkpoints.iter().any(|id| id == &record.session_id);
        table.add_row(vec![
            record.session_id.clone(),
            record.status.as_str().to_string(),
            record.completed_count.to_string(),
            record.failed_count.to_string(),
            record.target_count.to_string(),
            record.resume_count.to_string(),
            format_millis(record.started_at_ms),
            if has_checkpoint { "yes" } else { "no" }.to_string(),
        ]);
    }
    for id in checkpoints {
        if records.iter().all(|r| &r.session_id != id) {
            table.add_row(vec![
                id.clone(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
                "yes".to_string(),
            ]);
        }
    }
    out.push_str(&format!("{}\n", table));
    out
}

pub fn format_checkpoint_text(snapshot: &CheckpointSnapshot) -> String {
    let progress = &snapshot.progress;
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Checkpoint {}", progress.session_id))
    ));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.add_row(vec!["State".to_string(), snapshot.state.to_string()]);
    table.add_row(vec![
        "Completed".to_string(),
        format!(
            "{} / {} ({:.1}%)",
            progress.completed_count,
            progress.target_count,
            progress.percent_complete()
        ),
    ]);
    table.add_row(vec!["Failed".to_string(), progress.failed_count.to_string()]);
    table.add_row(vec!["Records".to_string(), snapshot.records.len().to_string()]);
    table.add_row(vec![
        "Tokens".to_string(),
        snapshot.metrics.total_tokens.to_string(),
    ]);
    table.add_row(vec![
        "Last updated".to_string(),
        progress.last_updated.to_rfc3339(),
    ]);
    out.push_str(&format!("{}\n", table));
    out
}
