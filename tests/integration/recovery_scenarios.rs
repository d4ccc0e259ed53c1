//! Provider artifacts repaired (or rejected) on the way through a batch run.

use crate::integration::test_utils::{good_reply, test_config, ScriptedProvider};
use quarry::recovery::{recover, RecoveryOutcome, RejectionReason};
use quarry::runner::{BatchRunner, RunOptions};
use quarry::session::SessionState;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

const REQUIRED: [&str; 4] = ["short_description", "description", "work_notes", "close_notes"];

#[test]
fn typical_provider_artifacts_are_accepted() {
    let artifacts = [
        // Fenced block with a trailing comma
        "```json\n{\"short_description\": \"Outlook crash\", \"description\": \"On start\", \"work_notes\": \"Safe mode\", \"close_notes\": \"Repaired profile\",}\n```",
        // Chatty preamble and single quotes
        "Sure! Here is the ticket:\n{'short_description': 'Outlook crash', 'description': 'On start', 'work_notes': 'Safe mode', 'close_notes': 'Repaired profile'}\nLet me know.",
        // Typographic quotes
        "{\u{201C}short_description\u{201D}: \u{201C}Outlook crash\u{201D}, \u{201C}description\u{201D}: \u{201C}On start\u{201D}, \u{201C}work_notes\u{201D}: \u{201C}Safe mode\u{201D}, \u{201C}close_notes\u{201D}: \u{201C}Repaired profile\u{201D}}",
    ];
    for raw in artifacts {
        match recover(raw, &REQUIRED) {
            RecoveryOutcome::Accepted(map) => {
                assert_eq!(map["short_description"], json!("Outlook crash"), "input: {raw}");
                assert_eq!(map["close_notes"], json!("Repaired profile"));
            }
            other => panic!("expected acceptance for {raw:?}, got {other:?}"),
        }
    }
}

#[test]
fn blank_required_field_is_missing() {
    let raw = r#"{"short_description": "Disk full", "description": "   ", "work_notes": "x", "close_notes": "y"}"#;
    assert_eq!(
        recover(raw, &REQUIRED),
        RecoveryOutcome::Rejected {
            reason: RejectionReason::MissingField("description".to_string()),
            raw_text: raw.to_string(),
        }
    );
}

#[test]
fn extra_fields_are_kept() {
    let raw = r#"{"short_description": "a", "description": "b", "work_notes": "c", "close_notes": "d", "assignment_group": "Network Ops"}"#;
    match recover(raw, &REQUIRED) {
        RecoveryOutcome::Accepted(map) => assert_eq!(map["assignment_group"], json!("Network Ops")),
        other => panic!("expected acceptance, got {other:?}"),
    }
}

#[tokio::test]
async fn rejected_responses_are_retried_within_a_unit() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), 2, 10);
    config.export.enabled = false;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("I cannot produce JSON today.".to_string()),
        Ok(r#"{"short_description": "only one field"}"#.to_string()),
        Ok(format!("```json\n{}\n```", good_reply(3))),
    ]));
    let mut runner = BatchRunner::new(config, provider.clone());
    let outcome = runner.run(RunOptions::default()).await.unwrap();

    assert_eq!(outcome.report.state, SessionState::Completed);
    assert_eq!(outcome.report.progress.failed_count, 0);
    assert_eq!(outcome.records[0].attempts, 3);
    assert_eq!(outcome.records[1].attempts, 1);
    assert_eq!(provider.calls(), 4);
    assert_eq!(outcome.report.metrics.provider_calls, 4);
    assert!(outcome.export.is_none());
}

#[tokio::test]
async fn persistent_garbage_fails_the_unit_and_moves_on() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path(), 2, 10);
    config.retry.max_retries = 1;
    config.export.enabled = false;
    let provider = Arc::new(ScriptedProvider::new(vec![
        Ok("garbage".to_string()),
        Ok("more garbage".to_string()),
    ]));
    let mut runner = BatchRunner::new(config, provider.clone());
    let outcome = runner.run(RunOptions::default()).await.unwrap();

    assert_eq!(outcome.report.state, SessionState::Completed);
    assert_eq!(outcome.report.progress.failed_count, 1);
    assert_eq!(outcome.report.progress.completed_count, 2);
    assert_eq!(outcome.report.metrics.total_failed, 1);
    // Failed units do not consume sequence numbers
    let sequences: Vec<u64> = outcome.records.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);
    assert_eq!(provider.calls(), 4);
}
