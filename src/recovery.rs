//! Response Recovery
//!
//! Turns loosely-structured provider text into a validated JSON object or a
//! classified rejection. Stages run in a fixed order and short-circuit on the
//! first successful parse; the whole pipeline is a pure function of its input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

pub mod stages;

/// Why a response was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    Unparseable,
    MissingField(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Unparseable => write!(f, "unparseable"),
            RejectionReason::MissingField(name) => write!(f, "missing_field:{}", name),
        }
    }
}

/// Result of running recovery over one provider response.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryOutcome {
    Accepted(Map<String, Value>),
    Rejected {
        reason: RejectionReason,
        raw_text: String,
    },
}

impl RecoveryOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, RecoveryOutcome::Accepted(_))
    }
}

/// Stateless recovery pipeline bound to a required-field list.
#[derive(Debug, Clone)]
pub struct ResponseRecovery {
    required_fields: Vec<String>,
}

impl ResponseRecovery {
    pub fn new(required_fields: Vec<String>) -> Self {
        Self { required_fields }
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn recover(&self, raw_text: &str) -> RecoveryOutcome {
        recover(raw_text, &self.required_fields)
    }
}

/// Run the full recovery pipeline.
pub fn recover<S: AsRef<str>>(raw_text: &str, required_fields: &[S]) -> RecoveryOutcome {
    let parsed = match parse_payload(raw_text) {
        Some(Value::Object(map)) => map,
        _ => {
            debug!(
                raw_len = raw_text.len(),
                "provider response could not be parsed"
            );
            return RecoveryOutcome::Rejected {
                reason: RejectionReason::Unparseable,
                raw_text: raw_text.to_string(),
            };
        }
    };

    for field in required_fields {
        let field = field.as_ref();
        let present = parsed.get(field).map(stages::is_present).unwrap_or(false);
        if !present {
            debug!(field, "provider response missing required field");
            return RecoveryOutcome::Rejected {
                reason: RejectionReason::MissingField(field.to_string()),
                raw_text: raw_text.to_string(),
            };
        }
    }

    RecoveryOutcome::Accepted(parsed)
}

/// Stages 1-5: clean the text and parse it, tolerant first, repaired-strict second.
fn parse_payload(raw_text: &str) -> Option<Value> {
    let text = stages::strip_code_fences(raw_text);
    let text = stages::extract_object_span(&text);
    let text = stages::normalize_quotes(&text);
    let text = stages::strip_trailing_commas(&text);

    if let Some(value) = stages::tolerant_parse(&text) {
        return Some(value);
    }

    let repaired = stages::repair_contractions(&text);
    let repaired = stages::escape_inner_quotes(&repaired);
    // Stray quotes can hide a trailing comma from the first pass.
    let repaired = stages::strip_trailing_commas(&repaired);
    stages::strict_parse(&repaired)
}
