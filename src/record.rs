//! Accepted records as held by a batch session.

use crate::request::GenerationRequest;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A recovered record together with the request it was generated for.
///
/// `sequence` is the 1-based position within the session; a session never
/// holds two records with the same sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedRecord {
    pub sequence: u64,
    pub fingerprint: String,
    pub attributes: BTreeMap<String, String>,
    pub fields: Map<String, Value>,
    pub attempts: u32,
    /// Unix epoch milliseconds (UTC)
    pub generated_at_ms: i64,
}

impl GeneratedRecord {
    pub fn new(
        sequence: u64,
        request: &GenerationRequest,
        fields: Map<String, Value>,
        attempts: u32,
    ) -> Self {
        Self {
            sequence,
            fingerprint: request.fingerprint().to_string(),
            attributes: request.context().attributes.clone(),
            fields,
            attempts,
            generated_at_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
