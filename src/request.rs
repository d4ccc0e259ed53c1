//! Generation requests and the sources that render them.
//!
//! A request is the rendered prompt plus a fingerprint of the context used to
//! build it. Fingerprints are blake3 digests of the canonical context encoding
//! and exist for correlation only; nothing is cached by them.

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute keys recognised by distribution metrics.
pub const ATTR_CATEGORY: &str = "category";
pub const ATTR_PRIORITY: &str = "priority";
pub const ATTR_DEPARTMENT: &str = "department";

/// Semantic inputs of one request, ordered for a stable encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub attributes: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// `key=value` lines in key order.
    fn canonical_encoding(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.attributes {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    pub fn fingerprint(&self) -> String {
        let digest = blake3::hash(self.canonical_encoding().as_bytes());
        hex::encode(digest.as_bytes())
    }
}

/// Immutable unit-of-work input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    prompt: String,
    fingerprint: String,
    context: RequestContext,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, context: RequestContext) -> Self {
        let fingerprint = context.fingerprint();
        Self {
            prompt: prompt.into(),
            fingerprint,
            context,
        }
    }

    /// Build a request with an externally supplied fingerprint; checked by [`validate`].
    ///
    /// [`validate`]: GenerationRequest::validate
    pub fn with_fingerprint(
        prompt: impl Into<String>,
        context: RequestContext,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            fingerprint: fingerprint.into(),
            context,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// The fingerprint must be 64 lowercase hex chars matching the context.
    pub fn validate(&self) -> Result<(), ApiError> {
        let well_formed = self.fingerprint.len() == 64
            && self
                .fingerprint
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        if !well_formed {
            return Err(ApiError::InvalidFingerprint(format!(
                "malformed fingerprint '{}'",
                self.fingerprint
            )));
        }
        let expected = self.context.fingerprint();
        if expected != self.fingerprint {
            return Err(ApiError::InvalidFingerprint(format!(
                "fingerprint {} does not match context ({})",
                self.fingerprint, expected
            )));
        }
        Ok(())
    }
}

/// Produces the request for the next unit of work.
///
/// `sequence` is the 1-based position of the record the request is meant to
/// produce and `failed_units` the number of units that have failed so far.
/// Both survive a checkpoint, so sources can derive deterministic contexts
/// across restarts. Mixing `failed_units` in moves past a context that keeps
/// failing instead of sending it again.
pub trait RequestSource: Send {
    fn next_request(&mut self, sequence: u64, failed_units: u64)
        -> Result<GenerationRequest, ApiError>;
}

/// Round-robin context generator rendering a single prompt template.
///
/// Placeholders: `{category}`, `{priority}`, `{department}`, `{sequence}`.
pub struct TemplateRequestSource {
    template: String,
    categories: Vec<String>,
    priorities: Vec<String>,
    departments: Vec<String>,
}

impl TemplateRequestSource {
    pub fn new(
        template: impl Into<String>,
        categories: Vec<String>,
        priorities: Vec<String>,
        departments: Vec<String>,
    ) -> Result<Self, ApiError> {
        if categories.is_empty() || priorities.is_empty() || departments.is_empty() {
            return Err(ApiError::ConfigError(
                "categories, priorities and departments must not be empty".to_string(),
            ));
        }
        Ok(Self {
            template: template.into(),
            categories,
            priorities,
            departments,
        })
    }

    fn pick(values: &[String], index: u64) -> &str {
        &values[(index % values.len() as u64) as usize]
    }

    fn render(&self, context: &RequestContext, sequence: u64) -> String {
        let mut prompt = self.template.replace("{sequence}", &sequence.to_string());
        for (key, value) in &context.attributes {
            prompt = prompt.replace(&format!("{{{}}}", key), value);
        }
        prompt
    }
}

impl RequestSource for TemplateRequestSource {
    fn next_request(
        &mut self,
        sequence: u64,
        failed_units: u64,
    ) -> Result<GenerationRequest, ApiError> {
        let index = sequence.saturating_sub(1).wrapping_add(failed_units);
        // Strides differ so that combinations rotate instead of moving in lockstep.
        let category = Self::pick(&self.categories, index);
        let priority = Self::pick(&self.priorities, index / self.categories.len() as u64);
        let department = Self::pick(&self.departments, index.wrapping_mul(7));
        let context = RequestContext::new()
            .with(ATTR_CATEGORY, category)
            .with(ATTR_PRIORITY, priority)
            .with(ATTR_DEPARTMENT, department);
        let prompt = self.render(&context, sequence);
        Ok(GenerationRequest::new(prompt, context))
    }
}
