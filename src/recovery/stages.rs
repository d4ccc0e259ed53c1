//! Individual repair stages applied to raw provider text.
//!
//! Each stage is a pure `&str -> String` (or `&str -> Result`) transform so it
//! can be exercised against known provider artifacts in isolation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?").expect("valid fence regex"));
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```$").expect("valid fence regex"));
static CONTRACTION_QUOTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([A-Za-z])"([A-Za-z])"#).expect("valid contraction regex"));

/// Stage 1: drop markdown code fences and surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let without_open = LEADING_FENCE.replace(trimmed, "");
    let without_open = without_open.trim();
    TRAILING_FENCE.replace(without_open, "").trim().to_string()
}

/// Stage 2: keep the span from the first `{` to the last `}`.
///
/// Text without a closing brace after an opening one is returned unchanged.
pub fn extract_object_span(text: &str) -> String {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => text[start..=end].to_string(),
        _ => text.to_string(),
    }
}

/// Stage 3a: typographic quotes to ASCII.
pub fn normalize_quotes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
            other => other,
        })
        .collect()
}

/// Stage 3b: remove commas directly preceding a closing bracket or brace.
///
/// Commas inside quoted strings (either quote style) are left alone.
pub fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(delimiter) => {
                out.push(c);
                if c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        out.push(next);
                        i += 1;
                    }
                } else if c == delimiter {
                    quote = None;
                }
            }
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    out.push(c);
                }
                ',' => {
                    let mut j = i + 1;
                    while chars.get(j).is_some_and(|ch| ch.is_whitespace()) {
                        j += 1;
                    }
                    if matches!(chars.get(j), Some('}') | Some(']')) {
                        // Resume at the closer, dropping the comma and the gap.
                        i = j;
                        continue;
                    }
                    out.push(c);
                }
                _ => out.push(c),
            },
        }
        i += 1;
    }

    out
}

/// Stage 4: lenient parse accepting JSON5 deviations (single quotes,
/// unquoted keys, comments).
pub fn tolerant_parse(text: &str) -> Option<Value> {
    json5::from_str::<Value>(text).ok()
}

/// Stage 5a: `team"s` style contractions become apostrophes.
pub fn repair_contractions(text: &str) -> String {
    // Two passes so adjacent contractions sharing a letter (`a"b"c`) are both caught.
    let once = CONTRACTION_QUOTE.replace_all(text, "$1'$2");
    CONTRACTION_QUOTE.replace_all(&once, "$1'$2").into_owned()
}

/// Stage 5b: escape bare double quotes that sit inside string values.
///
/// A quote inside a string is treated as the closing quote only when the next
/// non-whitespace character could legally follow a JSON string (`,` `}` `]`
/// `:`) or the input ends; any other quote is escaped.
pub fn escape_inner_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                out.push(c);
                if let Some(&next) = chars.get(i + 1) {
                    out.push(next);
                }
                i += 2;
            }
            '"' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                let closes = matches!(next, None | Some(',') | Some('}') | Some(']') | Some(':'));
                if closes {
                    in_string = false;
                    out.push('"');
                } else {
                    out.push_str("\\\"");
                }
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Stage 5c: strict parse after quote repair.
pub fn strict_parse(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text).ok()
}

/// Whether a parsed field counts as present for required-field validation.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
