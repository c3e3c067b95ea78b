//! Turning a free-form model completion into a validated `AnalysisResult`.
//!
//! Models are told to answer with bare JSON but routinely wrap it in prose,
//! so the completion is scanned for the first balanced `{...}` block that is
//! itself a JSON object. String literals (and escapes inside them) are
//! honoured while counting braces, so `"}"` inside a value does not end the
//! object early.
//!
//! Validation is strict about types and lenient about range: every field
//! must be present with the right JSON type, while `extractionScore` is
//! clamped into `0..=100`.

use serde_json::{Map, Value};

use crate::error::AnalysisError;
use crate::models::{AnalysisResult, VisualFeedback};
use crate::services::{Completion, StopReason};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

/// Index of the `}` closing the object that opens at `start`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Find the first embedded JSON object in `text`.
///
/// Returns the matched slice together with the parsed object. Brace groups
/// that do not parse (e.g. `{like this}` in prose) are skipped.
pub fn find_json_object(text: &str) -> Option<(&str, Map<String, Value>)> {
    let mut from = 0;

    while let Some(offset) = text[from..].find('{') {
        let start = from + offset;
        if let Some(end) = balanced_end(text, start) {
            let candidate = &text[start..=end];
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                return Some((candidate, map));
            }
        }
        from = start + 1;
    }

    None
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "missing",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
    .to_string()
}

fn violation(field: &str, expected: &'static str, found: Option<&Value>) -> AnalysisError {
    AnalysisError::ModelOutputSchemaViolation {
        field: field.to_string(),
        expected,
        found: describe(found),
    }
}

fn require_string(obj: &Map<String, Value>, key: &str, path: &str) -> Result<String, AnalysisError> {
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(violation(path, "string", other)),
    }
}

fn require_bool(obj: &Map<String, Value>, key: &str) -> Result<bool, AnalysisError> {
    match obj.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        other => Err(violation(key, "boolean", other)),
    }
}

fn require_score(obj: &Map<String, Value>) -> Result<f64, AnalysisError> {
    let value = obj.get("extractionScore");
    let score = value
        .and_then(Value::as_f64)
        .ok_or_else(|| violation("extractionScore", "number", value))?;

    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        let clamped = score.clamp(MIN_SCORE, MAX_SCORE);
        log::warn!("⚠️ extractionScore {} out of range, clamped to {}", score, clamped);
        return Ok(clamped);
    }
    Ok(score)
}

/// Check a parsed object against the result schema.
pub fn validate(obj: &Map<String, Value>) -> Result<AnalysisResult, AnalysisError> {
    let extraction_score = require_score(obj)?;

    let feedback = match obj.get("visualFeedback") {
        Some(Value::Object(map)) => map,
        other => return Err(violation("visualFeedback", "object", other)),
    };
    let visual_feedback = VisualFeedback {
        color_analysis: require_string(feedback, "colorAnalysis", "visualFeedback.colorAnalysis")?,
        pattern_analysis: require_string(feedback, "patternAnalysis", "visualFeedback.patternAnalysis")?,
        texture_notes: require_string(feedback, "textureNotes", "visualFeedback.textureNotes")?,
    };

    Ok(AnalysisResult {
        extraction_score,
        visual_feedback,
        channeling: require_bool(obj, "channeling")?,
        over_extraction: require_bool(obj, "overExtraction")?,
        ai_suggestions: require_string(obj, "aiSuggestions", "aiSuggestions")?,
    })
}

/// Extract and validate the analysis carried by a model completion.
pub fn parse_completion(completion: &Completion) -> Result<AnalysisResult, AnalysisError> {
    let truncated = completion.stop_reason == StopReason::MaxTokens;

    let Some((_, obj)) = find_json_object(&completion.text) else {
        if truncated {
            return Err(AnalysisError::ModelOutputTruncated);
        }
        let preview: String = completion.text.chars().take(120).collect();
        return Err(AnalysisError::ModelOutputNotJson(preview));
    };

    // A cut-off answer can still contain a complete nested object
    // (e.g. `visualFeedback`), which then fails validation.
    validate(&obj).map_err(|e| if truncated { AnalysisError::ModelOutputTruncated } else { e })
}
