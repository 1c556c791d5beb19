//! Artifact extraction from free-form engine answers.
//!
//! Engine answers may embed JSON objects such as
//! `{"type": "plotly_figure", "figure_data": {...}, "description": "..."}`.
//! Extraction lifts those objects out of the text so the caller can render
//! them separately, leaving the surrounding prose intact.
//!
//! Scanning is a pure pass over the immutable text that returns every
//! recognised span before anything is spliced.

use std::ops::Range;

use serde_json::{Map, Value};

use jarvis_core::config::ChatConfig;
use jarvis_core::types::Artifact;

use crate::error::ChatError;

const TYPE_FIELD: &str = "type";
const PAYLOAD_FIELD: &str = "figure_data";
const DESCRIPTION_FIELD: &str = "description";
const ERROR_FIELD: &str = "error";

/// Prefix of an inline render-failure line. Distinct from the engine error
/// marker, so such answers stay in prompt history.
const FAILURE_MARKER: &str = "\u{274c}";

/// An artifact-tagged JSON object found in an answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSpan {
    /// Byte range of the object in the scanned text, `{` through `}`.
    pub range: Range<usize>,
    /// The tag taken from the object's `type` field.
    pub kind: String,
    pub object: Map<String, Value>,
}

/// Find every artifact-tagged object in `text`, in ascending start order.
///
/// Each `{` is a candidate. A plain depth counter finds its matching `}`;
/// the span is parsed as JSON and kept when its `type` is one of `kinds`.
/// After a kept span scanning resumes past its end. After anything else
/// (unbalanced, unparseable, untagged) it resumes one byte after the
/// candidate brace, so objects nested inside a rejected span are still
/// tried.
pub fn scan_artifact_spans(text: &str, kinds: &[String]) -> Vec<ArtifactSpan> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = bytes[cursor..].iter().position(|&b| b == b'{') {
        let start = cursor + offset;

        let Some(end) = matching_brace(bytes, start) else {
            cursor = start + 1;
            continue;
        };

        // Braces are ASCII, so both ends sit on char boundaries.
        match parse_tagged(&text[start..end], kinds) {
            Some((kind, object)) => {
                spans.push(ArtifactSpan {
                    range: start..end,
                    kind,
                    object,
                });
                cursor = end;
            }
            None => cursor = start + 1,
        }
    }

    spans
}

/// Exclusive end of the balanced span opened at `start`, if it closes.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth: usize = 0;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_tagged(candidate: &str, kinds: &[String]) -> Option<(String, Map<String, Value>)> {
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) else {
        return None;
    };
    let kind = object.get(TYPE_FIELD)?.as_str()?;
    if !kinds.iter().any(|k| k == kind) {
        return None;
    }
    Some((kind.to_string(), object))
}

/// Remove `spans` from `text`, splicing from the last span backwards so
/// earlier offsets stay valid.
pub fn splice_out(text: &str, spans: &[ArtifactSpan]) -> String {
    let mut ordered: Vec<&Range<usize>> = spans.iter().map(|s| &s.range).collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut result = text.to_string();
    for range in ordered {
        result.replace_range(range.clone(), "");
    }
    result
}

// =============================================================================
// ArtifactExtractor
// =============================================================================

/// Result of post-processing one engine answer.
#[derive(Debug, Default)]
pub struct ExtractedResponse {
    /// Answer text with artifact objects removed, trimmed.
    pub text: String,
    /// Artifacts in the order they appeared in the answer.
    pub artifacts: Vec<Artifact>,
    /// Artifact objects that reported a render failure.
    pub failures: Vec<ChatError>,
}

impl ExtractedResponse {
    /// Text to show for this answer.
    ///
    /// Render failures are appended as marked inline lines. When nothing
    /// at all is left to show, `placeholder` stands in.
    pub fn display_text(&self, placeholder: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.text.is_empty() {
            parts.push(self.text.clone());
        }
        parts.extend(
            self.failures
                .iter()
                .map(|failure| format!("{} {}", FAILURE_MARKER, failure)),
        );

        if parts.is_empty() {
            placeholder.to_string()
        } else {
            parts.join("\n\n")
        }
    }
}

/// Lifts artifact objects out of engine answers.
#[derive(Debug, Clone)]
pub struct ArtifactExtractor {
    kinds: Vec<String>,
}

impl Default for ArtifactExtractor {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl ArtifactExtractor {
    pub fn new(kinds: Vec<String>) -> Self {
        Self { kinds }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.artifact_kinds.clone())
    }

    /// Split `raw` into display text, artifacts and render failures.
    pub fn extract(&self, raw: &str) -> ExtractedResponse {
        let spans = scan_artifact_spans(raw, &self.kinds);
        if spans.is_empty() {
            return ExtractedResponse {
                text: raw.trim().to_string(),
                ..Default::default()
            };
        }

        let text = splice_out(raw, &spans).trim().to_string();
        let mut artifacts = Vec::new();
        let mut failures = Vec::new();

        for span in spans {
            match into_artifact(span) {
                Ok(artifact) => artifacts.push(artifact),
                Err(failure) => {
                    tracing::warn!(error = %failure, "Artifact could not be rendered");
                    failures.push(failure);
                }
            }
        }

        tracing::debug!(
            artifacts = artifacts.len(),
            failures = failures.len(),
            "Extracted artifacts from engine answer"
        );

        ExtractedResponse {
            text,
            artifacts,
            failures,
        }
    }
}

fn into_artifact(span: ArtifactSpan) -> Result<Artifact, ChatError> {
    let ArtifactSpan {
        kind, mut object, ..
    } = span;

    if let Some(error) = object.get(ERROR_FIELD).filter(|v| !v.is_null()) {
        let reason = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(ChatError::ArtifactParseFailed { kind, reason });
    }

    let Some(payload) = object.remove(PAYLOAD_FIELD) else {
        return Err(ChatError::ArtifactParseFailed {
            kind,
            reason: format!("missing {} field", PAYLOAD_FIELD),
        });
    };

    let description = object
        .get(DESCRIPTION_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Artifact {
        kind,
        payload,
        description,
    })
}
