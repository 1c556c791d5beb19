//! Investigation context tracking.
//!
//! Infers the incident, deployment, and kind of investigation the
//! conversation is focused on from the reasoning engine's answers.

use std::sync::LazyLock;

use regex::Regex;

use jarvis_core::types::{InvestigationContext, InvestigationKind};

// =============================================================================
// Patterns (ordered: the first pattern with any match wins)
// =============================================================================

static INCIDENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\bincident[:\s]+(\d+)",
        r"(?i)\bicm[:\s]+(\d+)",
        r"(?i)\bincident\s+id[:\s]+([a-z0-9]+)",
        r"#(\d+)",
    ])
});

static DEPLOYMENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\bdeployment[:\s]+([a-z0-9.\-]+)",
        r"(?i)\brelease[:\s]+([a-z0-9.\-]+)",
        r"(?i)\bversion[:\s]+([a-z0-9.\-]+)",
    ])
});

const INVESTIGATION_VERBS: &[&str] = &[
    "investigating",
    "analyzing",
    "troubleshooting",
    "diagnosing",
];

const RESOLUTION_WORDS: &[&str] = &["resolved", "fixed", "completed", "closed"];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("Invalid context regex"))
        .collect()
}

// =============================================================================
// ContextUpdater
// =============================================================================

/// Derives a new [`InvestigationContext`] from an engine answer.
///
/// Incident, deployment, and investigation kind are independent axes
/// computed from the same text. Nothing here fails: text with no signal
/// returns the previous context unchanged.
pub struct ContextUpdater;

impl ContextUpdater {
    pub fn update(&self, text: &str, previous: &InvestigationContext) -> InvestigationContext {
        let mut next = previous.clone();

        if let Some(incident) = extract_incident_id(text) {
            next.active_incident_id = Some(incident);
        }

        if let Some(deployment) = extract_deployment_ref(text) {
            next.active_deployment_ref = Some(deployment);
        }

        if let Some(kind) = infer_investigation_kind(text) {
            next.active_investigation_kind = Some(kind);
        }

        // Runs after inference: "investigating ... resolved" ends cleared.
        if mentions_resolution(text) {
            next.active_investigation_kind = None;
        }

        if next != *previous {
            tracing::debug!(
                incident = ?next.active_incident_id,
                deployment = ?next.active_deployment_ref,
                investigation = ?next.active_investigation_kind,
                "Investigation context updated"
            );
        }

        next
    }
}

/// Most recently mentioned incident id under the highest-priority pattern.
pub fn extract_incident_id(text: &str) -> Option<String> {
    last_match_of_first_pattern(&INCIDENT_PATTERNS, text)
}

/// Most recently mentioned deployment ref under the highest-priority pattern.
///
/// Sentence punctuation trailing the token (`v2.1.0.`) is not part of it.
pub fn extract_deployment_ref(text: &str) -> Option<String> {
    last_match_of_first_pattern(&DEPLOYMENT_PATTERNS, text)
}

/// Classify the investigation when the text says one is underway.
pub fn infer_investigation_kind(text: &str) -> Option<InvestigationKind> {
    let lower = text.to_lowercase();
    if !INVESTIGATION_VERBS.iter().any(|v| lower.contains(v)) {
        return None;
    }

    let kind = if lower.contains("incident") {
        InvestigationKind::IncidentAnalysis
    } else if lower.contains("deployment") {
        InvestigationKind::DeploymentAnalysis
    } else if lower.contains("performance") || lower.contains("metric") {
        InvestigationKind::PerformanceAnalysis
    } else {
        InvestigationKind::GeneralInvestigation
    };
    Some(kind)
}

/// Whether the text reports the investigation as finished.
pub fn mentions_resolution(text: &str) -> bool {
    let lower = text.to_lowercase();
    RESOLUTION_WORDS.iter().any(|w| lower.contains(w))
}

fn last_match_of_first_pattern(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', '-']))
            .filter(|token| !token.is_empty())
            .last()
            .map(str::to_string)
    })
}

// =============================================================================
// Tests
// =============================================================================
