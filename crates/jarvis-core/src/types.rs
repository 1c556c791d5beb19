use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix that marks an assistant turn as a failed engine call.
///
/// Turns starting with this marker are never fed back into prompt history.
pub const ERROR_MARKER: &str = "\u{274c} Error:";

/// Title shown for sessions that have no user turn yet.
pub const DEFAULT_SESSION_TITLE: &str = "New Session";

// =============================================================================
// Enums
// =============================================================================

/// Author of a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// The kind of investigation currently underway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationKind {
    IncidentAnalysis,
    DeploymentAnalysis,
    PerformanceAnalysis,
    GeneralInvestigation,
}

impl InvestigationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationKind::IncidentAnalysis => "incident_analysis",
            InvestigationKind::DeploymentAnalysis => "deployment_analysis",
            InvestigationKind::PerformanceAnalysis => "performance_analysis",
            InvestigationKind::GeneralInvestigation => "general_investigation",
        }
    }
}

impl std::fmt::Display for InvestigationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Conversation types
// =============================================================================

/// A structured object (e.g. a chart) lifted out of an assistant answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact tag, e.g. `"plotly_figure"`.
    pub kind: String,
    /// Opaque render payload.
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One message in a conversation. Immutable once appended to a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Wall-clock time the engine took to answer, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Model and sampling label, e.g. `"gpt-4o (temp 0.1)"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_label: Option<String>,
    /// Artifacts extracted from the raw answer this turn displays.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,
}

impl Turn {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text: text.into(),
            created_at: Utc::now(),
            latency_ms: None,
            model_label: None,
            artifacts: Vec::new(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// An assistant turn carrying a visible error marker.
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::new(Role::Assistant, format!("{} {}", ERROR_MARKER, message))
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_model_label(mut self, label: impl Into<String>) -> Self {
        self.model_label = Some(label.into());
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<Artifact>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Whether this turn's content starts with the error marker.
    pub fn is_error(&self) -> bool {
        self.text.trim_start().starts_with(ERROR_MARKER)
    }
}

/// Summary of what the conversation is currently focused on.
///
/// Absent fields mean no context has been established on that axis.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationContext {
    #[serde(default)]
    pub active_incident_id: Option<String>,
    #[serde(default)]
    pub active_deployment_ref: Option<String>,
    #[serde(default)]
    pub active_investigation_kind: Option<InvestigationKind>,
}

impl InvestigationContext {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.active_incident_id.is_none()
            && self.active_deployment_ref.is_none()
            && self.active_investigation_kind.is_none()
    }

    /// Human-readable lines, one per active field.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(ref incident) = self.active_incident_id {
            lines.push(format!("Current incident context: {}", incident));
        }
        if let Some(ref deployment) = self.active_deployment_ref {
            lines.push(format!("Current deployment context: {}", deployment));
        }
        if let Some(kind) = self.active_investigation_kind {
            lines.push(format!("Active investigation type: {}", kind));
        }
        lines
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// A named, persistable conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Creation-time derived id. Never changes after creation.
    pub id: String,
    /// Set once, on first save.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(default)]
    pub context: InvestigationContext,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            title: None,
            turns: Vec::new(),
            context: InvestigationContext::default(),
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn message_count(&self) -> usize {
        self.turns.len()
    }

    /// Advance `last_updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated_at {
            self.last_updated_at = now;
        }
    }

    /// Title to display, falling back to the default for untitled sessions.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_SESSION_TITLE)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.display_title().to_string(),
            message_count: self.message_count(),
            created_at: self.created_at,
            last_updated_at: self.last_updated_at,
        }
    }
}

/// Derive a session title from the first user turn.
///
/// Titles longer than `max_chars` characters are cut and suffixed with `...`.
pub fn title_from_turns(turns: &[Turn], max_chars: usize) -> String {
    let Some(first) = turns.iter().find(|t| t.role == Role::User) else {
        return DEFAULT_SESSION_TITLE.to_string();
    };
    let text = first.text.trim();
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Lightweight listing entry for a stored session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}
