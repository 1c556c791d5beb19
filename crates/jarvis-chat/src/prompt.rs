//! Context-aware prompt construction.
//!
//! Wraps the operator's raw question with the active investigation context
//! and a short window of recent turns so the reasoning engine can resolve
//! references like "that incident" or "the deployment".

use jarvis_core::config::ChatConfig;
use jarvis_core::types::{InvestigationContext, Role, Turn};

/// Routing instructions handed to the engine as its system prompt.
const ROUTING_PROMPT: &str = "\
You are a supervisor routing operator questions to specialised query agents:
- an incident and deployment agent that reads the incident warehouse and deployment event tables and can correlate incidents with deployments.
- a metrics agent that discovers metrics relevant to an incident, runs time-series queries for them and analyses the results.
- a log agent that queries structured service logs such as errors, health checks and request traces.
Assign work to one agent at a time and never call agents in parallel.
Do not answer from your own knowledge.
When the operator refers to 'that incident', 'the deployment' or 'the current issue', use the session context to understand what they mean.
If a follow-up question has no context, ask which incident, deployment or issue the operator means.";

const CLOSING_INSTRUCTION: &str =
    "Please use the above context when relevant to give a more informed response.";

/// Builds enriched engine requests from a turn log and investigation context.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    recent_turns: usize,
    assistant_excerpt_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_config(&ChatConfig::default())
    }
}

impl PromptBuilder {
    pub fn new(recent_turns: usize, assistant_excerpt_chars: usize) -> Self {
        Self {
            recent_turns,
            assistant_excerpt_chars,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(config.recent_turns, config.assistant_excerpt_chars)
    }

    /// Build the enriched request for `request`.
    ///
    /// `history` is the session's turn log and may already end with the user
    /// turn for `request`; that turn is not repeated as prior conversation.
    /// With no active context and fewer than two turns the request is
    /// returned unchanged.
    pub fn build(&self, request: &str, history: &[Turn], context: &InvestigationContext) -> String {
        if context.is_empty() && history.len() < 2 {
            return request.to_string();
        }

        let prior = match history.last() {
            Some(last) if last.role == Role::User && last.text == request => {
                &history[..history.len() - 1]
            }
            _ => history,
        };

        let mut blocks = Vec::with_capacity(4);

        let context_lines = context.describe();
        if !context_lines.is_empty() {
            blocks.push(format!("CONTEXT:\n{}", context_lines.join("\n")));
        }

        let window_start = prior.len().saturating_sub(self.recent_turns);
        let recent: Vec<String> = prior[window_start..]
            .iter()
            .filter(|turn| !turn.is_error())
            .map(|turn| self.render_turn(turn))
            .collect();
        if !recent.is_empty() {
            blocks.push(format!("RECENT CONVERSATION:\n{}", recent.join("\n")));
        }

        blocks.push(format!("CURRENT REQUEST: {}", request));
        blocks.push(CLOSING_INSTRUCTION.to_string());

        let prompt = blocks.join("\n\n");
        tracing::debug!(
            context_fields = context_lines.len(),
            recent_turns = recent.len(),
            prompt_len = prompt.len(),
            "Built enriched prompt"
        );
        prompt
    }

    fn render_turn(&self, turn: &Turn) -> String {
        match turn.role {
            Role::User => format!("User previously asked: {}", turn.text),
            Role::Assistant => format!(
                "Assistant previously responded: {}",
                excerpt(&turn.text, self.assistant_excerpt_chars)
            ),
        }
    }
}

/// System prompt for the engine: routing rules plus the active session
/// context and any operator instructions.
pub fn routing_system_prompt(
    context: &InvestigationContext,
    custom_instructions: Option<&str>,
) -> String {
    let mut prompt = String::from(ROUTING_PROMPT);

    let lines = context.describe();
    if !lines.is_empty() {
        prompt.push_str("\n\nCURRENT SESSION CONTEXT:\n");
        prompt.push_str(&lines.join("\n"));
        prompt.push_str("\nPlease consider this context when routing requests and providing responses.");
    }

    if let Some(extra) = custom_instructions.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str("\n\nADDITIONAL INSTRUCTIONS:\n");
        prompt.push_str(extra);
    }

    prompt
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
