//! Chat orchestrator: central coordinator for one operator's conversation.
//!
//! Per message: validate, append the user turn, build the enriched prompt,
//! call the reasoning engine, post-process the answer, append the assistant
//! turn and auto-save. Engine failures become visible error turns rather
//! than errors returned to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use jarvis_core::config::{ChatConfig, JarvisConfig};
use jarvis_core::types::{Artifact, InvestigationContext, Session, SessionSummary, Turn};
use jarvis_storage::SessionStore;

use crate::artifact::ArtifactExtractor;
use crate::context::ContextUpdater;
use crate::engine::{model_label, EngineMessage, EngineRequest, ReasoningEngine};
use crate::error::ChatError;
use crate::prompt::{routing_system_prompt, PromptBuilder};
use crate::session::{SessionManager, SessionState};

/// What the caller shows for one processed message.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub displayable_text: String,
    pub artifacts: Vec<Artifact>,
    /// Inline render failures, already included in `displayable_text`.
    pub render_failures: Vec<String>,
    /// Investigation context after this turn.
    pub context: InvestigationContext,
    pub latency_ms: u64,
    pub model_label: String,
    /// True when the engine call failed and the turn is an error marker.
    pub is_error: bool,
}

/// Ties the session core together around a [`ReasoningEngine`].
pub struct ChatOrchestrator {
    engine: Arc<dyn ReasoningEngine>,
    sessions: SessionManager,
    prompt_builder: PromptBuilder,
    context_updater: ContextUpdater,
    extractor: ArtifactExtractor,
    config: ChatConfig,
    custom_instructions: Option<String>,
    temperature: f32,
    timeout: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        store: Arc<dyn SessionStore>,
        config: &JarvisConfig,
    ) -> Self {
        let chat = config.chat.clone();
        Self {
            engine,
            sessions: SessionManager::new(store, chat.title_max_chars),
            prompt_builder: PromptBuilder::from_config(&chat),
            context_updater: ContextUpdater,
            extractor: ArtifactExtractor::from_config(&chat),
            config: chat,
            custom_instructions: config.prompt.custom_instructions.clone(),
            temperature: config.engine.temperature.clamp(0.0, 1.0),
            timeout: Duration::from_secs(config.engine.timeout_secs),
        }
    }

    /// Override the per-call engine timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Set the sampling temperature for subsequent calls, clamped to `0.0..=1.0`.
    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = temperature.clamp(0.0, 1.0);
        info!(temperature = self.temperature, "Temperature updated");
    }

    pub fn engine_ready(&self) -> bool {
        self.engine.is_ready()
    }

    /// Process one operator message.
    pub async fn send_message(&mut self, text: &str) -> Result<TurnReply, ChatError> {
        self.send_message_with_cancel(text, CancellationToken::new())
            .await
    }

    /// Process one operator message, abandoning the engine call if `cancel`
    /// fires first.
    ///
    /// Returns `Err` only when nothing was recorded: engine not ready or
    /// invalid input. Failed, timed-out and cancelled calls are recorded as
    /// error turns and returned as `Ok` with `is_error` set.
    pub async fn send_message_with_cancel(
        &mut self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnReply, ChatError> {
        if !self.engine.is_ready() {
            return Err(ChatError::EngineUnavailable);
        }
        self.validate(text)?;

        self.sessions.append_turn(Turn::user(text));

        let context = self.sessions.context();
        let prompt = self
            .prompt_builder
            .build(text, self.sessions.turns(), &context);
        let request = EngineRequest {
            system_prompt: routing_system_prompt(&context, self.custom_instructions.as_deref()),
            messages: vec![EngineMessage::user(prompt)],
            temperature: self.temperature,
        };
        let label = model_label(&self.engine.model_name(), self.temperature);

        let started = Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            result = tokio::time::timeout(self.timeout, self.engine.complete(&request)) => {
                result.unwrap_or(Err(ChatError::EngineTimeout(self.timeout.as_secs())))
            }
        };
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let reply = match outcome {
            Ok(raw) => self.record_answer(&raw, &context, latency_ms, label),
            Err(e) => self.record_failure(e, &context, latency_ms, label),
        };

        if let Err(e) = self.sessions.save_current() {
            warn!(error = %e, "Auto-save after turn failed");
        }
        Ok(reply)
    }

    fn validate(&self, text: &str) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if text.chars().count() > self.config.max_message_length {
            return Err(ChatError::MessageTooLong(self.config.max_message_length));
        }
        Ok(())
    }

    fn record_answer(
        &mut self,
        raw: &str,
        context: &InvestigationContext,
        latency_ms: u64,
        label: String,
    ) -> TurnReply {
        let extracted = self.extractor.extract(raw);
        // Context comes from the raw answer, not the spliced display text.
        let next_context = self.context_updater.update(raw, context);
        let displayable_text = extracted.display_text(&self.config.empty_reply_placeholder);

        let turn = Turn::assistant(displayable_text.clone())
            .with_latency_ms(latency_ms)
            .with_model_label(label.clone())
            .with_artifacts(extracted.artifacts.clone());
        self.sessions.append_turn(turn);
        self.sessions.set_context(next_context.clone());

        info!(
            latency_ms,
            artifacts = extracted.artifacts.len(),
            "Engine answered"
        );

        TurnReply {
            displayable_text,
            artifacts: extracted.artifacts,
            render_failures: extracted.failures.iter().map(ToString::to_string).collect(),
            context: next_context,
            latency_ms,
            model_label: label,
            is_error: false,
        }
    }

    fn record_failure(
        &mut self,
        error: ChatError,
        context: &InvestigationContext,
        latency_ms: u64,
        label: String,
    ) -> TurnReply {
        warn!(error = %error, latency_ms, "Engine call failed");

        let turn = Turn::error(&error)
            .with_latency_ms(latency_ms)
            .with_model_label(label.clone());
        let displayable_text = turn.text.clone();
        self.sessions.append_turn(turn);

        TurnReply {
            displayable_text,
            artifacts: Vec::new(),
            render_failures: Vec::new(),
            context: context.clone(),
            latency_ms,
            model_label: label,
            is_error: true,
        }
    }

    // ---- Session operations ----

    /// Start a new session and return its id.
    pub fn new_session(&mut self) -> String {
        self.sessions.new_session().id.clone()
    }

    pub fn save_session(&mut self) -> Result<(), ChatError> {
        self.sessions.save_current()
    }

    pub fn load_session(&mut self, id: &str) -> Result<&Session, ChatError> {
        self.sessions.load(id)
    }

    pub fn delete_session(&mut self, id: &str) -> Result<(), ChatError> {
        self.sessions.delete(id)
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, ChatError> {
        self.sessions.list()
    }

    pub fn clear_history(&mut self) {
        self.sessions.clear_history();
    }

    pub fn context(&self) -> InvestigationContext {
        self.sessions.context()
    }

    pub fn turns(&self) -> &[Turn] {
        self.sessions.turns()
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.sessions.current()
    }

    pub fn session_state(&self) -> SessionState {
        self.sessions.state()
    }
}
