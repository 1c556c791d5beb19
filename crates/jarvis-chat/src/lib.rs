//! Conversation core for Jarvis.
//!
//! Tracks investigation context across turns, builds context-enriched
//! prompts for the reasoning engine, lifts embedded artifacts out of its
//! answers and manages named, persisted sessions.

pub mod artifact;
pub mod context;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod session;

pub use artifact::{scan_artifact_spans, ArtifactExtractor, ArtifactSpan, ExtractedResponse};
pub use context::ContextUpdater;
pub use engine::{
    parse_temperature, EngineMessage, EngineRequest, OpenAiEngine, ReasoningEngine,
    TemperaturePreset,
};
pub use error::ChatError;
pub use orchestrator::{ChatOrchestrator, TurnReply};
pub use prompt::{routing_system_prompt, PromptBuilder};
pub use session::{SessionManager, SessionState};
