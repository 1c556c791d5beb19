//! Reasoning engine boundary.
//!
//! The conversation core consumes one capability: given a system prompt and
//! an ordered list of turns, produce a free-form answer. [`ReasoningEngine`]
//! is that seam; [`OpenAiEngine`] implements it against any
//! OpenAI-compatible chat completions endpoint.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use jarvis_core::config::EngineConfig;
use jarvis_core::types::Role;

use crate::error::ChatError;

/// One turn handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMessage {
    pub role: Role,
    pub text: String,
}

impl EngineMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }
}

/// A single engine invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub system_prompt: String,
    pub messages: Vec<EngineMessage>,
    pub temperature: f32,
}

/// External component that turns an enriched request into an answer.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Whether the engine is initialised and can accept calls.
    fn is_ready(&self) -> bool;

    /// Model name used in per-turn labels.
    fn model_name(&self) -> String;

    async fn complete(&self, request: &EngineRequest) -> Result<String, ChatError>;
}

// =============================================================================
// Temperature
// =============================================================================

/// Named sampling temperatures offered to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemperaturePreset {
    Conservative,
    Balanced,
    Standard,
    Creative,
    VeryCreative,
    Maximum,
}

impl TemperaturePreset {
    pub const ALL: [TemperaturePreset; 6] = [
        TemperaturePreset::Conservative,
        TemperaturePreset::Balanced,
        TemperaturePreset::Standard,
        TemperaturePreset::Creative,
        TemperaturePreset::VeryCreative,
        TemperaturePreset::Maximum,
    ];

    pub fn value(self) -> f32 {
        match self {
            TemperaturePreset::Conservative => 0.1,
            TemperaturePreset::Balanced => 0.3,
            TemperaturePreset::Standard => 0.5,
            TemperaturePreset::Creative => 0.7,
            TemperaturePreset::VeryCreative => 0.9,
            TemperaturePreset::Maximum => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TemperaturePreset::Conservative => "Conservative",
            TemperaturePreset::Balanced => "Balanced",
            TemperaturePreset::Standard => "Standard",
            TemperaturePreset::Creative => "Creative",
            TemperaturePreset::VeryCreative => "Very Creative",
            TemperaturePreset::Maximum => "Maximum",
        }
    }
}

impl fmt::Display for TemperaturePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), format_temperature(self.value()))
    }
}

impl FromStr for TemperaturePreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        Self::ALL
            .into_iter()
            .find(|preset| preset.label().to_lowercase().replace(' ', "") == normalized)
            .ok_or_else(|| format!("unknown temperature preset: {}", s.trim()))
    }
}

/// Parse a preset name or a literal temperature in `0.0..=1.0`.
pub fn parse_temperature(input: &str) -> Result<f32, String> {
    if let Ok(preset) = input.parse::<TemperaturePreset>() {
        return Ok(preset.value());
    }
    match input.trim().parse::<f32>() {
        Ok(value) if (0.0..=1.0).contains(&value) => Ok(value),
        Ok(value) => Err(format!("temperature {} is outside 0.0 - 1.0", value)),
        Err(_) => Err(format!(
            "expected a preset ({}) or a number between 0.0 and 1.0",
            TemperaturePreset::ALL
                .iter()
                .map(|p| p.label())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

/// Render a temperature with at least one decimal place.
pub fn format_temperature(value: f32) -> String {
    let rounded = format!("{:.2}", value);
    let trimmed = rounded.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{}0", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Label stamped on assistant turns, e.g. `"gpt-4o (temp 0.1)"`.
pub fn model_label(model: &str, temperature: f32) -> String {
    format!("{} (temp {})", model, format_temperature(temperature))
}

// =============================================================================
// OpenAI-compatible engine
// =============================================================================

/// Engine backed by an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct OpenAiEngine {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl OpenAiEngine {
    pub fn new(api_key: Option<String>) -> Self {
        let defaults = EngineConfig::default();
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: defaults.model,
            base_url: defaults.base_url,
        }
    }

    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &EngineConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "No API key found; reasoning engine is unavailable"
            );
        }
        Self::new(api_key)
            .with_model(config.model.clone())
            .with_base_url(config.base_url.clone())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(&self, request: &EngineRequest) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": request.system_prompt,
            }));
        }
        messages.extend(request.messages.iter().map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.text,
            })
        }));

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Value>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl ReasoningEngine for OpenAiEngine {
    fn is_ready(&self) -> bool {
        self.api_key.is_some()
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }

    async fn complete(&self, request: &EngineRequest) -> Result<String, ChatError> {
        let api_key = self.api_key.as_ref().ok_or(ChatError::EngineUnavailable)?;
        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.request_body(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::EngineCallFailed(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
            ChatError::EngineCallFailed(format!("failed to parse response: {}", e))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ChatError::EngineCallFailed("no choices in response".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Presets ----

    #[test]
    fn test_preset_values() {
        let values: Vec<f32> = TemperaturePreset::ALL.iter().map(|p| p.value()).collect();
        assert_eq!(values, vec![0.1, 0.3, 0.5, 0.7, 0.9, 1.0]);
    }

    #[test]
    fn test_preset_from_str() {
        assert_eq!(
            "conservative".parse::<TemperaturePreset>(),
            Ok(TemperaturePreset::Conservative)
        );
        assert_eq!(
            "Very Creative".parse::<TemperaturePreset>(),
            Ok(TemperaturePreset::VeryCreative)
        );
        assert_eq!(
            "very_creative".parse::<TemperaturePreset>(),
            Ok(TemperaturePreset::VeryCreative)
        );
        assert!("spicy".parse::<TemperaturePreset>().is_err());
    }

    #[test]
    fn test_preset_display() {
        assert_eq!(TemperaturePreset::Maximum.to_string(), "Maximum (1.0)");
        assert_eq!(TemperaturePreset::Balanced.to_string(), "Balanced (0.3)");
    }

    // ---- Parsing ----

    #[test]
    fn test_parse_temperature_preset_or_number() {
        assert_eq!(parse_temperature("creative"), Ok(0.7));
        assert_eq!(parse_temperature("0.25"), Ok(0.25));
        assert_eq!(parse_temperature(" 1 "), Ok(1.0));
    }

    #[test]
    fn test_parse_temperature_rejects_out_of_range() {
        assert!(parse_temperature("1.5").is_err());
        assert!(parse_temperature("-0.1").is_err());
        assert!(parse_temperature("warm").unwrap_err().contains("Conservative"));
    }

    // ---- Labels ----

    #[test]
    fn test_format_temperature() {
        assert_eq!(format_temperature(0.1), "0.1");
        assert_eq!(format_temperature(1.0), "1.0");
        assert_eq!(format_temperature(0.25), "0.25");
        assert_eq!(format_temperature(0.0), "0.0");
    }

    #[test]
    fn test_model_label() {
        assert_eq!(model_label("gpt-4o", 0.1), "gpt-4o (temp 0.1)");
    }

    // ---- OpenAiEngine ----

    #[test]
    fn test_engine_not_ready_without_key() {
        assert!(!OpenAiEngine::new(None).is_ready());
        assert!(!OpenAiEngine::new(Some("   ".into())).is_ready());
        assert!(OpenAiEngine::new(Some("sk-test".into())).is_ready());
    }

    #[test]
    fn test_engine_builder() {
        let engine = OpenAiEngine::new(Some("k".into()))
            .with_model("local-model")
            .with_base_url("http://localhost:8080/");
        assert_eq!(engine.model_name(), "local-model");
        assert_eq!(engine.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_request_body_prepends_system_prompt() {
        let engine = OpenAiEngine::new(Some("k".into()));
        let body = engine.request_body(&EngineRequest {
            system_prompt: "route carefully".into(),
            messages: vec![EngineMessage::user("hello")],
            temperature: 0.3,
        });
        assert_eq!(body.messages.len(), 2);
        assert_eq!(body.messages[0]["role"], "system");
        assert_eq!(body.messages[1]["role"], "user");
        assert_eq!(body.messages[1]["content"], "hello");
        assert_eq!(body.temperature, 0.3);
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Found incident 42"}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Found incident 42")
        );
    }

    #[tokio::test]
    async fn test_complete_without_key_is_unavailable() {
        let engine = OpenAiEngine::new(None);
        let request = EngineRequest {
            system_prompt: String::new(),
            messages: vec![EngineMessage::user("hi")],
            temperature: 0.1,
        };
        let result = engine.complete(&request).await;
        assert!(matches!(result, Err(ChatError::EngineUnavailable)));
    }
}
