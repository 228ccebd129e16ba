//! Turn generation: the scripted "human" side of a conversation.
//!
//! Each user turn is produced by an OpenAI-compatible `/chat/completions`
//! call. The request is `[system instruction] + history + [round instruction]`
//! where round 0 opens the conversation and every later round asks for a
//! follow-up to the character's last reply. Any failure is reported as
//! [`SessionError::GenerationFailed`]; the caller abandons the attempt.

use crate::core::config::{LlmConfig, Persona};
use crate::core::error::SessionError;
use crate::core::types::{Role, Transcript};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Generated turns are the model's own output, so they go back in as `user`
/// and the character's replies as `assistant`.
pub fn history_from_transcript(transcript: &Transcript) -> Vec<ChatMessage> {
    transcript
        .messages
        .iter()
        .map(|m| match m.role {
            Role::User => ChatMessage::new(ChatRole::User, m.text.clone()),
            Role::Character => ChatMessage::new(ChatRole::Assistant, m.text.clone()),
        })
        .collect()
}

#[async_trait]
pub trait TurnGenerator: Send + Sync {
    /// Next user message for 0-based `round`, given the exchange so far.
    async fn next_message(
        &self,
        history: &[ChatMessage],
        round: usize,
    ) -> Result<String, SessionError>;
}

pub struct OpenAiTurnGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    persona: Persona,
}

impl std::fmt::Debug for OpenAiTurnGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTurnGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl OpenAiTurnGenerator {
    pub fn from_config(llm: &LlmConfig, persona: Persona) -> Result<Self> {
        let api_key = llm.resolve_api_key().ok_or_else(|| {
            anyhow!("no API key configured: set llm.api_key in companion-probe.json or OPENAI_API_KEY")
        })?;
        let http = reqwest::Client::builder()
            .timeout(llm.resolve_timeout())
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base_url: llm.resolve_base_url(),
            api_key,
            model: llm.resolve_model(),
            max_tokens: llm.resolve_max_tokens(),
            temperature: llm.resolve_temperature(),
            persona,
        })
    }

    /// Full message list sent for `round`.
    pub fn build_messages(&self, history: &[ChatMessage], round: usize) -> Vec<ChatMessage> {
        let round_instruction = if round == 0 {
            &self.persona.opening_prompt
        } else {
            &self.persona.follow_up_prompt
        };
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::new(ChatRole::System, self.persona.system_prompt.clone()));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::new(ChatRole::System, round_instruction.clone()));
        messages
    }

    pub fn request_body(&self, messages: &[ChatMessage]) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        })
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let builder = self.http.post(url).json(&self.request_body(messages));
        // Key-less local endpoints (Ollama / LM Studio) work without the header.
        let builder = if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(self.api_key.trim())
        };
        let response = builder
            .send()
            .await
            .context("chat.completions request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "chat.completions failed: status={} body={}",
                status,
                text
            ));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .context("chat.completions response json parse failed")?;

        extract_content(&value).ok_or_else(|| anyhow!("chat.completions response had no content"))
    }
}

/// `choices[0].message.content`, trimmed; `None` when absent or blank.
pub fn extract_content(value: &serde_json::Value) -> Option<String> {
    value
        .get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().trim_matches('"').trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl TurnGenerator for OpenAiTurnGenerator {
    async fn next_message(
        &self,
        history: &[ChatMessage],
        round: usize,
    ) -> Result<String, SessionError> {
        let messages = self.build_messages(history, round);
        match self.complete(&messages).await {
            Ok(text) => {
                debug!("generated round {} message: {}", round + 1, text);
                Ok(text)
            }
            Err(e) => {
                error!("GPT API call error: {:#}", e);
                Err(SessionError::GenerationFailed(e.to_string()))
            }
        }
    }
}
