//! LLM HTTP client for OpenAI-compatible chat completions with tool calling.
//!
//! `/chat/completions` only (OpenAI, DeepSeek, Qwen, Gemini's OpenAI endpoint,
//! local Ollama, ...). Streaming responses forward text deltas to an
//! [`EventSink`] and accumulate tool-call deltas by index.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use historian_data::TextCompletion;
use serde::{Deserialize, Serialize};

use super::types::{safe_truncate, ChatMessage, EventSink, ToolCall, ToolDefinition};

mod openai;


/// LLM client for an OpenAI-compatible API.
pub struct LlmClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    max_tokens: usize,
}

impl LlmClient {
    pub fn new(api_base: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            max_tokens: 4096,
        })
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Non-streaming chat completion call.
    pub async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        temperature: Option<f64>,
    ) -> Result<ChatCompletionResponse> {
        self.openai_chat_completion(model, messages, tools, temperature)
            .await
    }

    /// Streaming chat completion call.
    pub async fn chat_completion_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        temperature: Option<f64>,
        event_sink: &mut dyn EventSink,
    ) -> Result<ChatCompletionResponse> {
        self.openai_chat_completion_stream(model, messages, tools, temperature, event_sink)
            .await
    }
}

// ─── Response types ─────────────────────────────────────────────────────────
// id/model/usage/index/finish_reason are part of the wire format; only the
// message is read by the loop.

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// Message of the first choice.
    pub fn into_message(self) -> Result<ChoiceMessage> {
        self.choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| anyhow::anyhow!("No choices in LLM response"))
    }
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub role: String,
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Check if an error is a context overflow (token limit exceeded).
pub fn is_context_overflow_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("context_length_exceeded")
        || lower.contains("maximum context length")
        || lower.contains("token limit")
        || lower.contains("too many tokens")
        || lower.contains("context window")
        || lower.contains("max_tokens")
}

/// Truncate all tool result messages in place to reduce context size.
pub fn truncate_tool_messages(messages: &mut [ChatMessage], max_chars: usize) {
    for msg in messages.iter_mut() {
        if msg.role == "tool" {
            if let Some(ref mut content) = msg.content {
                if content.len() > max_chars {
                    let truncated = format!(
                        "{}...\n[truncated: {} chars → {}]",
                        safe_truncate(content, max_chars),
                        content.len(),
                        max_chars
                    );
                    *content = truncated;
                }
            }
        }
    }
}

// ─── TextCompletion adapter ─────────────────────────────────────────────────

/// [`TextCompletion`] over [`LlmClient`]: one system + one user message, no tools.
pub struct LlmCompletion {
    client: Arc<LlmClient>,
    model: String,
    temperature: Option<f64>,
}

impl LlmCompletion {
    pub fn new(client: Arc<LlmClient>, model: &str, temperature: Option<f64>) -> Self {
        Self {
            client,
            model: model.to_string(),
            temperature,
        }
    }
}

#[async_trait]
impl TextCompletion for LlmCompletion {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let message = self
            .client
            .chat_completion(&self.model, &messages, None, self.temperature)
            .await?
            .into_message()?;
        message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("LLM returned an empty response"))
    }
}
