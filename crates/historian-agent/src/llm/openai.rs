//! OpenAI-compatible API implementation.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::types::{ChatMessage, EventSink, FunctionCall, ToolCall, ToolDefinition};

use super::{ChatCompletionResponse, Choice, ChoiceMessage, LlmClient};

impl LlmClient {
    fn request_body(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        temperature: Option<f64>,
        stream: bool,
    ) -> Result<Value> {
        let mut body = json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if stream {
            body["stream"] = json!(true);
        }
        if let Some(temp) = temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = serde_json::to_value(tools)?;
            }
        }
        Ok(body)
    }

    async fn post_chat(&self, body: &Value) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("LLM API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, body_text);
        }
        Ok(resp)
    }

    pub(super) async fn openai_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        temperature: Option<f64>,
    ) -> Result<ChatCompletionResponse> {
        let body = self.request_body(model, messages, tools, temperature, false)?;
        let resp = self.post_chat(&body).await?;
        let response: ChatCompletionResponse = resp
            .json()
            .await
            .context("Failed to parse LLM API response")?;
        Ok(response)
    }

    pub(super) async fn openai_chat_completion_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        temperature: Option<f64>,
        event_sink: &mut dyn EventSink,
    ) -> Result<ChatCompletionResponse> {
        let body = self.request_body(model, messages, tools, temperature, true)?;
        let resp = self.post_chat(&body).await?;
        accumulate_openai_stream(resp, event_sink).await
    }
}

async fn accumulate_openai_stream(
    resp: reqwest::Response,
    event_sink: &mut dyn EventSink,
) -> Result<ChatCompletionResponse> {
    let mut acc = StreamAccumulator::default();
    let mut buffer: Vec<u8> = Vec::new();
    let mut stream = resp.bytes_stream();

    'outer: while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.context("Stream chunk error")?;
        buffer.extend_from_slice(&chunk);

        for line in drain_lines(&mut buffer) {
            if acc.feed_line(&line, event_sink) {
                break 'outer;
            }
        }
    }
    let tail = String::from_utf8_lossy(&buffer).trim().to_string();
    if !tail.is_empty() {
        acc.feed_line(&tail, event_sink);
    }

    Ok(acc.finish(event_sink))
}

/// Take every complete line out of `buffer`. Lines are decoded only once
/// whole, so a UTF-8 character split across network chunks stays intact.
pub(super) fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=pos).collect();
        lines.push(String::from_utf8_lossy(&line).trim().to_string());
    }
    lines
}

/// How far past the last known slot a tool-call delta index may point.
const MAX_TOOL_CALL_INDEX_GAP: usize = 8;

/// Incremental state of one streamed completion.
#[derive(Default)]
pub(super) struct StreamAccumulator {
    content: String,
    tool_calls: Vec<ToolCall>,
    model: String,
    finish_reason: Option<String>,
    usage: Option<super::Usage>,
}

impl StreamAccumulator {
    /// Consume one SSE line. Returns true on `data: [DONE]`.
    pub(super) fn feed_line(&mut self, line: &str, event_sink: &mut dyn EventSink) -> bool {
        if line.is_empty() || line.starts_with(':') {
            return false;
        }
        let Some(data) = line.strip_prefix("data:") else {
            return false;
        };
        let data = data.trim();
        if data == "[DONE]" {
            return true;
        }
        let chunk: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => return false,
        };

        if self.model.is_empty() {
            if let Some(m) = chunk.get("model").and_then(|v| v.as_str()) {
                self.model = m.to_string();
            }
        }
        if let Some(u) = chunk.get("usage").filter(|u| !u.is_null()) {
            self.usage = serde_json::from_value(u.clone()).ok();
        }

        let Some(choices) = chunk.get("choices").and_then(|c| c.as_array()) else {
            return false;
        };
        for choice in choices {
            if let Some(fr) = choice.get("finish_reason").and_then(|v| v.as_str()) {
                self.finish_reason = Some(fr.to_string());
            }
            let Some(delta) = choice.get("delta") else {
                continue;
            };

            if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    self.content.push_str(text);
                    event_sink.on_text_chunk(text);
                }
            }

            // Tool-call deltas arrive by index.
            if let Some(tc_deltas) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                for tc_delta in tc_deltas {
                    let idx = tc_delta.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                    let idx = match usize::try_from(idx) {
                        Ok(i) if i <= self.tool_calls.len() + MAX_TOOL_CALL_INDEX_GAP => i,
                        _ => {
                            tracing::warn!(index = idx, "Ignoring tool-call delta with out-of-range index");
                            continue;
                        }
                    };
                    while self.tool_calls.len() <= idx {
                        self.tool_calls.push(ToolCall {
                            id: String::new(),
                            call_type: "function".to_string(),
                            function: FunctionCall {
                                name: String::new(),
                                arguments: String::new(),
                            },
                        });
                    }
                    let slot = &mut self.tool_calls[idx];
                    if let Some(id) = tc_delta.get("id").and_then(|v| v.as_str()) {
                        slot.id = id.to_string();
                    }
                    if let Some(func) = tc_delta.get("function") {
                        if let Some(name) = func.get("name").and_then(|v| v.as_str()) {
                            slot.function.name.push_str(name);
                        }
                        if let Some(args) = func.get("arguments").and_then(|v| v.as_str()) {
                            slot.function.arguments.push_str(args);
                        }
                    }
                }
            }
        }
        false
    }

    pub(super) fn finish(self, event_sink: &mut dyn EventSink) -> ChatCompletionResponse {
        if !self.content.is_empty() {
            event_sink.on_text_chunk("\n");
        }
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .filter(|tc| !tc.function.name.is_empty())
            .collect();

        ChatCompletionResponse {
            id: String::new(),
            model: self.model,
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage {
                    role: "assistant".to_string(),
                    content: (!self.content.is_empty()).then_some(self.content),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
                finish_reason: self.finish_reason,
            }],
            usage: self.usage,
        }
    }
}
