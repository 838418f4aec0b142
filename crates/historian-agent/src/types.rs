//! Shared types for the agent crate.

use historian_core::config::{env_keys::agent as agent_keys, env_bool, env_parse, LlmConfig};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ─── UTF-8 safe string helpers ──────────────────────────────────────────────

/// Truncate a string at a safe UTF-8 char boundary (from the start).
/// Returns a &str of at most `max_bytes` bytes, never splitting a multi-byte character.
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// OpenAI-compatible API base URL (e.g. "https://api.openai.com/v1")
    pub api_base: String,
    pub api_key: String,
    /// Model used by the agents and for SQL / plot spec generation
    pub model: String,
    /// Model used for SQL explanations
    pub simple_model: String,
    pub max_tokens: usize,
    pub temperature: Option<f64>,
    /// Maximum LLM turns per user message
    pub max_iterations: usize,
    /// Stop after this many failing tool calls in a row (None = no limit)
    pub max_consecutive_failures: Option<usize>,
    /// Stream completions (text chunks reach the sink as they arrive)
    pub stream: bool,
    /// Tool results longer than this are truncated before reaching the model
    pub tool_result_max_chars: usize,
    /// Per tool message limit applied after a context overflow
    pub tool_result_recovery_max_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o".to_string(),
            simple_model: "gpt-4o".to_string(),
            max_tokens: 4096,
            temperature: None,
            max_iterations: 20,
            max_consecutive_failures: Some(3),
            stream: true,
            tool_result_max_chars: 12000,
            tool_result_recovery_max_chars: 3000,
        }
    }
}

impl AgentConfig {
    /// LLM settings from [`LlmConfig`], loop limits from `HISTORIAN_*` agent keys.
    pub fn from_env() -> Self {
        let llm = LlmConfig::from_env();
        let defaults = Self::default();
        let max_failures = env_parse(
            agent_keys::MAX_CONSECUTIVE_FAILURES,
            &[],
            defaults.max_consecutive_failures.unwrap_or(0),
        );
        Self {
            api_base: llm.api_base,
            api_key: llm.api_key,
            model: llm.model,
            simple_model: llm.simple_model,
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
            max_iterations: env_parse(agent_keys::MAX_ITERATIONS, &[], defaults.max_iterations),
            max_consecutive_failures: (max_failures > 0).then_some(max_failures),
            stream: env_bool(agent_keys::STREAM, &[], defaults.stream),
            tool_result_max_chars: env_parse(
                agent_keys::TOOL_RESULT_MAX_CHARS,
                &[],
                defaults.tool_result_max_chars,
            ),
            tool_result_recovery_max_chars: env_parse(
                agent_keys::TOOL_RESULT_RECOVERY_MAX_CHARS,
                &[],
                defaults.tool_result_recovery_max_chars,
            ),
        }
    }
}

// ─── OpenAI-compatible chat types ───────────────────────────────────────────

/// A chat message in OpenAI format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn with_role(role: &str, content: Option<&str>) -> Self {
        Self {
            role: role.to_string(),
            content: content.map(|s| s.to_string()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: &str) -> Self {
        Self::with_role("system", Some(content))
    }

    pub fn user(content: &str) -> Self {
        Self::with_role("user", Some(content))
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role("assistant", Some(content))
    }

    pub fn assistant_with_tool_calls(content: Option<&str>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role("assistant", content)
        }
    }

    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::with_role("tool", Some(content))
        }
    }
}

/// A tool call from the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// Function call details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// OpenAI-compatible tool definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl ToolDefinition {
    pub fn function(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Result from executing a tool.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(tool_name: &str, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: String::new(),
            tool_name: tool_name.to_string(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(tool_name: &str, content: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::ok(tool_name, content)
        }
    }
}

/// Agent loop result.
#[derive(Debug)]
pub struct AgentResult {
    pub response: String,
    /// Agent that produced the final answer
    pub agent: String,
    pub messages: Vec<ChatMessage>,
    pub tool_calls_count: usize,
    pub iterations: usize,
}

// ─── Event sinks ────────────────────────────────────────────────────────────

/// Event sink trait for different output targets (CLI, HTTP stream).
pub trait EventSink: Send {
    /// Called at the start of each conversation turn (before any other events).
    fn on_turn_start(&mut self) {}
    /// Called when the assistant produces text content.
    fn on_text(&mut self, text: &str);
    /// Called for streaming text chunks.
    fn on_text_chunk(&mut self, _chunk: &str) {}
    /// Called when a tool is about to be invoked.
    fn on_tool_call(&mut self, call_id: &str, name: &str, arguments: &str);
    /// Called when a tool returns a result.
    fn on_tool_result(&mut self, call_id: &str, name: &str, result: &str, is_error: bool);
    /// Called when control moves to another agent.
    fn on_agent_transfer(&mut self, _from: &str, _to: &str) {}
}

/// Collects nothing. For one-off generation calls and tests.
pub struct SilentEventSink;

impl EventSink for SilentEventSink {
    fn on_text(&mut self, _text: &str) {}
    fn on_tool_call(&mut self, _call_id: &str, _name: &str, _arguments: &str) {}
    fn on_tool_result(&mut self, _call_id: &str, _name: &str, _result: &str, _is_error: bool) {}
}

/// Separator for CLI section headers.
const SECTION_SEP: &str = "──────────────────────────────────────";

/// Simple terminal event sink for CLI chat.
pub struct TerminalEventSink {
    pub verbose: bool,
    streamed_text: bool,
    execution_section_shown: bool,
    result_section_shown: bool,
}

impl TerminalEventSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            streamed_text: false,
            execution_section_shown: false,
            result_section_shown: false,
        }
    }

    #[inline]
    fn msg(&self, s: &str) {
        eprintln!("{}", s);
    }

    fn show_execution_section(&mut self) {
        if !self.execution_section_shown {
            self.execution_section_shown = true;
            self.msg(&format!("─── 🔧 Tools ─── {}", SECTION_SEP));
        }
    }

    fn show_result_section(&mut self) {
        if !self.result_section_shown {
            self.result_section_shown = true;
            self.msg(&format!("─── 📄 Answer ─── {}", SECTION_SEP));
            self.msg("");
        }
    }
}

impl EventSink for TerminalEventSink {
    fn on_turn_start(&mut self) {
        self.execution_section_shown = false;
        self.result_section_shown = false;
    }

    fn on_text(&mut self, text: &str) {
        if self.streamed_text {
            // Already shown chunk by chunk.
            self.streamed_text = false;
            return;
        }
        if !text.trim().is_empty() {
            self.show_result_section();
        }
        use std::io::Write;
        print!("{}", text);
        let _ = std::io::stdout().flush();
        println!();
    }

    fn on_text_chunk(&mut self, chunk: &str) {
        self.streamed_text = true;
        if !chunk.trim().is_empty() {
            self.show_result_section();
        }
        use std::io::Write;
        print!("{}", chunk);
        let _ = std::io::stdout().flush();
    }

    fn on_tool_call(&mut self, _call_id: &str, name: &str, arguments: &str) {
        self.show_execution_section();
        if self.verbose {
            let args_display = if arguments.len() > 200 {
                format!("{}…", safe_truncate(arguments, 200))
            } else {
                arguments.to_string()
            };
            self.msg(&format!("🔧 Tool: {}  args={}", name, args_display));
        } else {
            self.msg(&format!("🔧 {}", name));
        }
    }

    fn on_tool_result(&mut self, _call_id: &str, name: &str, result: &str, is_error: bool) {
        let icon = if is_error { "❌" } else { "✅" };
        if self.verbose {
            let brief = if result.len() > 400 {
                format!("{}…", safe_truncate(result, 400))
            } else {
                result.to_string()
            };
            self.msg(&format!("  {} {}: {}", icon, name, brief));
        } else {
            let first = result.lines().find(|l| !l.trim().is_empty()).unwrap_or("(ok)");
            let brief = if first.len() > 80 {
                format!("{}…", safe_truncate(first, 80))
            } else {
                first.to_string()
            };
            self.msg(&format!("  {} {} {}", icon, name, brief));
        }
    }

    fn on_agent_transfer(&mut self, from: &str, to: &str) {
        self.msg(&format!("  ↪ {} → {}", from, to));
    }
}

/// Agent events forwarded over a channel (HTTP streaming).
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    TextChunk(String),
    Text(String),
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    AgentTransfer {
        from: String,
        to: String,
    },
}

/// Event sink that forwards every event to an unbounded channel.
/// Send errors (receiver gone) are ignored; the run still completes.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
    streamed_text: bool,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self {
            tx,
            streamed_text: false,
        }
    }

    fn send(&self, event: AgentEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

impl EventSink for ChannelEventSink {
    fn on_text(&mut self, text: &str) {
        if self.streamed_text {
            self.streamed_text = false;
            return;
        }
        self.send(AgentEvent::Text(text.to_string()));
    }

    fn on_text_chunk(&mut self, chunk: &str) {
        self.streamed_text = true;
        self.send(AgentEvent::TextChunk(chunk.to_string()));
    }

    fn on_tool_call(&mut self, call_id: &str, name: &str, arguments: &str) {
        self.send(AgentEvent::ToolCall {
            id: call_id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        });
    }

    fn on_tool_result(&mut self, call_id: &str, name: &str, result: &str, is_error: bool) {
        self.send(AgentEvent::ToolResult {
            id: call_id.to_string(),
            name: name.to_string(),
            content: result.to_string(),
            is_error,
        });
    }

    fn on_agent_transfer(&mut self, from: &str, to: &str) {
        self.send(AgentEvent::AgentTransfer {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_truncate_respects_char_boundary() {
        let s = "kWh→total";
        assert_eq!(safe_truncate(s, 4), "kWh");
        assert_eq!(safe_truncate(s, 100), s);
    }

    #[test]
    fn test_chat_message_serialization_skips_empty_fields() {
        let json = serde_json::to_value(ChatMessage::tool_result("call_1", "ok")).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_1");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_channel_sink_suppresses_duplicate_streamed_text() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = ChannelEventSink::new(tx);
        sink.on_text_chunk("Hel");
        sink.on_text_chunk("lo");
        sink.on_text("Hello");
        sink.on_text("Second");
        drop(sink);

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert_eq!(
            events,
            vec![
                AgentEvent::TextChunk("Hel".into()),
                AgentEvent::TextChunk("lo".into()),
                AgentEvent::Text("Second".into()),
            ]
        );
    }

    #[test]
    fn test_channel_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut sink = ChannelEventSink::new(tx);
        sink.on_tool_call("c1", "execute_sql_query", "{}");
    }
}
