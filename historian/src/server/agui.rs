//! AG-UI wire types: the `RunAgentInput` request body and the SSE events a run
//! emits.
//!
//! A run always opens with `RUN_STARTED` and closes with either
//! `STATE_SNAPSHOT` + `RUN_FINISHED` or `RUN_ERROR`. Assistant text is framed
//! as `TEXT_MESSAGE_START` / `..._CONTENT` / `..._END`; a text message still
//! open when a tool call starts (or the run ends) is closed first.

use historian_agent::AgentEvent;
use serde::Deserialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAgentInput {
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub messages: Vec<InputMessage>,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub context: Vec<Value>,
    #[serde(default)]
    pub forwarded_props: Value,
}

#[derive(Debug, Deserialize)]
pub struct InputMessage {
    pub role: String,
    #[serde(default)]
    pub content: Value,
}

impl InputMessage {
    /// Plain text of the message; text parts of a content array are joined.
    pub fn text(&self) -> Option<String> {
        match &self.content {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                    .collect();
                (!texts.is_empty()).then(|| texts.join("\n"))
            }
            _ => None,
        }
    }
}

impl RunAgentInput {
    /// The newest non-blank user message. Earlier messages are already in the
    /// server-side session history.
    pub fn last_user_message(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == "user")
            .find_map(|m| m.text().filter(|t| !t.trim().is_empty()))
    }

    /// Client state as a map; anything but an object is ignored.
    pub fn state_map(&self) -> Map<String, Value> {
        match &self.state {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// Turns agent events into AG-UI events for one run.
pub struct AgUiEncoder {
    thread_id: String,
    run_id: String,
    open_message: Option<String>,
}

impl AgUiEncoder {
    pub fn new(thread_id: &str, run_id: &str) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            open_message: None,
        }
    }

    pub fn run_started(&self) -> Value {
        event(
            "RUN_STARTED",
            json!({ "threadId": self.thread_id, "runId": self.run_id }),
        )
    }

    pub fn encode(&mut self, agent_event: AgentEvent) -> Vec<Value> {
        let mut out = Vec::new();
        match agent_event {
            AgentEvent::TextChunk(delta) => {
                if delta.is_empty() {
                    return out;
                }
                let message_id = self.open_text(&mut out);
                out.push(text_content(&message_id, &delta));
            }
            AgentEvent::Text(text) => {
                self.close_text(&mut out);
                let message_id = self.open_text(&mut out);
                out.push(text_content(&message_id, &text));
                self.close_text(&mut out);
            }
            AgentEvent::ToolCall {
                id,
                name,
                arguments,
            } => {
                let parent = self.open_message.clone();
                self.close_text(&mut out);
                let mut start = json!({ "toolCallId": id, "toolCallName": name });
                if let Some(parent) = parent {
                    start["parentMessageId"] = Value::String(parent);
                }
                out.push(event("TOOL_CALL_START", start));
                out.push(event(
                    "TOOL_CALL_ARGS",
                    json!({ "toolCallId": id, "delta": arguments }),
                ));
                out.push(event("TOOL_CALL_END", json!({ "toolCallId": id })));
            }
            AgentEvent::ToolResult {
                id,
                content,
                is_error,
                ..
            } => {
                self.close_text(&mut out);
                let mut result = json!({
                    "messageId": uuid::Uuid::new_v4().to_string(),
                    "toolCallId": id,
                    "content": content,
                    "role": "tool",
                });
                if is_error {
                    result["isError"] = Value::Bool(true);
                }
                out.push(event("TOOL_CALL_RESULT", result));
            }
            AgentEvent::AgentTransfer { from, to } => {
                self.close_text(&mut out);
                out.push(event(
                    "CUSTOM",
                    json!({ "name": "agent_transfer", "value": { "from": from, "to": to } }),
                ));
            }
        }
        out
    }

    /// Successful end of the run: session state snapshot, then `RUN_FINISHED`.
    pub fn finish(&mut self, snapshot: Value) -> Vec<Value> {
        let mut out = Vec::new();
        self.close_text(&mut out);
        out.push(event("STATE_SNAPSHOT", json!({ "snapshot": snapshot })));
        out.push(event(
            "RUN_FINISHED",
            json!({ "threadId": self.thread_id, "runId": self.run_id }),
        ));
        out
    }

    pub fn error(&mut self, message: &str) -> Vec<Value> {
        let mut out = Vec::new();
        self.close_text(&mut out);
        out.push(event("RUN_ERROR", json!({ "message": message })));
        out
    }

    fn open_text(&mut self, out: &mut Vec<Value>) -> String {
        if let Some(ref id) = self.open_message {
            return id.clone();
        }
        let id = uuid::Uuid::new_v4().to_string();
        out.push(event(
            "TEXT_MESSAGE_START",
            json!({ "messageId": id, "role": "assistant" }),
        ));
        self.open_message = Some(id.clone());
        id
    }

    fn close_text(&mut self, out: &mut Vec<Value>) {
        if let Some(id) = self.open_message.take() {
            out.push(event("TEXT_MESSAGE_END", json!({ "messageId": id })));
        }
    }
}

fn text_content(message_id: &str, delta: &str) -> Value {
    event(
        "TEXT_MESSAGE_CONTENT",
        json!({ "messageId": message_id, "delta": delta }),
    )
}

fn event(kind: &str, body: Value) -> Value {
    let mut map = Map::new();
    map.insert("type".to_string(), Value::String(kind.to_string()));
    map.insert(
        "timestamp".to_string(),
        json!(chrono::Utc::now().timestamp_millis()),
    );
    if let Value::Object(fields) = body {
        map.extend(fields);
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(events: &[Value]) -> Vec<&str> {
        events.iter().map(|e| e["type"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_input_parses_camel_case_and_picks_last_user_message() {
        let input: RunAgentInput = serde_json::from_value(json!({
            "threadId": "thread_123",
            "runId": "run_456",
            "state": {"plant": "dairy"},
            "messages": [
                {"id": "msg_1", "role": "user", "content": "first"},
                {"id": "msg_2", "role": "assistant", "content": "answer"},
                {"id": "msg_3", "role": "user", "content": [{"type": "text", "text": "second"}]}
            ],
            "tools": [],
            "context": [],
            "forwardedProps": {}
        }))
        .unwrap();
        assert_eq!(input.thread_id.as_deref(), Some("thread_123"));
        assert_eq!(input.run_id.as_deref(), Some("run_456"));
        assert_eq!(input.last_user_message().as_deref(), Some("second"));
        assert_eq!(input.state_map().get("plant"), Some(&json!("dairy")));

        let empty: RunAgentInput = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.last_user_message(), None);
        assert!(empty.state_map().is_empty());
    }

    #[test]
    fn test_streamed_text_is_framed_once() {
        let mut enc = AgUiEncoder::new("t", "r");
        let mut events = vec![enc.run_started()];
        events.extend(enc.encode(AgentEvent::TextChunk("Hel".into())));
        events.extend(enc.encode(AgentEvent::TextChunk("lo".into())));
        events.extend(enc.finish(json!({})));
        assert_eq!(
            types(&events),
            vec![
                "RUN_STARTED",
                "TEXT_MESSAGE_START",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_END",
                "STATE_SNAPSHOT",
                "RUN_FINISHED"
            ]
        );
        assert_eq!(events[1]["messageId"], events[2]["messageId"]);
        assert_eq!(events[3]["delta"], "lo");
        assert_eq!(events[6]["threadId"], "t");
    }

    #[test]
    fn test_tool_call_closes_open_text_and_links_parent() {
        let mut enc = AgUiEncoder::new("t", "r");
        let mut events = enc.encode(AgentEvent::TextChunk("Let me check.".into()));
        events.extend(enc.encode(AgentEvent::ToolCall {
            id: "call_1".into(),
            name: "generate_sql_query".into(),
            arguments: "{\"question\":\"flow\"}".into(),
        }));
        events.extend(enc.encode(AgentEvent::ToolResult {
            id: "call_1".into(),
            name: "generate_sql_query".into(),
            content: "SELECT 1".into(),
            is_error: false,
        }));
        assert_eq!(
            types(&events),
            vec![
                "TEXT_MESSAGE_START",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_END",
                "TOOL_CALL_START",
                "TOOL_CALL_ARGS",
                "TOOL_CALL_END",
                "TOOL_CALL_RESULT"
            ]
        );
        assert_eq!(events[3]["parentMessageId"], events[0]["messageId"]);
        assert_eq!(events[3]["toolCallName"], "generate_sql_query");
        assert_eq!(events[4]["delta"], "{\"question\":\"flow\"}");
        assert_eq!(events[6]["content"], "SELECT 1");
        assert!(events[6].get("isError").is_none());
    }

    #[test]
    fn test_error_and_transfer_events() {
        let mut enc = AgUiEncoder::new("t", "r");
        let transfer = enc.encode(AgentEvent::AgentTransfer {
            from: "root_agent".into(),
            to: "data_agent".into(),
        });
        assert_eq!(transfer[0]["type"], "CUSTOM");
        assert_eq!(transfer[0]["value"]["to"], "data_agent");

        let mut events = enc.encode(AgentEvent::Text("partial".into()));
        events.extend(enc.error("LLM API error (500)"));
        assert_eq!(
            types(&events),
            vec![
                "TEXT_MESSAGE_START",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_END",
                "RUN_ERROR"
            ]
        );
        assert_eq!(events[3]["message"], "LLM API error (500)");
    }
}
