//! Shared helpers for the agent loop.

use super::super::types::*;

const NO_TEXT_RESPONSE: &str = "[Agent completed without text response]";

/// Final answer is the last non-empty assistant text at or after
/// `turn_start`, so an earlier turn's answer is never repeated. System
/// messages are dropped from the returned history.
pub(super) fn build_agent_result(
    messages: Vec<ChatMessage>,
    turn_start: usize,
    agent: &str,
    tool_calls_count: usize,
    iterations: usize,
) -> AgentResult {
    let response = messages
        .get(turn_start..)
        .unwrap_or_default()
        .iter()
        .rev()
        .filter(|m| m.role == "assistant")
        .find_map(|m| m.content.as_deref().filter(|c| !c.trim().is_empty()))
        .unwrap_or(NO_TEXT_RESPONSE)
        .to_string();

    AgentResult {
        response,
        agent: agent.to_string(),
        messages: messages.into_iter().filter(|m| m.role != "system").collect(),
        tool_calls_count,
        iterations,
    }
}

/// Replace the leading system prompt, or insert one.
pub(super) fn set_system_prompt(messages: &mut Vec<ChatMessage>, prompt: &str) {
    match messages.first_mut() {
        Some(first) if first.role == "system" => *first = ChatMessage::system(prompt),
        _ => messages.insert(0, ChatMessage::system(prompt)),
    }
}
