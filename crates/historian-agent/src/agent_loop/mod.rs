//! Core agent loop: LLM ↔ tool execution cycle.
//!
//! One loop serves the CLI and the HTTP server through the `EventSink` trait.
//! The active agent decides the system prompt and the tool set; a
//! `transfer_to_agent` call swaps both before the next LLM turn.
//!
//! Sub-modules:
//!   - `execution`: tool-call batch processing, transfers, failure tracking
//!   - `helpers`: result building, system prompt replacement

mod execution;
mod helpers;


use anyhow::Result;

use super::agents::{find_agent, root_agent, AgentSpec};
use super::llm::{self, LlmClient};
use super::tools::{ToolContext, ToolRegistry};
use super::types::*;

use execution::{execute_tool_batch, ExecutionState};
use helpers::{build_agent_result, set_system_prompt};

/// Maximum number of context overflow recovery retries before giving up.
const MAX_CONTEXT_OVERFLOW_RETRIES: usize = 3;

fn resolve_agent(name: &str) -> &'static AgentSpec {
    find_agent(name).unwrap_or_else(|| {
        let root = root_agent();
        tracing::warn!("Unknown agent '{}', starting at {}", name, root.name);
        root
    })
}

/// Run one user turn.
///
/// `history` is the prior conversation without system prompts. The returned
/// [`AgentResult`] carries the updated history and the agent that answered.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent_loop(
    config: &AgentConfig,
    client: &LlmClient,
    registry: &ToolRegistry,
    start_agent: &str,
    history: Vec<ChatMessage>,
    user_message: &str,
    ctx: &mut ToolContext<'_>,
    event_sink: &mut dyn EventSink,
) -> Result<AgentResult> {
    let mut active = resolve_agent(start_agent);
    let mut tools = active.tool_definitions(registry);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(&active.system_prompt()));
    messages.extend(history.into_iter().filter(|m| m.role != "system"));
    messages.push(ChatMessage::user(user_message));
    let turn_start = messages.len() - 1;

    let mut state = ExecutionState::new();
    event_sink.on_turn_start();

    loop {
        if state.iterations >= config.max_iterations {
            tracing::warn!("Agent loop reached max iterations ({})", config.max_iterations);
            break;
        }
        state.iterations += 1;

        let tools_ref = (!tools.is_empty()).then_some(tools.as_slice());

        // ── LLM call (with context-overflow recovery) ─────────────────────
        let call = if config.stream {
            client
                .chat_completion_stream(&config.model, &messages, tools_ref, config.temperature, event_sink)
                .await
        } else {
            client
                .chat_completion(&config.model, &messages, tools_ref, config.temperature)
                .await
        };
        let response = match call {
            Ok(resp) => {
                state.context_overflow_retries = 0;
                resp
            }
            Err(e) => {
                if llm::is_context_overflow_error(&e.to_string()) {
                    state.context_overflow_retries += 1;
                    if state.context_overflow_retries >= MAX_CONTEXT_OVERFLOW_RETRIES {
                        tracing::error!(
                            "Context overflow persists after {} retries, giving up",
                            MAX_CONTEXT_OVERFLOW_RETRIES
                        );
                        return Err(e);
                    }
                    let rc = config.tool_result_recovery_max_chars;
                    tracing::warn!(
                        "Context overflow (attempt {}/{}), truncating to {} chars",
                        state.context_overflow_retries,
                        MAX_CONTEXT_OVERFLOW_RETRIES,
                        rc
                    );
                    llm::truncate_tool_messages(&mut messages, rc);
                    continue;
                }
                return Err(e);
            }
        };

        let message = response.into_message()?;
        let content = message.content.filter(|c| !c.is_empty());
        let tool_calls = message.tool_calls.filter(|tc| !tc.is_empty());

        if let Some(ref text) = content {
            event_sink.on_text(text);
        }

        let Some(tool_calls) = tool_calls else {
            if let Some(ref text) = content {
                messages.push(ChatMessage::assistant(text));
            }
            break;
        };
        messages.push(ChatMessage::assistant_with_tool_calls(
            content.as_deref(),
            tool_calls.clone(),
        ));

        // ── Execution phase ───────────────────────────────────────────────
        let outcome = execute_tool_batch(
            &tool_calls,
            registry,
            &mut active,
            ctx,
            event_sink,
            &mut messages,
            &mut state,
            config,
        )
        .await;

        if outcome.transferred {
            set_system_prompt(&mut messages, &active.system_prompt());
            tools = active.tool_definitions(registry);
        }
        if outcome.failure_limit_reached {
            tracing::warn!("Stopping: {} consecutive tool failures", state.consecutive_failures);
            break;
        }
    }

    tracing::info!(
        agent = active.name,
        iterations = state.iterations,
        tool_calls = state.total_tool_calls,
        failed = state.failed_tool_calls,
        "Agent turn finished"
    );
    Ok(build_agent_result(
        messages,
        turn_start,
        active.name,
        state.total_tool_calls,
        state.iterations,
    ))
}
