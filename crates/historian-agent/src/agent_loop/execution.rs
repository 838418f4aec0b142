//! Tool-call batch processing: tool dispatch, agent transfer, failure tracking.

use serde::Deserialize;

use super::super::agents::{find_agent, AgentSpec, TRANSFER_TOOL};
use super::super::tools::{process_tool_result_content, ToolContext, ToolRegistry};
use super::super::types::*;

/// Counters accumulated across loop iterations.
pub(super) struct ExecutionState {
    pub total_tool_calls: usize,
    pub failed_tool_calls: usize,
    pub consecutive_failures: usize,
    pub context_overflow_retries: usize,
    pub iterations: usize,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self {
            total_tool_calls: 0,
            failed_tool_calls: 0,
            consecutive_failures: 0,
            context_overflow_retries: 0,
            iterations: 0,
        }
    }
}

/// What the caller should do after a batch.
pub(super) struct ToolBatchOutcome {
    /// Consecutive-failure limit reached; caller should stop.
    pub failure_limit_reached: bool,
    /// Active agent changed; caller must rebuild prompt and tools.
    pub transferred: bool,
}

#[derive(Deserialize)]
struct TransferArgs {
    agent_name: String,
}

/// Switch `active` to the requested agent when it is a valid target.
fn handle_transfer(
    arguments: &str,
    active: &mut &'static AgentSpec,
    event_sink: &mut dyn EventSink,
) -> ToolResult {
    let target = match serde_json::from_str::<TransferArgs>(arguments) {
        Ok(args) => args.agent_name,
        Err(e) => {
            return ToolResult::error(TRANSFER_TOOL, format!("Invalid arguments JSON: {}", e));
        }
    };
    let next = match find_agent(&target) {
        Some(next) if active.can_transfer_to(&target) => next,
        _ => {
            return ToolResult::error(
                TRANSFER_TOOL,
                format!(
                    "Cannot transfer to '{}'. Available agents: {}",
                    target,
                    active.transfer_targets().join(", ")
                ),
            );
        }
    };
    tracing::info!(from = active.name, to = next.name, "Agent transfer");
    event_sink.on_agent_transfer(active.name, next.name);
    *active = next;
    ToolResult::ok(TRANSFER_TOOL, format!("Transferred to {}", next.name))
}

/// Execute one assistant turn's tool calls in order.
///
/// Tool calls after a transfer in the same batch run against the new agent's
/// tool set; calls to tools the active agent does not own fail.
#[allow(clippy::too_many_arguments)]
pub(super) async fn execute_tool_batch(
    tool_calls: &[ToolCall],
    registry: &ToolRegistry,
    active: &mut &'static AgentSpec,
    ctx: &mut ToolContext<'_>,
    event_sink: &mut dyn EventSink,
    messages: &mut Vec<ChatMessage>,
    state: &mut ExecutionState,
    config: &AgentConfig,
) -> ToolBatchOutcome {
    let mut transferred = false;

    for tc in tool_calls {
        let tool_name = tc.function.name.as_str();
        let arguments = tc.function.arguments.as_str();
        event_sink.on_tool_call(&tc.id, tool_name, arguments);

        let mut result = if tool_name == TRANSFER_TOOL {
            let before = active.name;
            let r = handle_transfer(arguments, active, event_sink);
            transferred |= active.name != before;
            r
        } else if !active.tools.contains(&tool_name) {
            ToolResult::error(
                tool_name,
                format!("Tool '{}' is not available to {}", tool_name, active.name),
            )
        } else {
            registry.execute(tool_name, arguments, ctx).await
        };
        result.tool_call_id = tc.id.clone();
        result.content = process_tool_result_content(&result.content, config.tool_result_max_chars);

        if result.is_error {
            state.failed_tool_calls += 1;
            state.consecutive_failures += 1;
            tracing::warn!(tool = tool_name, "Tool call failed");
        } else {
            state.consecutive_failures = 0;
        }

        event_sink.on_tool_result(&tc.id, tool_name, &result.content, result.is_error);
        messages.push(ChatMessage::tool_result(&result.tool_call_id, &result.content));
        state.total_tool_calls += 1;
    }

    let failure_limit_reached = config
        .max_consecutive_failures
        .is_some_and(|limit| state.consecutive_failures >= limit);
    ToolBatchOutcome {
        failure_limit_reached,
        transferred,
    }
}
