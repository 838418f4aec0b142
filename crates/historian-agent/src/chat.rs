//! Terminal chat: interactive REPL and single-shot questions.

use anyhow::Result;

use crate::runner::Runner;
use crate::tracker::Conversation;
use crate::types::{safe_truncate, ChatMessage, TerminalEventSink};

/// Ask one question in a session and return the final answer.
pub async fn ask(
    runner: &Runner,
    user_id: &str,
    session_id: &str,
    question: &str,
    verbose: bool,
) -> Result<String> {
    let mut sink = TerminalEventSink::new(verbose);
    let result = runner.run(user_id, session_id, question, &mut sink).await?;
    Ok(result.response)
}

/// Format agent/API errors for display in the terminal.
fn format_chat_error(e: &anyhow::Error) -> String {
    let s = e.to_string();
    if let Some(json_start) = s.find('{') {
        let json_part = &s[json_start..];
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(json_part) {
            if let Some(msg) = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                let status = s
                    .strip_prefix("LLM API error (")
                    .and_then(|rest| rest.split(')').next())
                    .unwrap_or("API");
                return format!("{} error: {}", status, msg);
            }
        }
    }
    if s.len() > 200 {
        format!("{}…", safe_truncate(&s, 200))
    } else {
        s
    }
}

/// One line per user/assistant message; tool traffic is summarised.
pub fn format_history(messages: &[ChatMessage]) -> String {
    if messages.is_empty() {
        return "(no messages yet)".to_string();
    }
    let mut out = Vec::new();
    for m in messages {
        let line = match m.role.as_str() {
            "user" => format!("You> {}", m.content.as_deref().unwrap_or_default()),
            "assistant" => match (&m.tool_calls, m.content.as_deref()) {
                (Some(calls), _) if !calls.is_empty() => {
                    let names: Vec<&str> = calls.iter().map(|c| c.function.name.as_str()).collect();
                    format!("   🔧 {}", names.join(", "))
                }
                (_, Some(text)) => format!("AI> {}", text),
                _ => continue,
            },
            _ => continue,
        };
        out.push(line);
    }
    out.join("\n")
}

/// Conversation list, oldest first, with the step each one reached.
pub fn format_conversations(conversations: &[Conversation]) -> String {
    if conversations.is_empty() {
        return "(no conversations yet)".to_string();
    }
    conversations
        .iter()
        .map(|c| {
            let steps = &c.steps;
            let reached = if steps.figure_created.is_some() {
                "chart created"
            } else if steps.plot_code_generated.is_some() {
                "plot spec generated"
            } else if steps.sql_executed.is_some() {
                "SQL executed"
            } else if steps.sql_generated.is_some() {
                "SQL generated"
            } else {
                "started"
            };
            let artifact = c
                .artifact
                .as_deref()
                .map(|a| format!("  📎 {}", a))
                .unwrap_or_default();
            format!("[{}] {}  ({}: {}){}", c.id, c.question, c.timestamp, reached, artifact)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Interactive chat loop.
pub async fn run_interactive_chat(
    runner: &Runner,
    user_id: &str,
    session_id: &str,
    model: &str,
    verbose: bool,
) -> Result<()> {
    eprintln!("┌────────────────────────────────────────────────────────────");
    eprintln!("│  📈 Historian Chat  ·  model: {}", model);
    eprintln!("│  /new new session  ·  /history  ·  /conversations  ·  /exit");
    eprintln!("└────────────────────────────────────────────────────────────\n");

    let mut session_id = session_id.to_string();
    let mut sink = TerminalEventSink::new(verbose);
    let mut rl = rustyline::DefaultEditor::new()
        .map_err(|e| anyhow::anyhow!("Failed to create line editor: {}", e))?;

    loop {
        let readline = rl.readline("You> ");
        match readline {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(input);

                match input {
                    "/exit" | "/quit" | "/q" => {
                        eprintln!("👋 Bye!");
                        break;
                    }
                    "/new" => {
                        runner.sessions().remove(&runner.session_key(user_id, &session_id));
                        session_id = uuid::Uuid::new_v4().to_string();
                        eprintln!("🆕 New session {}", session_id);
                        continue;
                    }
                    "/history" => {
                        let session = runner.session(user_id, &session_id);
                        let session = session.lock().await;
                        eprintln!("{}\n", format_history(&session.history));
                        continue;
                    }
                    "/conversations" => {
                        let session = runner.session(user_id, &session_id);
                        let mut session = session.lock().await;
                        let conversations = session.tracker().conversations_by_time();
                        eprintln!("{}\n", format_conversations(&conversations));
                        continue;
                    }
                    _ => {}
                }

                eprintln!();
                match runner.run(user_id, &session_id, input, &mut sink).await {
                    Ok(_) => eprintln!(),
                    Err(e) => {
                        tracing::error!("Chat turn failed: {:#}", e);
                        eprintln!("❌ {}", format_chat_error(&e));
                        eprintln!();
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("\n^C");
                eprintln!("👋 Bye!");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                eprintln!("👋 Bye!");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    Ok(())
}
