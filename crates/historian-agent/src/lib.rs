//! Historian agents: an LLM tool-calling loop over the historian data layer.
//!
//! - [`agents`]: root agent and the data, visualization and reporting sub-agents
//! - [`agent_loop`]: LLM ↔ tool cycle with agent transfer and overflow recovery
//! - [`tools`]: tool registry and implementations
//! - [`tracker`]: per-session conversation steps (SQL → rows → plot spec → chart)
//! - [`session`]: in-memory sessions, [`runner`]: one turn in one session
//! - [`llm`]: OpenAI-compatible client, [`chat`]: terminal REPL

pub mod agent_loop;
pub mod agents;
pub mod chat;
pub mod llm;
pub mod runner;
pub mod session;
pub mod tools;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod test_support;

pub use runner::Runner;
pub use session::{SessionKey, SessionState, SessionStore};
pub use tools::{Services, ToolRegistry};
pub use types::{AgentConfig, AgentEvent, AgentResult, ChannelEventSink, EventSink};
