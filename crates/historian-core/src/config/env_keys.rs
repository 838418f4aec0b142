//! Environment variable keys and alias chains.
//!
//! Primary keys use the `HISTORIAN_*` prefix. Aliases keep the variable names
//! of the first deployment (`API_KEY`, `COMPLEX_GEMINI_MODEL`, `HOST`, ...)
//! working.

/// LLM API
pub mod llm {
    pub const API_BASE: &str = "HISTORIAN_API_BASE";
    pub const API_BASE_ALIASES: &[&str] = &["OPENAI_API_BASE", "OPENAI_BASE_URL", "BASE_URL"];

    pub const API_KEY: &str = "HISTORIAN_API_KEY";
    pub const API_KEY_ALIASES: &[&str] = &["OPENAI_API_KEY", "API_KEY"];

    /// Model used by the agents (tool calling, SQL generation).
    pub const MODEL: &str = "HISTORIAN_MODEL";
    pub const MODEL_ALIASES: &[&str] = &["COMPLEX_MODEL", "COMPLEX_GEMINI_MODEL", "OPENAI_MODEL", "MODEL"];

    /// Cheaper model for explanations and short completions.
    pub const SIMPLE_MODEL: &str = "HISTORIAN_SIMPLE_MODEL";
    pub const SIMPLE_MODEL_ALIASES: &[&str] = &["SIMPLE_MODEL", "SIMPLE_GEMINI_MODEL"];

    pub const MAX_TOKENS: &str = "HISTORIAN_MAX_TOKENS";
    pub const TEMPERATURE: &str = "HISTORIAN_TEMPERATURE";
}

/// Agent loop limits
pub mod agent {
    pub const MAX_ITERATIONS: &str = "HISTORIAN_MAX_ITERATIONS";
    /// Consecutive failing tool calls before the loop stops; 0 disables the limit.
    pub const MAX_CONSECUTIVE_FAILURES: &str = "HISTORIAN_MAX_CONSECUTIVE_FAILURES";
    pub const STREAM: &str = "HISTORIAN_STREAM";
    pub const TOOL_RESULT_MAX_CHARS: &str = "HISTORIAN_TOOL_RESULT_MAX_CHARS";
    pub const TOOL_RESULT_RECOVERY_MAX_CHARS: &str = "HISTORIAN_TOOL_RESULT_RECOVERY_MAX_CHARS";
}

/// Historian database connection
pub mod database {
    pub const URL: &str = "HISTORIAN_DATABASE_URL";
    pub const URL_ALIASES: &[&str] = &["DATABASE_URL"];

    pub const HOST: &str = "HISTORIAN_DB_HOST";
    pub const HOST_ALIASES: &[&str] = &["DB_HOST", "HOST"];

    pub const PORT: &str = "HISTORIAN_DB_PORT";
    pub const PORT_ALIASES: &[&str] = &["DB_PORT"];

    pub const NAME: &str = "HISTORIAN_DB_NAME";
    pub const NAME_ALIASES: &[&str] = &["DBNAME", "DB_NAME"];

    pub const USER: &str = "HISTORIAN_DB_USER";
    pub const USER_ALIASES: &[&str] = &["DB_USER", "USER"];

    pub const PASSWORD: &str = "HISTORIAN_DB_PASSWORD";
    pub const PASSWORD_ALIASES: &[&str] = &["DB_PASSWORD", "PASSWORD"];

    pub const MAX_CONNECTIONS: &str = "HISTORIAN_DB_MAX_CONNECTIONS";
}

/// Artifact storage
pub mod artifacts {
    /// `memory`, `local` or `postgres`
    pub const BACKEND: &str = "HISTORIAN_ARTIFACT_BACKEND";
    pub const DIR: &str = "HISTORIAN_ARTIFACT_DIR";
}

/// Text-to-SQL training data
pub mod knowledge {
    pub const TRAINING_DIR: &str = "HISTORIAN_TRAINING_DIR";
    pub const TRAINING_DIR_ALIASES: &[&str] = &["TRAINING_DIR"];

    pub const EXAMPLES_PER_PROMPT: &str = "HISTORIAN_EXAMPLES_PER_PROMPT";
}

/// HTTP server and sessions
pub mod server {
    pub const APP_NAME: &str = "HISTORIAN_APP_NAME";
    pub const APP_NAME_ALIASES: &[&str] = &["APP_NAME"];

    pub const HOST: &str = "HISTORIAN_HOST";

    pub const PORT: &str = "HISTORIAN_PORT";
    pub const PORT_ALIASES: &[&str] = &["PORT"];

    pub const SESSION_TIMEOUT_SECS: &str = "HISTORIAN_SESSION_TIMEOUT_SECS";

    pub const USER_ID: &str = "HISTORIAN_USER_ID";
}

/// Observability and logging
pub mod observability {
    pub const QUIET: &str = "HISTORIAN_QUIET";
    pub const LOG_LEVEL: &str = "HISTORIAN_LOG_LEVEL";
    pub const LOG_JSON: &str = "HISTORIAN_LOG_JSON";
    pub const AUDIT_LOG: &str = "HISTORIAN_AUDIT_LOG";
}
