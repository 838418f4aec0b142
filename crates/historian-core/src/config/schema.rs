//! Configuration structs grouped by concern, loaded from the environment.

use std::path::PathBuf;

use super::env_keys::{artifacts, database, knowledge, llm, observability as obv_keys, server};
use super::loader::{env_bool, env_optional, env_or, env_parse, load_dotenv};

/// LLM API configuration (OpenAI-compatible endpoint).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    /// Model for the agents and SQL generation.
    pub model: String,
    /// Model for short completions (SQL explanations). Defaults to `model`.
    pub simple_model: String,
    pub max_tokens: usize,
    pub temperature: Option<f64>,
}

impl LlmConfig {
    /// Load from env (reads `.env` first). Blank values use defaults.
    pub fn from_env() -> Self {
        load_dotenv();
        let api_base = env_or(llm::API_BASE, llm::API_BASE_ALIASES, || {
            "https://api.openai.com/v1".to_string()
        });
        let model = env_or(llm::MODEL, llm::MODEL_ALIASES, || {
            Self::default_model_for_base(&api_base).to_string()
        });
        let simple_model = env_or(llm::SIMPLE_MODEL, llm::SIMPLE_MODEL_ALIASES, || model.clone());
        Self {
            api_key: env_or(llm::API_KEY, llm::API_KEY_ALIASES, String::new),
            max_tokens: env_parse(llm::MAX_TOKENS, &[], 4096usize),
            temperature: env_optional(llm::TEMPERATURE, &[]).and_then(|t| t.parse().ok()),
            api_base,
            model,
            simple_model,
        }
    }

    /// `None` when the key or base URL is blank.
    pub fn try_from_env() -> Option<Self> {
        let cfg = Self::from_env();
        if cfg.api_key.trim().is_empty() || cfg.api_base.trim().is_empty() {
            None
        } else {
            Some(cfg)
        }
    }

    /// Default model when none is configured, inferred from the API base.
    pub fn default_model_for_base(api_base: &str) -> &'static str {
        if api_base.contains("generativelanguage.googleapis.com") {
            "gemini-2.5-flash"
        } else if api_base.contains("localhost:11434") || api_base.contains("127.0.0.1:11434") {
            "qwen2.5:7b"
        } else if api_base.contains("api.deepseek.com") {
            "deepseek-chat"
        } else {
            "gpt-4o"
        }
    }
}

/// Historian (Postgres) connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Full URL; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            url: env_optional(database::URL, database::URL_ALIASES),
            host: env_or(database::HOST, database::HOST_ALIASES, || "localhost".to_string()),
            port: env_parse(database::PORT, database::PORT_ALIASES, 5432u16),
            dbname: env_or(database::NAME, database::NAME_ALIASES, || "historian".to_string()),
            user: env_or(database::USER, database::USER_ALIASES, || "postgres".to_string()),
            password: env_or(database::PASSWORD, database::PASSWORD_ALIASES, String::new),
            max_connections: env_parse(database::MAX_CONNECTIONS, &[], 5u32),
        }
    }

    /// Postgres connection URL.
    pub fn connection_url(&self) -> String {
        if let Some(ref url) = self.url {
            return url.clone();
        }
        let auth = if self.password.is_empty() {
            self.user.clone()
        } else {
            format!("{}:{}", self.user, self.password)
        };
        format!("postgres://{}@{}:{}/{}", auth, self.host, self.port, self.dbname)
    }

    /// URL with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        let url = self.connection_url();
        match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                let creds = &url[scheme_end + 3..at];
                let user = creds.split(':').next().unwrap_or("");
                format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..])
            }
            _ => url,
        }
    }
}

/// Where artifacts (charts, reports) are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactBackend {
    Memory,
    Local,
    Postgres,
}

impl ArtifactBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "in_memory" => Some(Self::Memory),
            "local" | "fs" | "file" => Some(Self::Local),
            "postgres" | "postgresql" | "pg" => Some(Self::Postgres),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub backend: ArtifactBackend,
    pub dir: PathBuf,
}

impl ArtifactConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        let backend = match env_optional(artifacts::BACKEND, &[]) {
            Some(raw) => ArtifactBackend::parse(&raw).unwrap_or_else(|| {
                tracing::warn!(value = %raw, "Unknown artifact backend, using local");
                ArtifactBackend::Local
            }),
            None => ArtifactBackend::Local,
        };
        let dir = env_optional(artifacts::DIR, &[])
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".historian")
                    .join("artifacts")
            });
        Self { backend, dir }
    }
}

/// Text-to-SQL knowledge (training data) settings.
#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    pub training_dir: Option<PathBuf>,
    /// Similar question/SQL pairs included in each prompt.
    pub examples_per_prompt: usize,
}

impl KnowledgeConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            training_dir: env_optional(knowledge::TRAINING_DIR, knowledge::TRAINING_DIR_ALIASES)
                .map(PathBuf::from),
            examples_per_prompt: env_parse(knowledge::EXAMPLES_PER_PROMPT, &[], 5usize),
        }
    }
}

/// HTTP server and session settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub app_name: String,
    pub host: String,
    pub port: u16,
    pub session_timeout_secs: u64,
    /// User id for requests that do not carry one.
    pub default_user_id: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        load_dotenv();
        Self {
            app_name: env_or(server::APP_NAME, server::APP_NAME_ALIASES, || "historian".to_string()),
            host: env_or(server::HOST, &[], || "0.0.0.0".to_string()),
            port: env_parse(server::PORT, server::PORT_ALIASES, 8000u16),
            session_timeout_secs: env_parse(server::SESSION_TIMEOUT_SECS, &[], 3600u64),
            default_user_id: env_or(server::USER_ID, &[], || "demo_user".to_string()),
        }
    }
}

/// Observability: quiet, log_level, log_json, audit_log.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub quiet: bool,
    pub log_level: String,
    pub log_json: bool,
    pub audit_log: Option<String>,
}

impl ObservabilityConfig {
    pub fn from_env() -> &'static Self {
        use std::sync::OnceLock;
        static CACHE: OnceLock<ObservabilityConfig> = OnceLock::new();
        CACHE.get_or_init(|| {
            load_dotenv();
            Self {
                quiet: env_bool(obv_keys::QUIET, &[], false),
                log_level: env_or(obv_keys::LOG_LEVEL, &[], || "historian=info".to_string()),
                log_json: env_bool(obv_keys::LOG_JSON, &[], false),
                audit_log: env_optional(obv_keys::AUDIT_LOG, &[]),
            }
        })
    }
}
