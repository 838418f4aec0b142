//! Unified configuration layer.
//!
//! All environment reads go through this module; business code uses the
//! structured configs instead of calling `std::env::var`.
//!
//! - `loader`: env_or, env_optional, env_bool, env_parse and `.env` loading
//! - `schema`: LlmConfig, DatabaseConfig, ArtifactConfig, KnowledgeConfig,
//!   ServerConfig, ObservabilityConfig
//! - `env_keys`: key constants and the alias chains kept for older deployments

pub mod env_keys;
pub mod loader;
pub mod schema;

pub use loader::{
    env_bool, env_optional, env_or, env_parse, load_dotenv, load_dotenv_from_dir,
    remove_env_var, set_env_var, ScopedEnvGuard,
};
pub use schema::{
    ArtifactBackend, ArtifactConfig, DatabaseConfig, KnowledgeConfig, LlmConfig,
    ObservabilityConfig, ServerConfig,
};
