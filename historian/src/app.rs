//! Wires configuration into the runner and its backends.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use historian_agent::llm::{LlmClient, LlmCompletion};
use historian_agent::{AgentConfig, Runner, Services, SessionStore};
use historian_artifact::{
    ArtifactStore, InMemoryArtifactStore, LocalArtifactStore, PgArtifactStore,
};
use historian_core::config::{
    ArtifactBackend, ArtifactConfig, DatabaseConfig, KnowledgeConfig, ServerConfig,
};
use historian_data::{HistorianRepository, KnowledgeBase, PgHistorian, SqlGenerator};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

pub struct App {
    pub runner: Arc<Runner>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub server: ServerConfig,
    pub model: String,
}

/// Historian repository with a lazy pool; the first query opens a connection.
pub fn historian(db: &DatabaseConfig) -> Result<Arc<PgHistorian>> {
    let repo = PgHistorian::connect_lazy(db)
        .with_context(|| format!("Invalid database settings ({})", db.redacted_url()))?;
    Ok(Arc::new(repo))
}

pub async fn artifact_store(cfg: &ArtifactConfig, db: &DatabaseConfig) -> Result<Arc<dyn ArtifactStore>> {
    let store: Arc<dyn ArtifactStore> = match cfg.backend {
        ArtifactBackend::Memory => Arc::new(InMemoryArtifactStore::new()),
        ArtifactBackend::Local => {
            tracing::info!("Artifacts stored under {}", cfg.dir.display());
            Arc::new(LocalArtifactStore::new(cfg.dir.clone()))
        }
        ArtifactBackend::Postgres => {
            let store = PgArtifactStore::connect(&db.connection_url(), db.max_connections)
                .await
                .context("Failed to connect the artifact store")?;
            store.ensure_schema().await?;
            Arc::new(store)
        }
    };
    Ok(store)
}

impl App {
    /// Build everything the agent commands need from the environment.
    pub async fn from_env() -> Result<Self> {
        let config = AgentConfig::from_env();
        if config.api_key.trim().is_empty() {
            anyhow::bail!(
                "No LLM API key configured. Set HISTORIAN_API_KEY (or OPENAI_API_KEY) in the environment or .env"
            );
        }
        let server = ServerConfig::from_env();
        let db = DatabaseConfig::from_env();
        let knowledge_cfg = KnowledgeConfig::from_env();

        let historian: Arc<dyn HistorianRepository> = historian(&db)?;
        let knowledge = Arc::new(KnowledgeBase::from_config(&knowledge_cfg));

        let client = Arc::new(
            LlmClient::new(&config.api_base, &config.api_key)?.with_max_tokens(config.max_tokens),
        );
        let completion = Arc::new(LlmCompletion::new(
            client.clone(),
            &config.model,
            config.temperature,
        ));
        let generator = SqlGenerator::new(completion, knowledge)
            .with_examples_per_prompt(knowledge_cfg.examples_per_prompt)
            .with_historian(historian.clone());

        let artifacts = artifact_store(&ArtifactConfig::from_env(), &db).await?;
        let services = Arc::new(Services::new(historian, Arc::new(generator), artifacts.clone()));

        let sessions = Arc::new(SessionStore::new(Duration::from_secs(server.session_timeout_secs)));
        sessions.spawn_purge_task(PURGE_INTERVAL);

        let model = config.model.clone();
        let runner = Runner::new(config, client, services, &server.app_name, sessions);
        tracing::info!(app = %server.app_name, model = %model, "Historian assistant ready");

        Ok(Self {
            runner: Arc::new(runner),
            artifacts,
            server,
            model,
        })
    }
}
