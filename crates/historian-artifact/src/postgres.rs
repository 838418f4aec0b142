//! Postgres-backed store: one row per (path, version) in `artifacts_table`.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::{key_from_path, validate_target, Artifact, ArtifactScope, ArtifactStore, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS artifacts_table (
    path TEXT NOT NULL,
    version INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    data BYTEA NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (path, version)
)
"#;

pub struct PgArtifactStore {
    pool: PgPool,
}

impl PgArtifactStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and create `artifacts_table` if it does not exist.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for PgArtifactStore {
    async fn save(&self, scope: &ArtifactScope, filename: &str, artifact: Artifact) -> Result<u32> {
        validate_target(scope, filename)?;
        let path = scope.path_for(filename);
        let mut tx = self.pool.begin().await?;
        // Concurrent saves of one path must not allocate the same version.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&path)
            .execute(&mut *tx)
            .await?;
        let (next,): (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(version) + 1, 0) FROM artifacts_table WHERE path = $1",
        )
        .bind(&path)
        .fetch_one(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO artifacts_table (path, version, mime_type, data) VALUES ($1, $2, $3, $4)",
        )
        .bind(&path)
        .bind(next)
        .bind(&artifact.mime_type)
        .bind(&artifact.data)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let version = next as u32;
        historian_core::observability::audit_artifact_saved(&path, version, &artifact.mime_type);
        Ok(version)
    }

    async fn load(
        &self,
        scope: &ArtifactScope,
        filename: &str,
        version: Option<u32>,
    ) -> Result<Option<Artifact>> {
        validate_target(scope, filename)?;
        let path = scope.path_for(filename);
        let row: Option<(String, Vec<u8>)> = match version {
            Some(v) => {
                sqlx::query_as(
                    "SELECT mime_type, data FROM artifacts_table WHERE path = $1 AND version = $2",
                )
                .bind(&path)
                .bind(v as i32)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT mime_type, data FROM artifacts_table WHERE path = $1 \
                     ORDER BY version DESC LIMIT 1",
                )
                .bind(&path)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.map(|(mime_type, data)| Artifact { mime_type, data }))
    }

    async fn list_keys(&self, scope: &ArtifactScope) -> Result<Vec<String>> {
        scope.validate()?;
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT path FROM artifacts_table \
             WHERE left(path, length($1)) = $1 OR left(path, length($2)) = $2",
        )
        .bind(scope.session_prefix())
        .bind(scope.user_prefix())
        .fetch_all(&self.pool)
        .await?;
        let mut keys: Vec<String> = rows
            .into_iter()
            .filter_map(|(path,)| key_from_path(scope, &path))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, scope: &ArtifactScope, filename: &str) -> Result<()> {
        validate_target(scope, filename)?;
        sqlx::query("DELETE FROM artifacts_table WHERE path = $1")
            .bind(scope.path_for(filename))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_versions(&self, scope: &ArtifactScope, filename: &str) -> Result<Vec<u32>> {
        validate_target(scope, filename)?;
        let rows: Vec<(i32,)> = sqlx::query_as(
            "SELECT version FROM artifacts_table WHERE path = $1 ORDER BY version",
        )
        .bind(scope.path_for(filename))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v as u32).collect())
    }
}
