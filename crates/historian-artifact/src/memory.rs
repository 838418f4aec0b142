use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{key_from_path, validate_target, Artifact, ArtifactScope, ArtifactStore, Result};

/// Process-local store. Versions are kept as a Vec indexed by version number.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    entries: RwLock<HashMap<String, Vec<Artifact>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save(&self, scope: &ArtifactScope, filename: &str, artifact: Artifact) -> Result<u32> {
        validate_target(scope, filename)?;
        let path = scope.path_for(filename);
        let mut entries = self.entries.write().await;
        let versions = entries.entry(path.clone()).or_default();
        let version = versions.len() as u32;
        historian_core::observability::audit_artifact_saved(&path, version, &artifact.mime_type);
        versions.push(artifact);
        Ok(version)
    }

    async fn load(
        &self,
        scope: &ArtifactScope,
        filename: &str,
        version: Option<u32>,
    ) -> Result<Option<Artifact>> {
        validate_target(scope, filename)?;
        let entries = self.entries.read().await;
        let Some(versions) = entries.get(&scope.path_for(filename)) else {
            return Ok(None);
        };
        Ok(match version {
            Some(v) => versions.get(v as usize).cloned(),
            None => versions.last().cloned(),
        })
    }

    async fn list_keys(&self, scope: &ArtifactScope) -> Result<Vec<String>> {
        scope.validate()?;
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, versions)| !versions.is_empty())
            .filter_map(|(path, _)| key_from_path(scope, path))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, scope: &ArtifactScope, filename: &str) -> Result<()> {
        validate_target(scope, filename)?;
        self.entries.write().await.remove(&scope.path_for(filename));
        Ok(())
    }

    async fn list_versions(&self, scope: &ArtifactScope, filename: &str) -> Result<Vec<u32>> {
        validate_target(scope, filename)?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(&scope.path_for(filename))
            .map(|v| (0..v.len() as u32).collect())
            .unwrap_or_default())
    }
}
