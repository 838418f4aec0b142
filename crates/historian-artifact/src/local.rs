//! Directory-backed store.
//!
//! Layout: `{root}/{app}/{user}/{session|user}/{encoded filename}/{N}.data`
//! with the MIME type alongside in `{N}.mime`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    has_user_namespace, validate_target, Artifact, ArtifactError, ArtifactScope, ArtifactStore,
    Result, USER_NAMESPACE_DIR,
};

const DEFAULT_MIME: &str = "application/octet-stream";

pub struct LocalArtifactStore {
    root: PathBuf,
    // Serializes version allocation.
    write_lock: Mutex<()>,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, scope: &ArtifactScope, user_namespace: bool) -> PathBuf {
        let ns = if user_namespace {
            USER_NAMESPACE_DIR
        } else {
            scope.session_id.as_str()
        };
        self.root.join(&scope.app_name).join(&scope.user_id).join(ns)
    }

    fn artifact_dir(&self, scope: &ArtifactScope, filename: &str) -> PathBuf {
        self.namespace_dir(scope, has_user_namespace(filename))
            .join(urlencoding::encode(filename).as_ref())
    }
}

/// Version numbers present in an artifact directory, ascending.
async fn versions_in(dir: &Path) -> Result<Vec<u32>> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut versions = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(v) = name.strip_suffix(".data").and_then(|n| n.parse::<u32>().ok()) {
            versions.push(v);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}

async fn keys_in(dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let mut rd = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = rd.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        if versions_in(&entry.path()).await?.is_empty() {
            continue;
        }
        let encoded = entry.file_name().to_string_lossy().into_owned();
        match urlencoding::decode(&encoded) {
            Ok(name) => out.push(name.into_owned()),
            Err(e) => tracing::warn!("Skipping undecodable artifact dir {}: {}", encoded, e),
        }
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn save(&self, scope: &ArtifactScope, filename: &str, artifact: Artifact) -> Result<u32> {
        validate_target(scope, filename)?;
        let _guard = self.write_lock.lock().await;
        let dir = self.artifact_dir(scope, filename);
        tokio::fs::create_dir_all(&dir).await?;
        let version = versions_in(&dir).await?.last().map_or(0, |v| v + 1);
        tokio::fs::write(dir.join(format!("{version}.data")), &artifact.data).await?;
        tokio::fs::write(dir.join(format!("{version}.mime")), artifact.mime_type.as_bytes()).await?;
        historian_core::observability::audit_artifact_saved(
            &scope.path_for(filename),
            version,
            &artifact.mime_type,
        );
        tracing::debug!(path = %dir.display(), version, "artifact saved");
        Ok(version)
    }

    async fn load(
        &self,
        scope: &ArtifactScope,
        filename: &str,
        version: Option<u32>,
    ) -> Result<Option<Artifact>> {
        validate_target(scope, filename)?;
        let dir = self.artifact_dir(scope, filename);
        let version = match version {
            Some(v) => v,
            None => match versions_in(&dir).await?.last() {
                Some(v) => *v,
                None => return Ok(None),
            },
        };
        let data = match tokio::fs::read(dir.join(format!("{version}.data"))).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mime_type = match tokio::fs::read_to_string(dir.join(format!("{version}.mime"))).await {
            Ok(m) => m.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => DEFAULT_MIME.to_string(),
            Err(e) => {
                return Err(ArtifactError::Corrupt {
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        Ok(Some(Artifact { mime_type, data }))
    }

    async fn list_keys(&self, scope: &ArtifactScope) -> Result<Vec<String>> {
        scope.validate()?;
        let mut keys = Vec::new();
        keys_in(&self.namespace_dir(scope, false), &mut keys).await?;
        keys_in(&self.namespace_dir(scope, true), &mut keys).await?;
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn delete(&self, scope: &ArtifactScope, filename: &str) -> Result<()> {
        validate_target(scope, filename)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_dir_all(self.artifact_dir(scope, filename)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_versions(&self, scope: &ArtifactScope, filename: &str) -> Result<Vec<u32>> {
        validate_target(scope, filename)?;
        versions_in(&self.artifact_dir(scope, filename)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        crate::contract::exercise(&LocalArtifactStore::new(dir.path())).await;
    }

    #[tokio::test]
    async fn test_local_layout_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let scope = ArtifactScope::new("historian", "demo_user", "s1");
        store
            .save(&scope, "user:notes.md", Artifact::markdown("hi"))
            .await
            .unwrap();
        let expected = dir
            .path()
            .join("historian/demo_user/user/user%3Anotes.md/0.data");
        assert!(expected.exists(), "missing {}", expected.display());
    }

    #[tokio::test]
    async fn test_missing_mime_defaults_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let scope = ArtifactScope::new("a", "u", "s");
        store.save(&scope, "blob.bin", Artifact::new("image/png", vec![1, 2])).await.unwrap();
        std::fs::remove_file(dir.path().join("a/u/s/blob.bin/0.mime")).unwrap();
        let loaded = store.load(&scope, "blob.bin", None).await.unwrap().unwrap();
        assert_eq!(loaded.mime_type, DEFAULT_MIME);
        assert_eq!(loaded.data, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_scope_cannot_escape_root() {
        let root = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(root.path().join("store"));

        let absolute = outside.path().to_string_lossy().into_owned();
        for session in [absolute.as_str(), "..", "../../x"] {
            let scope = ArtifactScope::new("historian", "demo_user", session);
            let err = store
                .save(&scope, "chart.html", Artifact::html("x"))
                .await
                .unwrap_err();
            assert!(matches!(err, ArtifactError::InvalidScope(_)), "{session}: {err}");
        }
        assert_eq!(std::fs::read_dir(outside.path()).unwrap().count(), 0);
        assert!(!root.path().join("store").exists());
    }

    #[tokio::test]
    async fn test_session_named_user_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let shared = ArtifactScope::new("historian", "demo_user", "s1");
        store
            .save(&shared, "user:notes.md", Artifact::markdown("mine"))
            .await
            .unwrap();

        let shadow = ArtifactScope::new("historian", "demo_user", "user");
        assert!(matches!(
            store.load(&shadow, "notes.md", None).await,
            Err(ArtifactError::InvalidScope(_))
        ));
        assert!(matches!(
            store.save(&shadow, "notes.md", Artifact::markdown("x")).await,
            Err(ArtifactError::InvalidScope(_))
        ));
        assert_eq!(store.list_keys(&shared).await.unwrap(), vec!["user:notes.md"]);
    }
}
