//! Versioned artifact storage for charts and reports.
//!
//! Artifacts are addressed by an [`ArtifactScope`] (app, user, session) and a
//! filename. Filenames prefixed with `user:` live in the user namespace and are
//! visible from every session of that user. Each save appends a new version;
//! versions start at 0.
//!
//! Backends:
//! - [`InMemoryArtifactStore`]: process-local, for tests and `memory` mode
//! - [`LocalArtifactStore`] (feature `local`): one directory per artifact
//! - [`PgArtifactStore`] (feature `postgres`): `artifacts_table` in Postgres
//!
//! Feature `server` adds [`server::router`] for serving artifacts over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

mod memory;
pub use memory::InMemoryArtifactStore;

#[cfg(feature = "local")]
mod local;
#[cfg(feature = "local")]
pub use local::LocalArtifactStore;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "postgres")]
pub use postgres::PgArtifactStore;

#[cfg(feature = "server")]
pub mod server;

/// Prefix marking a user-namespaced filename.
pub const USER_NAMESPACE_PREFIX: &str = "user:";

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Invalid artifact filename '{0}'")]
    InvalidFilename(String),

    #[error("Invalid artifact scope: {0}")]
    InvalidScope(String),

    #[error("Artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "postgres")]
    #[error("Artifact database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt artifact metadata at {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ArtifactError>;

/// Owner of a set of artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactScope {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl ArtifactScope {
    pub fn new(app_name: &str, user_id: &str, session_id: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        }
    }

    /// Storage path for `filename`:
    /// `app/user/session/filename`, or `app/user/user/filename` for `user:` names.
    pub fn path_for(&self, filename: &str) -> String {
        if has_user_namespace(filename) {
            format!("{}{}", self.user_prefix(), filename)
        } else {
            format!("{}{}", self.session_prefix(), filename)
        }
    }

    pub fn session_prefix(&self) -> String {
        format!("{}/{}/{}/", self.app_name, self.user_id, self.session_id)
    }

    pub fn user_prefix(&self) -> String {
        format!("{}/{}/{}/", self.app_name, self.user_id, USER_NAMESPACE_DIR)
    }

    /// Every component must be a single plain path segment, and the session
    /// id must not shadow the shared `user` namespace.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("app_name", &self.app_name),
            ("user_id", &self.user_id),
            ("session_id", &self.session_id),
        ] {
            if !is_plain_segment(value) {
                return Err(ArtifactError::InvalidScope(format!("{} '{}'", field, value)));
            }
        }
        if self.session_id == USER_NAMESPACE_DIR {
            return Err(ArtifactError::InvalidScope(format!(
                "session_id '{}' is reserved",
                self.session_id
            )));
        }
        Ok(())
    }
}

/// Directory holding user-namespaced artifacts, next to the session directories.
pub const USER_NAMESPACE_DIR: &str = "user";

fn is_plain_segment(value: &str) -> bool {
    !value.trim().is_empty()
        && value != "."
        && !value.contains("..")
        && !value
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0') || c.is_control())
}

pub fn has_user_namespace(filename: &str) -> bool {
    filename.starts_with(USER_NAMESPACE_PREFIX)
}

/// Reject names that would escape their namespace.
pub fn validate_filename(filename: &str) -> Result<()> {
    let bare = filename.strip_prefix(USER_NAMESPACE_PREFIX).unwrap_or(filename);
    if bare.trim().is_empty()
        || bare.contains('/')
        || bare.contains('\\')
        || bare == "."
        || bare.contains("..")
    {
        return Err(ArtifactError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// Scope and filename checks shared by every backend.
pub(crate) fn validate_target(scope: &ArtifactScope, filename: &str) -> Result<()> {
    scope.validate()?;
    validate_filename(filename)
}

/// Artifact payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Artifact {
    pub fn new(mime_type: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: data.into(),
        }
    }

    pub fn html(content: &str) -> Self {
        Self::new("text/html", content.as_bytes())
    }

    pub fn markdown(content: &str) -> Self {
        Self::new("text/markdown", content.as_bytes())
    }

    /// Payload as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Versioned artifact store.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save a new version and return its number (0 for the first save).
    async fn save(&self, scope: &ArtifactScope, filename: &str, artifact: Artifact) -> Result<u32>;

    /// Load `version`, or the latest when `None`. Missing ⇒ `Ok(None)`.
    async fn load(
        &self,
        scope: &ArtifactScope,
        filename: &str,
        version: Option<u32>,
    ) -> Result<Option<Artifact>>;

    /// Filenames visible in this session (session and user namespaces), sorted.
    async fn list_keys(&self, scope: &ArtifactScope) -> Result<Vec<String>>;

    /// Delete every version of `filename`.
    async fn delete(&self, scope: &ArtifactScope, filename: &str) -> Result<()>;

    /// Versions of `filename`, ascending.
    async fn list_versions(&self, scope: &ArtifactScope, filename: &str) -> Result<Vec<u32>>;
}

/// Strip a namespace prefix from a stored path, for `list_keys` implementations.
pub(crate) fn key_from_path(scope: &ArtifactScope, path: &str) -> Option<String> {
    path.strip_prefix(&scope.session_prefix())
        .or_else(|| path.strip_prefix(&scope.user_prefix()))
        .map(String::from)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_session_and_user_namespace() {
        let scope = ArtifactScope::new("historian", "demo_user", "abc");
        assert_eq!(scope.path_for("chart.html"), "historian/demo_user/abc/chart.html");
        assert_eq!(
            scope.path_for("user:notes.md"),
            "historian/demo_user/user/user:notes.md"
        );
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("chart_1.html").is_ok());
        assert!(validate_filename("user:chart.html").is_ok());
        for bad in ["", "  ", "a/b.html", "..", "x\\y", "user:", "user:../x"] {
            assert!(validate_filename(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_scope_validation_rejects_escaping_components() {
        assert!(ArtifactScope::new("historian", "demo_user", "3f2a-uuid").validate().is_ok());
        for (app, user, session) in [
            ("historian", "demo_user", ""),
            ("historian", "demo_user", ".."),
            ("historian", "demo_user", "/tmp/elsewhere"),
            ("historian", "demo_user", "a/../../b"),
            ("historian", "demo_user", "c:\\temp"),
            ("historian", "demo_user", "user"),
            ("historian", "..", "s1"),
            ("/etc", "demo_user", "s1"),
        ] {
            assert!(
                matches!(
                    ArtifactScope::new(app, user, session).validate(),
                    Err(ArtifactError::InvalidScope(_))
                ),
                "{app:?}/{user:?}/{session:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_key_from_path() {
        let scope = ArtifactScope::new("app", "u", "s");
        assert_eq!(key_from_path(&scope, "app/u/s/a.html").as_deref(), Some("a.html"));
        assert_eq!(key_from_path(&scope, "app/u/user/user:b").as_deref(), Some("user:b"));
        assert_eq!(key_from_path(&scope, "app/u/other/c"), None);
    }
}
