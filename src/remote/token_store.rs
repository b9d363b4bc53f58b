//! Persisted session tokens
//!
//! One JSON file per service URL under the state directory, readable only by
//! the owner.

use crate::config::StateLayout;
use crate::error::{MynofiError, MynofiResult};
use crate::remote::types::Session;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;

/// File-backed store for the current session
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store keyed by the service URL inside the layout's tokens directory
    pub fn for_service(state: &StateLayout, url: &str) -> Self {
        Self {
            path: state.tokens_dir().join(Self::file_name(url)),
        }
    }

    /// Store at an explicit path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// `session-<first 12 hex chars of sha256(url)>.json`
    pub fn file_name(url: &str) -> String {
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        format!("session-{}.json", &digest[..12])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored session, if any
    pub async fn load(&self) -> MynofiResult<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            MynofiError::io(format!("reading session token {}", self.path.display()), e)
        })?;

        let session: Session = serde_json::from_str(&content)?;
        Ok(Some(session))
    }

    /// Save the session, replacing any previous one
    pub async fn save(&self, session: &Session) -> MynofiResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| MynofiError::io("creating tokens directory", e))?;
        }

        let content = serde_json::to_string_pretty(session)?;
        fs::write(&self.path, content)
            .await
            .map_err(|e| MynofiError::TokenPersist {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.path, perms).map_err(|e| MynofiError::TokenPersist {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Remove the stored session
    pub async fn clear(&self) -> MynofiResult<()> {
        if self.path.exists() {
            fs::remove_file(&self.path).await.map_err(|e| {
                MynofiError::io(format!("deleting session token {}", self.path.display()), e)
            })?;
        }
        Ok(())
    }
}
