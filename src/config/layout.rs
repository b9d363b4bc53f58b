//! On-disk state layout
//!
//! ```text
//! <state root>/
//!   audit.log
//!   tokens/session-<hash>.json
//! ```
//!
//! The root is `general.state_dir` when set, else the platform state
//! directory joined with `mynofi`.

use crate::error::{MynofiError, MynofiResult};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Resolved locations of everything Mynofi writes besides its config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    root: PathBuf,
}

impl StateLayout {
    /// Platform default: `$XDG_STATE_HOME/mynofi`, falling back to local data
    pub fn platform() -> Self {
        let base = dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::at(base.join("mynofi"))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tokens_dir(&self) -> PathBuf {
        self.root.join("tokens")
    }

    pub fn audit_log(&self) -> PathBuf {
        self.root.join("audit.log")
    }

    /// Create the root and a tokens directory only the owner can enter
    pub async fn ensure(&self) -> MynofiResult<()> {
        let tokens = self.tokens_dir();
        fs::create_dir_all(&tokens).await.map_err(|e| {
            MynofiError::io(format!("creating directory {}", tokens.display()), e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tokens, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(|e| MynofiError::io("setting tokens dir permissions", e))?;
        }

        Ok(())
    }
}
