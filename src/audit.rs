//! Audit journal for credential and connection events
//!
//! Writes JSON lines to `audit.log` in the state directory. Enabled unless
//! `general.audit_log = false`.

use crate::config::Config;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Journaled event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    SignIn,
    SignUp,
    SignOut,
    RetriesExhausted,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SignIn => "auth.sign_in",
            Self::SignUp => "auth.sign_up",
            Self::SignOut => "auth.sign_out",
            Self::RetriesExhausted => "connection.retries_exhausted",
        }
    }
}

/// Append-only journal of [`AuditEvent`]s
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: config.state().audit_log(),
        }
    }

    /// Journal at an explicit path
    pub fn with_path(path: PathBuf, enabled: bool) -> Self {
        Self { enabled, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event. IO failures are logged and otherwise ignored.
    pub async fn record(&self, event: AuditEvent, data: serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event.as_str(),
            "data": data,
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
