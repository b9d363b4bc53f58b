//! Error types for Mynofi
//!
//! All modules use `MynofiResult<T>` as their return type. Failures reported
//! by the remote service are carried as [`ServiceError`], which is cheap to
//! clone so the lifecycle manager can keep the last one in its snapshot.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Mynofi operations
pub type MynofiResult<T> = Result<T, MynofiError>;

/// Classification of a remote service failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
    /// Credential or session operation failed
    Auth,
    /// Realtime connectivity failed
    Transport,
    /// Diagnostic round trip failed
    HealthCheck,
}

impl ServiceErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::HealthCheck => "health_check",
        }
    }
}

/// A failure reported by (or while talking to) the remote service
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{} error: {message}", kind.as_str())]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
    /// HTTP status when the failure came from a REST response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Auth, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Transport, message)
    }

    pub fn health_check(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::HealthCheck, message)
    }

    /// Attach the HTTP status that produced this error
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether this error concerns authentication.
    ///
    /// Auth-kind errors always match; other kinds match when their message
    /// mentions auth (e.g. a socket rejected with "authorization failed").
    pub fn is_auth_related(&self) -> bool {
        self.kind == ServiceErrorKind::Auth || self.message.to_lowercase().contains("auth")
    }
}

/// All errors that can occur in Mynofi
#[derive(Error, Debug)]
pub enum MynofiError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Service URL is not configured")]
    MissingServiceUrl,

    #[error("Service API key is not configured")]
    MissingApiKey,

    #[error("Invalid service URL {url}: {reason}")]
    InvalidServiceUrl { url: String, reason: String },

    // Remote service errors
    #[error(transparent)]
    Service(#[from] ServiceError),

    // Lifecycle errors
    #[error("Connection manager is not running")]
    ManagerStopped,

    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    // Token store errors
    #[error("Failed to persist session token at {path}: {reason}")]
    TokenPersist { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl MynofiError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// The service error behind this error, if any
    pub fn service(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(e) => Some(e),
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service(e) => e.kind == ServiceErrorKind::Transport,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingServiceUrl => {
                Some("Run: mynofi config set service.url <url> (or set MYNOFI_URL)")
            }
            Self::MissingApiKey => {
                Some("Run: mynofi config set service.anon_key <key> (or set MYNOFI_ANON_KEY)")
            }
            Self::Service(e) if e.kind == ServiceErrorKind::Auth && e.status == Some(400) => {
                Some("Check the email and password, then run: mynofi login")
            }
            Self::Service(e) if e.kind == ServiceErrorKind::Transport => {
                Some("Run: mynofi health to check connectivity")
            }
            Self::Timeout { .. } => Some("Retry with a larger --wait-secs"),
            _ => None,
        }
    }
}
