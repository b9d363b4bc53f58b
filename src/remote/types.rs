//! Values exchanged with the remote service

use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An authenticated principal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: String,

    /// Contact address, when the provider exposes one
    #[serde(default)]
    pub email: Option<String>,

    /// Attributes supplied at sign-up
    #[serde(default, rename = "user_metadata")]
    pub metadata: serde_json::Value,
}

impl User {
    /// Human-readable label for status lines
    pub fn label(&self) -> &str {
        self.email.as_deref().unwrap_or("Authenticated")
    }
}

/// An authenticated session handle
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// When the access token stops being valid
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    /// Whether the access token has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// Tokens never reach logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Result of a sign-up: confirmation-required projects return no session
#[derive(Debug, Clone, PartialEq)]
pub struct AuthOutcome {
    pub user: User,
    pub session: Option<Session>,
}

/// Principal transition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// A principal transition as delivered to auth listeners
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

impl AuthChange {
    pub fn new(event: AuthEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }
}

/// Raw transport status reported by the realtime socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportStatus {
    Connected,
    Disconnected,
    Error,
}

/// A transport transition as delivered to connection listeners
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionChange {
    pub status: TransportStatus,
    pub error: Option<ServiceError>,
}

impl ConnectionChange {
    pub fn connected() -> Self {
        Self {
            status: TransportStatus::Connected,
            error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: TransportStatus::Disconnected,
            error: None,
        }
    }

    pub fn error(error: ServiceError) -> Self {
        Self {
            status: TransportStatus::Error,
            error: Some(error),
        }
    }
}

/// A broadcast frame received on a joined realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Health check verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Outcome of one diagnostic round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub connected: bool,
    /// RFC 3339 timestamp of the check
    pub timestamp: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn healthy(url: impl Into<String>, connected: bool) -> Self {
        Self {
            status: HealthStatus::Healthy,
            connected,
            timestamp: Utc::now().to_rfc3339(),
            url: url.into(),
            error: None,
        }
    }

    pub fn unhealthy(url: impl Into<String>, connected: bool, error: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            connected,
            timestamp: Utc::now().to_rfc3339(),
            url: url.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
