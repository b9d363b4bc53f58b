//! Connection state and the snapshot published to consumers

use crate::error::ServiceError;
use crate::remote::Session;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Realtime connection state as seen by the lifecycle manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view of the current connection and auth state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub session: Option<Session>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub connection_state: ConnectionState,
    pub is_connected: bool,
    pub last_error: Option<ServiceError>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ConnectionSnapshot {
    /// Connected with no outstanding error
    pub fn is_healthy(&self) -> bool {
        self.is_connected && self.last_error.is_none()
    }

    /// Automatic reconnects are used up; only a manual retry can help
    pub fn retries_exhausted(&self) -> bool {
        self.connection_state == ConnectionState::Error && self.retry_count >= self.max_retries
    }

    /// Status line text, e.g. `Reconnecting... (2/5)`
    pub fn status_text(&self) -> String {
        match self.connection_state {
            ConnectionState::Connected => "Connected".to_string(),
            ConnectionState::Connecting => "Connecting...".to_string(),
            ConnectionState::Reconnecting => {
                format!("Reconnecting... ({}/{})", self.retry_count, self.max_retries)
            }
            ConnectionState::Error => "Connection Error".to_string(),
            ConnectionState::Disconnected => "Disconnected".to_string(),
        }
    }
}

/// Mutable state owned by the manager task; snapshots are derived from it
#[derive(Debug, Clone)]
pub(crate) struct LifecycleState {
    pub session: Option<Session>,
    pub loading: bool,
    pub connection_state: ConnectionState,
    pub last_error: Option<ServiceError>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl LifecycleState {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            session: None,
            loading: true,
            connection_state: ConnectionState::Disconnected,
            last_error: None,
            retry_count: 0,
            max_retries,
        }
    }

    pub(crate) fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            session: self.session.clone(),
            is_authenticated: self.session.is_some(),
            loading: self.loading,
            connection_state: self.connection_state,
            is_connected: self.connection_state == ConnectionState::Connected,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
            max_retries: self.max_retries,
        }
    }
}
