//! Remote session client
//!
//! The only component that talks to the remote service. Bootstrap lookups
//! swallow failures, credential operations propagate them, and the health
//! check always produces a report.

use crate::config::Config;
use crate::error::{MynofiResult, ServiceError};
use crate::remote::hosted::HostedService;
use crate::remote::listeners::{ServiceEvents, Subscription};
use crate::remote::service::RemoteService;
use crate::remote::types::{
    AuthChange, AuthOutcome, ChannelMessage, ConnectionChange, HealthReport, Session, User,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Client facade over a [`RemoteService`] backend
pub struct SessionClient {
    service: Arc<dyn RemoteService>,
    events: ServiceEvents,
}

impl SessionClient {
    /// Wrap a backend that publishes through `events`
    pub fn new(service: Arc<dyn RemoteService>, events: ServiceEvents) -> Self {
        Self { service, events }
    }

    /// Build the hosted backend from configuration.
    ///
    /// Must be called inside a tokio runtime when realtime is enabled, since
    /// the socket task is spawned here.
    pub fn connect(config: &Config) -> MynofiResult<Self> {
        let events = ServiceEvents::new();
        let service = HostedService::start(config, events.clone())?;
        Ok(Self::new(Arc::new(service), events))
    }

    /// Current session, or `None` when there is none or it cannot be fetched
    pub async fn get_session(&self) -> Option<Session> {
        match self.service.current_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Error getting session: {}", e);
                None
            }
        }
    }

    /// Current user, or `None` when there is none or it cannot be fetched
    pub async fn get_user(&self) -> Option<User> {
        match self.service.current_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!("Error getting user: {}", e);
                None
            }
        }
    }

    /// Sign in with email and password
    pub async fn sign_in(&self, email: &str, password: &str) -> MynofiResult<Session> {
        self.service.sign_in(email, password).await.map_err(|e| {
            error!("Error signing in: {}", e);
            e.into()
        })
    }

    /// Create an account with the given user attributes
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: serde_json::Value,
    ) -> MynofiResult<AuthOutcome> {
        self.service
            .sign_up(email, password, attributes)
            .await
            .map_err(|e| {
                error!("Error signing up: {}", e);
                e.into()
            })
    }

    /// End the current session
    pub async fn sign_out(&self) -> MynofiResult<()> {
        self.service.sign_out().await.map_err(|e| {
            error!("Error signing out: {}", e);
            e.into()
        })
    }

    /// Register a handler for principal transitions
    pub fn on_auth_state_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&AuthChange) + Send + Sync + 'static,
    {
        self.events.auth().subscribe(callback)
    }

    /// Register a handler for transport transitions
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ConnectionChange) + Send + Sync + 'static,
    {
        self.events.connection().subscribe(callback)
    }

    /// Register a handler for frames on joined realtime channels
    pub fn on_channel_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChannelMessage) + Send + Sync + 'static,
    {
        self.events.messages().subscribe(callback)
    }

    /// Subscribe the realtime socket to `topic`
    pub fn join_channel(&self, topic: &str) -> Result<(), ServiceError> {
        self.service.join_channel(topic)
    }

    /// Best-effort snapshot of the transport status
    pub fn is_connected(&self) -> bool {
        self.events.is_connected()
    }

    /// Tear down realtime subscriptions so the transport reconnects
    pub fn reconnect(&self) -> Result<(), ServiceError> {
        debug!("Resetting realtime channels");
        self.service.reset_channels()
    }

    /// One diagnostic round trip. Never fails: errors become an unhealthy report.
    pub async fn health_check(&self) -> HealthReport {
        let url = self.service.service_url().to_string();
        match self.service.probe().await {
            Ok(()) => HealthReport::healthy(url, self.is_connected()),
            Err(e) => {
                debug!("Health check failed: {}", e);
                HealthReport::unhealthy(url, self.is_connected(), e.message)
            }
        }
    }

    pub fn url(&self) -> &str {
        self.service.service_url()
    }

    pub fn service_name(&self) -> &'static str {
        self.service.service_name()
    }
}
