//! Remote service abstraction
//!
//! Provides a trait for the hosted auth/realtime platform so the session
//! client can run against the real backend or an in-process fake.

use crate::error::ServiceError;
use crate::remote::types::{AuthOutcome, Session, User};
use async_trait::async_trait;

/// Abstract remote service interface
///
/// Implementations publish auth and transport transitions through the
/// [`ServiceEvents`](crate::remote::ServiceEvents) handle they were built with.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Current session, refreshing or restoring it if the backend can
    async fn current_session(&self) -> Result<Option<Session>, ServiceError>;

    /// Current user as known by the service
    async fn current_user(&self) -> Result<Option<User>, ServiceError>;

    /// Sign in with email and password
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ServiceError>;

    /// Create an account, attaching `attributes` as user metadata
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: serde_json::Value,
    ) -> Result<AuthOutcome, ServiceError>;

    /// End the current session
    async fn sign_out(&self) -> Result<(), ServiceError>;

    /// One lightweight round trip to the service
    async fn probe(&self) -> Result<(), ServiceError>;

    /// Close the realtime socket and drop all channel subscriptions so the
    /// transport reconnects on its own
    fn reset_channels(&self) -> Result<(), ServiceError>;

    /// Subscribe the realtime socket to a channel topic
    fn join_channel(&self, topic: &str) -> Result<(), ServiceError>;

    /// Base URL of the service
    fn service_url(&self) -> &str;

    /// Get the human-readable backend name for display
    fn service_name(&self) -> &'static str;
}
