//! Remote service module
//!
//! Provides the session client and its backends:
//! - Hosted: GoTrue REST auth + Phoenix realtime socket
//! - Fake: in-process backend for unit tests

pub mod client;
#[cfg(test)]
pub(crate) mod fake;
mod hosted;
pub mod listeners;
mod realtime;
mod service;
pub mod token_store;
pub mod types;

pub use client::SessionClient;
pub use hosted::HostedService;
pub use listeners::{Listeners, ServiceEvents, Subscription};
pub use service::RemoteService;
pub use token_store::TokenStore;
pub use types::{
    AuthChange, AuthEvent, AuthOutcome, ChannelMessage, ConnectionChange, HealthReport,
    HealthStatus, Session, TransportStatus, User,
};
