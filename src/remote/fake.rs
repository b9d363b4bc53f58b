//! In-process backend used by unit tests

use crate::error::ServiceError;
use crate::remote::listeners::ServiceEvents;
use crate::remote::service::RemoteService;
use crate::remote::types::{AuthChange, AuthEvent, AuthOutcome, Session, User};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct Failures {
    session_fetch: Option<String>,
    sign_in: Option<String>,
    sign_out: Option<String>,
    probe: Option<String>,
    reset: Option<String>,
}

pub(crate) struct FakeService {
    events: ServiceEvents,
    session: Mutex<Option<Session>>,
    failures: Mutex<Failures>,
    resets: Mutex<u32>,
    joined: Mutex<Vec<String>>,
    /// When set, sign-in waits for a notification before answering
    sign_in_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, the next session fetch waits for a notification
    session_gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeService {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: ServiceEvents::new(),
            session: Mutex::new(None),
            failures: Mutex::new(Failures::default()),
            resets: Mutex::new(0),
            joined: Mutex::new(Vec::new()),
            sign_in_gate: Mutex::new(None),
            session_gate: Mutex::new(None),
        })
    }

    pub(crate) fn events(&self) -> ServiceEvents {
        self.events.clone()
    }

    pub(crate) fn session_for(email: &str) -> Session {
        Session {
            access_token: format!("access-{email}"),
            refresh_token: format!("refresh-{email}"),
            token_type: "bearer".to_string(),
            expires_at: None,
            user: User {
                id: format!("id-{email}"),
                email: Some(email.to_string()),
                metadata: serde_json::Value::Null,
            },
        }
    }

    pub(crate) fn set_session(&self, session: Option<Session>) {
        *self.session.lock() = session;
    }

    pub(crate) fn fail_session_fetch(&self, message: &str) {
        self.failures.lock().session_fetch = Some(message.to_string());
    }

    pub(crate) fn fail_sign_in(&self, message: &str) {
        self.failures.lock().sign_in = Some(message.to_string());
    }

    pub(crate) fn fail_sign_out(&self, message: &str) {
        self.failures.lock().sign_out = Some(message.to_string());
    }

    pub(crate) fn fail_probe(&self, message: &str) {
        self.failures.lock().probe = Some(message.to_string());
    }

    pub(crate) fn fail_reset(&self, message: &str) {
        self.failures.lock().reset = Some(message.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        *self.failures.lock() = Failures::default();
    }

    pub(crate) fn gate_sign_in(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.sign_in_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn gate_session_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.session_gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub(crate) fn reset_count(&self) -> u32 {
        *self.resets.lock()
    }

    pub(crate) fn joined(&self) -> Vec<String> {
        self.joined.lock().clone()
    }
}

#[async_trait]
impl RemoteService for FakeService {
    async fn current_session(&self) -> Result<Option<Session>, ServiceError> {
        let gate = self.session_gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(message) = self.failures.lock().session_fetch.clone() {
            return Err(ServiceError::auth(message));
        }
        Ok(self.session.lock().clone())
    }

    async fn current_user(&self) -> Result<Option<User>, ServiceError> {
        Ok(self.current_session().await?.map(|s| s.user))
    }

    async fn sign_in(&self, email: &str, _password: &str) -> Result<Session, ServiceError> {
        let gate = self.sign_in_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(message) = self.failures.lock().sign_in.clone() {
            return Err(ServiceError::auth(message).with_status(400));
        }

        let session = Self::session_for(email);
        self.set_session(Some(session.clone()));
        self.events
            .emit_auth(AuthChange::new(AuthEvent::SignedIn, Some(session.clone())));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: serde_json::Value,
    ) -> Result<AuthOutcome, ServiceError> {
        let mut session = self.sign_in(email, password).await?;
        session.user.metadata = attributes;
        Ok(AuthOutcome {
            user: session.user.clone(),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        if let Some(message) = self.failures.lock().sign_out.clone() {
            return Err(ServiceError::auth(message));
        }
        self.set_session(None);
        self.events.emit_auth(AuthChange::new(AuthEvent::SignedOut, None));
        Ok(())
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        match self.failures.lock().probe.clone() {
            Some(message) => Err(ServiceError::health_check(message)),
            None => Ok(()),
        }
    }

    fn reset_channels(&self) -> Result<(), ServiceError> {
        if let Some(message) = self.failures.lock().reset.clone() {
            return Err(ServiceError::transport(message));
        }
        *self.resets.lock() += 1;
        self.joined.lock().clear();
        Ok(())
    }

    fn join_channel(&self, topic: &str) -> Result<(), ServiceError> {
        self.joined.lock().push(topic.to_string());
        Ok(())
    }

    fn service_url(&self) -> &str {
        "https://fake.example.co"
    }

    fn service_name(&self) -> &'static str {
        "fake"
    }
}
