//! Hosted backend: GoTrue-style auth REST API plus the realtime socket

use crate::config::{Config, ConnectionSettings};
use crate::config::schema::AuthConfig;
use crate::error::{MynofiResult, ServiceError, ServiceErrorKind};
use crate::remote::listeners::ServiceEvents;
use crate::remote::realtime::{RealtimeHandle, RealtimeOptions};
use crate::remote::service::RemoteService;
use crate::remote::token_store::TokenStore;
use crate::remote::types::{AuthChange, AuthEvent, AuthOutcome, Session, User};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A REST response with its body read to a string
#[derive(Debug)]
struct RestResponse {
    status: u16,
    body: String,
}

impl RestResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-2xx answer into a service error of `kind`
    fn error(&self, kind: ServiceErrorKind) -> ServiceError {
        ServiceError::new(kind, error_message(self.status, &self.body)).with_status(self.status)
    }
}

/// Pull the human-readable message out of an error body
fn error_message(status: u16, body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| {
            ["error_description", "msg", "message", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str))
        })
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {status}"))
}

/// Blocking REST client; calls run on the blocking pool
#[derive(Clone)]
struct RestClient {
    agent: ureq::Agent,
    base_url: String,
    key: String,
    application_name: String,
}

impl RestClient {
    fn new(settings: &ConnectionSettings, application_name: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: settings.url.clone(),
            key: settings.key.clone(),
            application_name: application_name.to_string(),
        }
    }

    fn bearer(&self, token: Option<&str>) -> String {
        format!("Bearer {}", token.unwrap_or(&self.key))
    }

    fn get(&self, path: &str, token: Option<&str>) -> Result<RestResponse, ureq::Error> {
        let url = format!("{}{}", self.base_url, path);
        let mut response = self
            .agent
            .get(url.as_str())
            .header("apikey", self.key.as_str())
            .header("Authorization", self.bearer(token).as_str())
            .header("x-application-name", self.application_name.as_str())
            .call()?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        Ok(RestResponse { status, body })
    }

    fn post(&self, path: &str, token: Option<&str>, body: &Value) -> Result<RestResponse, ureq::Error> {
        let url = format!("{}{}", self.base_url, path);
        let mut response = self
            .agent
            .post(url.as_str())
            .header("apikey", self.key.as_str())
            .header("Authorization", self.bearer(token).as_str())
            .header("x-application-name", self.application_name.as_str())
            .header("Content-Type", "application/json")
            .send(body.to_string())?;
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        Ok(RestResponse { status, body })
    }
}

/// GoTrue token grant response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self, now: DateTime<Utc>) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| self.expires_in.map(|secs| now + ChronoDuration::seconds(secs)));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            user: self.user,
        }
    }
}

/// Sign-up answers with a token grant when auto-confirm is on, otherwise
/// with the bare user awaiting confirmation
fn parse_sign_up(body: &str) -> Result<AuthOutcome, ServiceError> {
    if let Ok(grant) = serde_json::from_str::<TokenResponse>(body) {
        let session = grant.into_session(Utc::now());
        return Ok(AuthOutcome {
            user: session.user.clone(),
            session: Some(session),
        });
    }
    let user: User = serde_json::from_str(body)
        .map_err(|e| ServiceError::auth(format!("unexpected sign-up response: {e}")))?;
    Ok(AuthOutcome {
        user,
        session: None,
    })
}

fn parse_grant(body: &str) -> Result<Session, ServiceError> {
    serde_json::from_str::<TokenResponse>(body)
        .map(|grant| grant.into_session(Utc::now()))
        .map_err(|e| ServiceError::auth(format!("unexpected token response: {e}")))
}

/// Backend for the hosted platform
pub struct HostedService {
    rest: RestClient,
    events: ServiceEvents,
    auth: AuthConfig,
    tokens: Option<TokenStore>,
    session: Mutex<Option<Session>>,
    realtime: Option<RealtimeHandle>,
}

impl HostedService {
    /// Resolve settings, then spawn the realtime socket if enabled
    pub fn start(config: &Config, events: ServiceEvents) -> MynofiResult<Self> {
        let settings = config.connection_settings()?;
        let rest = RestClient::new(
            &settings,
            &config.service.application_name,
            Duration::from_millis(config.service.request_timeout_ms.max(1)),
        );
        let tokens = config
            .auth
            .persist_session
            .then(|| TokenStore::for_service(&config.state(), &settings.url));

        let realtime = if config.realtime.enabled {
            Some(RealtimeHandle::spawn(
                RealtimeOptions::from_settings(&settings),
                events.clone(),
            ))
        } else {
            debug!("Realtime disabled by configuration");
            None
        };

        info!("Hosted service configured for {}", settings.url);
        Ok(Self {
            rest,
            events,
            auth: config.auth.clone(),
            tokens,
            session: Mutex::new(None),
            realtime,
        })
    }

    /// Run a blocking REST call off the async runtime
    async fn call<T, F>(&self, kind: ServiceErrorKind, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&RestClient) -> Result<T, ureq::Error> + Send + 'static,
        T: Send + 'static,
    {
        let rest = self.rest.clone();
        tokio::task::spawn_blocking(move || f(&rest))
            .await
            .map_err(|e| ServiceError::new(kind, format!("request task failed: {e}")))?
            .map_err(|e| ServiceError::new(kind, e.to_string()))
    }

    async fn restore(&self) -> Option<Session> {
        let store = self.tokens.as_ref()?;
        match store.load().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding unreadable session token: {}", e);
                None
            }
        }
    }

    async fn remember(&self, session: &Session) {
        *self.session.lock() = Some(session.clone());
        if let Some(store) = &self.tokens {
            if let Err(e) = store.save(session).await {
                warn!("Failed to persist session: {}", e);
            }
        }
    }

    async fn forget(&self) {
        *self.session.lock() = None;
        if let Some(store) = &self.tokens {
            if let Err(e) = store.clear().await {
                warn!("Failed to remove persisted session: {}", e);
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ServiceError> {
        let body = json!({ "refresh_token": refresh_token });
        let response = self
            .call(ServiceErrorKind::Auth, move |rest| {
                rest.post("/auth/v1/token?grant_type=refresh_token", None, &body)
            })
            .await?;
        if !response.is_success() {
            return Err(response.error(ServiceErrorKind::Auth));
        }
        parse_grant(&response.body)
    }
}

#[async_trait]
impl RemoteService for HostedService {
    async fn current_session(&self) -> Result<Option<Session>, ServiceError> {
        let cached = self.session.lock().clone();
        let session = match cached {
            Some(session) => session,
            None => match self.restore().await {
                Some(session) => {
                    *self.session.lock() = Some(session.clone());
                    session
                }
                None => return Ok(None),
            },
        };

        if !session.is_expired() {
            return Ok(Some(session));
        }
        if !self.auth.auto_refresh_token {
            debug!("Session expired and auto refresh is disabled");
            return Ok(None);
        }

        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => {
                self.remember(&fresh).await;
                self.events
                    .emit_auth(AuthChange::new(AuthEvent::TokenRefreshed, Some(fresh.clone())));
                Ok(Some(fresh))
            }
            Err(e) if e.status.is_some_and(|s| (400..500).contains(&s)) => {
                info!("Refresh token rejected, signing out locally: {}", e.message);
                self.forget().await;
                self.events.emit_auth(AuthChange::new(AuthEvent::SignedOut, None));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn current_user(&self) -> Result<Option<User>, ServiceError> {
        let Some(session) = self.current_session().await? else {
            return Ok(None);
        };
        let token = session.access_token.clone();
        let response = self
            .call(ServiceErrorKind::Auth, move |rest| {
                rest.get("/auth/v1/user", Some(token.as_str()))
            })
            .await?;
        if !response.is_success() {
            return Err(response.error(ServiceErrorKind::Auth));
        }
        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|e| ServiceError::auth(format!("unexpected user response: {e}")))
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let body = json!({ "email": email, "password": password });
        let response = self
            .call(ServiceErrorKind::Auth, move |rest| {
                rest.post("/auth/v1/token?grant_type=password", None, &body)
            })
            .await?;
        if !response.is_success() {
            return Err(response.error(ServiceErrorKind::Auth));
        }

        let session = parse_grant(&response.body)?;
        self.remember(&session).await;
        self.events
            .emit_auth(AuthChange::new(AuthEvent::SignedIn, Some(session.clone())));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: Value,
    ) -> Result<AuthOutcome, ServiceError> {
        let body = json!({ "email": email, "password": password, "data": attributes });
        let response = self
            .call(ServiceErrorKind::Auth, move |rest| {
                rest.post("/auth/v1/signup", None, &body)
            })
            .await?;
        if !response.is_success() {
            return Err(response.error(ServiceErrorKind::Auth));
        }

        let outcome = parse_sign_up(&response.body)?;
        if let Some(session) = &outcome.session {
            self.remember(session).await;
            self.events
                .emit_auth(AuthChange::new(AuthEvent::SignedIn, Some(session.clone())));
        }
        Ok(outcome)
    }

    async fn sign_out(&self) -> Result<(), ServiceError> {
        let cached = self.session.lock().clone();
        let session = match cached {
            Some(session) => Some(session),
            None => self.restore().await,
        };
        let Some(session) = session else {
            return Ok(());
        };

        let token = session.access_token.clone();
        let response = self
            .call(ServiceErrorKind::Auth, move |rest| {
                rest.post("/auth/v1/logout", Some(token.as_str()), &json!({}))
            })
            .await?;
        // 401: the token was already revoked server side
        if !response.is_success() && response.status != 401 {
            return Err(response.error(ServiceErrorKind::Auth));
        }

        self.forget().await;
        self.events.emit_auth(AuthChange::new(AuthEvent::SignedOut, None));
        Ok(())
    }

    async fn probe(&self) -> Result<(), ServiceError> {
        let response = self
            .call(ServiceErrorKind::HealthCheck, |rest| {
                rest.get("/rest/v1/_health?select=*&limit=1", None)
            })
            .await?;
        // Any answer below 500 proves the service is reachable
        if response.status >= 500 {
            return Err(response.error(ServiceErrorKind::HealthCheck));
        }
        Ok(())
    }

    fn reset_channels(&self) -> Result<(), ServiceError> {
        match &self.realtime {
            Some(realtime) => realtime.reset_channels(),
            None => Err(ServiceError::transport("realtime is disabled")),
        }
    }

    fn join_channel(&self, topic: &str) -> Result<(), ServiceError> {
        match &self.realtime {
            Some(realtime) => realtime.join(topic),
            None => Err(ServiceError::transport("realtime is disabled")),
        }
    }

    fn service_url(&self) -> &str {
        &self.rest.base_url
    }

    fn service_name(&self) -> &'static str {
        "hosted"
    }
}
