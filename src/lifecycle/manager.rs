//! Connection lifecycle management
//!
//! A single task owns the lifecycle state. Listener callbacks, the session
//! bootstrap, the retry timer and user actions all reach it as [`Command`]s
//! over one unbounded channel, and every mutation is published as a fresh
//! [`ConnectionSnapshot`] on a watch channel.

use crate::error::{MynofiError, MynofiResult, ServiceError};
use crate::lifecycle::backoff::RetryPolicy;
use crate::lifecycle::state::{ConnectionSnapshot, ConnectionState, LifecycleState};
use crate::remote::{
    AuthChange, AuthOutcome, ConnectionChange, HealthReport, Session, SessionClient,
    Subscription, TransportStatus,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Construction options for [`ConnectionManager`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerOptions {
    pub policy: RetryPolicy,
    /// Log every published snapshot at debug level
    pub diagnostics: bool,
}

enum Command {
    Bootstrapped(Option<Session>),
    Auth(AuthChange),
    Connection(ConnectionChange),
    RetryDue { generation: u64 },
    Reconnect(oneshot::Sender<ConnectionSnapshot>),
    ClearError(oneshot::Sender<ConnectionSnapshot>),
    CredentialStarted,
    CredentialFinished(Option<ServiceError>),
    Current(oneshot::Sender<ConnectionSnapshot>),
    Shutdown,
}

/// Handle to the lifecycle manager task
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<ConnectionSnapshot>,
    client: Arc<SessionClient>,
}

impl ConnectionManager {
    /// Spawn the manager task and the session bootstrap.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(client: Arc<SessionClient>, options: ManagerOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = LifecycleState::new(options.policy.max_retries);
        let (publisher, snapshots) = watch::channel(state.snapshot());

        if options.diagnostics {
            debug!(
                url = client.url(),
                backend = client.service_name(),
                "Starting connection manager"
            );
        }

        // Callbacks hold weak senders so dropping every handle closes the channel
        let auth_tx = tx.downgrade();
        let auth_sub = client.on_auth_state_change(move |change| {
            if let Some(tx) = auth_tx.upgrade() {
                let _ = tx.send(Command::Auth(change.clone()));
            }
        });
        let conn_tx = tx.downgrade();
        let conn_sub = client.on_connection_change(move |change| {
            if let Some(tx) = conn_tx.upgrade() {
                let _ = tx.send(Command::Connection(change.clone()));
            }
        });

        let already_connected = client.is_connected();
        let actor = Actor {
            state,
            policy: options.policy,
            diagnostics: options.diagnostics,
            client: Arc::clone(&client),
            publisher,
            timer_tx: tx.downgrade(),
            timer: None,
            generation: 0,
            subscriptions: vec![auth_sub, conn_sub],
        };
        tokio::spawn(actor.run(rx, already_connected));

        let bootstrap_tx = tx.clone();
        let bootstrap_client = Arc::clone(&client);
        tokio::spawn(async move {
            let session = bootstrap_client.get_session().await;
            let _ = bootstrap_tx.send(Command::Bootstrapped(session));
        });

        Self {
            commands: tx,
            snapshots,
            client,
        }
    }

    fn send(&self, command: Command) -> MynofiResult<()> {
        self.commands
            .send(command)
            .map_err(|_| MynofiError::ManagerStopped)
    }

    async fn request<F>(&self, make: F) -> MynofiResult<ConnectionSnapshot>
    where
        F: FnOnce(oneshot::Sender<ConnectionSnapshot>) -> Command,
    {
        let (reply, answer) = oneshot::channel();
        self.send(make(reply))?;
        answer.await.map_err(|_| MynofiError::ManagerStopped)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Snapshot after every command queued so far has been applied
    pub async fn current(&self) -> MynofiResult<ConnectionSnapshot> {
        self.request(Command::Current).await
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for<F>(&self, predicate: F) -> MynofiResult<ConnectionSnapshot>
    where
        F: FnMut(&ConnectionSnapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = rx
            .wait_for(predicate)
            .await
            .map_err(|_| MynofiError::ManagerStopped)?;
        Ok(snapshot.clone())
    }

    /// Sign in and record the outcome in the snapshot
    pub async fn sign_in(&self, email: &str, password: &str) -> MynofiResult<Session> {
        self.credential(self.client.sign_in(email, password)).await
    }

    /// Create an account and record the outcome in the snapshot
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        attributes: serde_json::Value,
    ) -> MynofiResult<AuthOutcome> {
        self.credential(self.client.sign_up(email, password, attributes))
            .await
    }

    /// Sign out and record the outcome in the snapshot
    pub async fn sign_out(&self) -> MynofiResult<()> {
        self.credential(self.client.sign_out()).await
    }

    async fn credential<T, F>(&self, operation: F) -> MynofiResult<T>
    where
        F: Future<Output = MynofiResult<T>>,
    {
        self.send(Command::CredentialStarted)?;
        let mut guard = LoadingGuard {
            commands: self.commands.clone(),
            armed: true,
        };

        let result = operation.await;
        let failure = result.as_ref().err().map(as_service_error);
        guard.armed = false;
        self.send(Command::CredentialFinished(failure))?;
        result
    }

    /// Tear down the realtime transport so it reconnects
    pub async fn reconnect(&self) -> MynofiResult<ConnectionSnapshot> {
        self.request(Command::Reconnect).await
    }

    /// Forget the last recorded error
    pub async fn clear_error(&self) -> MynofiResult<ConnectionSnapshot> {
        self.request(Command::ClearError).await
    }

    /// One diagnostic round trip; never fails
    pub async fn check_health(&self) -> HealthReport {
        self.client.health_check().await
    }

    /// Subscribe the realtime socket to a channel topic
    pub fn join_channel(&self, topic: &str) -> MynofiResult<()> {
        self.client.join_channel(topic).map_err(MynofiError::from)
    }

    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// Stop the manager. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        self.commands.closed().await;
    }
}

/// Ends the loading phase if a credential operation is dropped mid-flight
struct LoadingGuard {
    commands: mpsc::UnboundedSender<Command>,
    armed: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.commands.send(Command::CredentialFinished(None));
        }
    }
}

fn as_service_error(error: &MynofiError) -> ServiceError {
    match error.service() {
        Some(e) => e.clone(),
        None => ServiceError::auth(error.to_string()),
    }
}

struct PendingRetry {
    generation: u64,
    task: JoinHandle<()>,
}

struct Actor {
    state: LifecycleState,
    policy: RetryPolicy,
    diagnostics: bool,
    client: Arc<SessionClient>,
    publisher: watch::Sender<ConnectionSnapshot>,
    timer_tx: mpsc::WeakUnboundedSender<Command>,
    timer: Option<PendingRetry>,
    generation: u64,
    subscriptions: Vec<Subscription>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, already_connected: bool) {
        if already_connected {
            self.on_connection(ConnectionChange::connected());
            self.publish();
        }

        while let Some(command) = rx.recv().await {
            match command {
                Command::Shutdown => break,
                Command::Current(reply) => {
                    let _ = reply.send(self.state.snapshot());
                }
                Command::Reconnect(reply) => {
                    self.reconnect();
                    self.publish();
                    let _ = reply.send(self.state.snapshot());
                }
                Command::ClearError(reply) => {
                    self.state.last_error = None;
                    self.publish();
                    let _ = reply.send(self.state.snapshot());
                }
                other => {
                    self.apply(other);
                    self.publish();
                }
            }
        }

        self.teardown();
        debug!("Connection manager stopped");
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Bootstrapped(session) => {
                debug!(authenticated = session.is_some(), "Session bootstrap finished");
                self.state.session = session;
                self.state.loading = false;
            }
            Command::Auth(change) => self.on_auth(change),
            Command::Connection(change) => self.on_connection(change),
            Command::RetryDue { generation } => self.on_retry_due(generation),
            Command::CredentialStarted => {
                self.state.loading = true;
                self.state.last_error = None;
            }
            Command::CredentialFinished(failure) => {
                self.state.loading = false;
                if let Some(error) = failure {
                    self.state.last_error = Some(error);
                }
            }
            Command::Reconnect(_)
            | Command::ClearError(_)
            | Command::Current(_)
            | Command::Shutdown => {}
        }
    }

    fn on_auth(&mut self, change: AuthChange) {
        debug!(event = ?change.event, "Auth state changed");
        let has_session = change.session.is_some();
        self.state.session = change.session;
        self.state.loading = false;

        if has_session
            && self
                .state
                .last_error
                .as_ref()
                .is_some_and(ServiceError::is_auth_related)
        {
            self.state.last_error = None;
        }
    }

    fn on_connection(&mut self, change: ConnectionChange) {
        debug!(status = ?change.status, "Connection status changed");
        self.cancel_timer();

        match change.status {
            TransportStatus::Connected => {
                self.state.connection_state = ConnectionState::Connected;
                self.state.last_error = None;
                self.state.retry_count = 0;
            }
            TransportStatus::Disconnected => {
                self.state.connection_state = ConnectionState::Disconnected;
                if let Some(error) = change.error {
                    self.state.last_error = Some(error);
                }
            }
            TransportStatus::Error => {
                let error = change
                    .error
                    .unwrap_or_else(|| ServiceError::transport("Realtime connection failed"));
                self.enter_error(error);
            }
        }
    }

    fn enter_error(&mut self, error: ServiceError) {
        warn!("Connection error: {}", error);
        self.state.connection_state = ConnectionState::Error;
        self.state.last_error = Some(error);

        if !self.policy.should_retry(self.state.retry_count) {
            warn!(
                retries = self.state.retry_count,
                "Automatic reconnects exhausted"
            );
            return;
        }

        // Observers see the error before the retry is scheduled
        self.publish();
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        self.cancel_timer();
        self.generation += 1;
        let generation = self.generation;
        let delay = self.policy.delay(self.state.retry_count);
        let tx = self.timer_tx.clone();

        info!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            self.state.retry_count + 1,
            self.state.max_retries
        );

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(Command::RetryDue { generation });
            }
        });

        self.state.connection_state = ConnectionState::Reconnecting;
        self.timer = Some(PendingRetry { generation, task });
    }

    fn cancel_timer(&mut self) {
        if let Some(pending) = self.timer.take() {
            pending.task.abort();
        }
    }

    fn on_retry_due(&mut self, generation: u64) {
        let current = self.timer.as_ref().map(|pending| pending.generation);
        if current != Some(generation) {
            debug!(generation, "Ignoring stale reconnect timer");
            return;
        }

        self.timer = None;
        self.state.retry_count += 1;
        self.reconnect();
    }

    fn reconnect(&mut self) {
        self.cancel_timer();
        match self.client.reconnect() {
            Ok(()) => {
                self.state.connection_state = ConnectionState::Connecting;
                self.state.last_error = None;
            }
            Err(e) => self.enter_error(e),
        }
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        if self.diagnostics {
            debug!(?snapshot, "Connection snapshot");
        }
        self.publisher.send_replace(snapshot);
    }

    fn teardown(&mut self) {
        self.cancel_timer();
        for mut subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceErrorKind;
    use crate::remote::fake::FakeService;
    use crate::remote::{AuthEvent, HealthStatus};
    use std::time::Duration;

    fn start(fake: &Arc<FakeService>) -> ConnectionManager {
        let client = Arc::new(SessionClient::new(fake.clone(), fake.events()));
        ConnectionManager::start(client, ManagerOptions::default())
    }

    async fn booted(fake: &Arc<FakeService>) -> ConnectionManager {
        let manager = start(fake);
        manager.wait_for(|s| !s.loading).await.unwrap();
        manager
    }

    fn emit(fake: &FakeService, change: ConnectionChange) {
        fake.events().emit_connection(change);
    }

    fn e1() -> ServiceError {
        ServiceError::transport("socket closed")
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_loads_existing_session() {
        let fake = FakeService::new();
        fake.set_session(Some(FakeService::session_for("a@example.com")));

        let manager = start(&fake);
        let snap = manager.wait_for(|s| !s.loading).await.unwrap();

        assert!(snap.is_authenticated);
        assert_eq!(snap.connection_state, ConnectionState::Disconnected);
        assert_eq!(snap.max_retries, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_failure_is_unauthenticated() {
        let fake = FakeService::new();
        fake.fail_session_fetch("network down");

        let manager = start(&fake);
        let snap = manager.wait_for(|s| !s.loading).await.unwrap();

        assert!(!snap.is_authenticated);
        assert!(snap.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn auth_events_overwrite_session() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        let session = FakeService::session_for("b@example.com");
        fake.events()
            .emit_auth(AuthChange::new(AuthEvent::SignedIn, Some(session.clone())));
        assert_eq!(manager.current().await.unwrap().session, Some(session));

        fake.events()
            .emit_auth(AuthChange::new(AuthEvent::SignedOut, None));
        assert!(!manager.current().await.unwrap().is_authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_event_during_bootstrap_then_bootstrap_wins() {
        let fake = FakeService::new();
        let gate = fake.gate_session_fetch();
        let manager = start(&fake);
        assert!(manager.snapshot().loading);

        let early = FakeService::session_for("a@example.com");
        fake.events()
            .emit_auth(AuthChange::new(AuthEvent::SignedIn, Some(early.clone())));
        let snap = manager.current().await.unwrap();
        assert!(!snap.loading);
        assert!(snap.is_authenticated);
        assert_eq!(snap.session, Some(early));

        fake.set_session(Some(FakeService::session_for("b@example.com")));
        gate.notify_one();
        let snap = manager
            .wait_for(|snap| {
                snap.session.as_ref().map(|s| s.user_id()) == Some("id-b@example.com")
            })
            .await
            .unwrap();
        assert!(!snap.loading);
        assert!(snap.is_authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn already_connected_client_starts_connected() {
        let fake = FakeService::new();
        emit(&fake, ConnectionChange::connected());

        let manager = booted(&fake).await;
        assert_eq!(
            manager.current().await.unwrap().connection_state,
            ConnectionState::Connected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn is_connected_tracks_last_event() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        let sequence = [
            ConnectionChange::connected(),
            ConnectionChange::error(e1()),
            ConnectionChange::connected(),
            ConnectionChange::disconnected(),
            ConnectionChange::connected(),
        ];
        for change in sequence {
            let expected = change.status == TransportStatus::Connected;
            emit(&fake, change);
            assert_eq!(manager.current().await.unwrap().is_connected, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connected_resets_retries_and_error() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        emit(&fake, ConnectionChange::error(e1()));
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        emit(&fake, ConnectionChange::error(e1()));
        let snap = manager.current().await.unwrap();
        assert_eq!(snap.retry_count, 1);
        assert!(snap.last_error.is_some());

        emit(&fake, ConnectionChange::connected());
        let snap = manager.current().await.unwrap();
        assert_eq!(snap.connection_state, ConnectionState::Connected);
        assert_eq!(snap.retry_count, 0);
        assert!(snap.last_error.is_none());
        assert!(snap.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn error_then_retry_then_connected() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        emit(&fake, ConnectionChange::error(e1()));
        let snap = manager.current().await.unwrap();
        assert_eq!(snap.connection_state, ConnectionState::Reconnecting);
        assert_eq!(snap.retry_count, 0);
        assert_eq!(snap.last_error, Some(e1()));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(fake.reset_count(), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        let snap = manager.current().await.unwrap();
        assert_eq!(fake.reset_count(), 1);
        assert_eq!(snap.retry_count, 1);
        assert_eq!(snap.connection_state, ConnectionState::Connecting);
        assert!(snap.last_error.is_none());

        emit(&fake, ConnectionChange::connected());
        let snap = manager.current().await.unwrap();
        assert_eq!(snap.connection_state, ConnectionState::Connected);
        assert_eq!(snap.retry_count, 0);
        assert!(snap.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_back_off_and_stop_at_limit() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        let start = tokio::time::Instant::now();
        let mut fired_at = Vec::new();

        for attempt in 1..=5 {
            emit(&fake, ConnectionChange::error(e1()));
            manager.wait_for(|s| s.retry_count == attempt).await.unwrap();
            fired_at.push(start.elapsed().as_millis());
            assert_eq!(fake.reset_count(), attempt);
        }

        // Each delay is measured from the previous attempt
        let gaps: Vec<u128> = fired_at
            .iter()
            .scan(0, |prev, at| {
                let gap = at - *prev;
                *prev = *at;
                Some(gap)
            })
            .collect();
        assert_eq!(gaps, vec![1_000, 2_000, 4_000, 8_000, 16_000]);

        emit(&fake, ConnectionChange::error(e1()));
        tokio::time::sleep(Duration::from_secs(120)).await;
        let snap = manager.current().await.unwrap();
        assert_eq!(fake.reset_count(), 5);
        assert_eq!(snap.connection_state, ConnectionState::Error);
        assert_eq!(snap.retry_count, 5);
        assert!(snap.retries_exhausted());

        // Manual reconnect still works
        let snap = manager.reconnect().await.unwrap();
        assert_eq!(snap.connection_state, ConnectionState::Connecting);
        assert_eq!(snap.retry_count, 5);
        assert_eq!(fake.reset_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_delay_reaches_cap() {
        let fake = FakeService::new();
        let client = Arc::new(SessionClient::new(fake.clone(), fake.events()));
        let policy = RetryPolicy {
            max_retries: 7,
            ..RetryPolicy::default()
        };
        let manager = ConnectionManager::start(
            client,
            ManagerOptions {
                policy,
                diagnostics: true,
            },
        );
        manager.wait_for(|s| !s.loading).await.unwrap();

        for attempt in 1..=5 {
            emit(&fake, ConnectionChange::error(e1()));
            manager.wait_for(|s| s.retry_count == attempt).await.unwrap();
        }

        let before = tokio::time::Instant::now();
        emit(&fake, ConnectionChange::error(e1()));
        manager.wait_for(|s| s.retry_count == 6).await.unwrap();
        assert_eq!(before.elapsed(), Duration::from_millis(30_000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        emit(&fake, ConnectionChange::error(e1()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        emit(&fake, ConnectionChange::connected());
        tokio::time::sleep(Duration::from_secs(60)).await;

        let snap = manager.current().await.unwrap();
        assert_eq!(fake.reset_count(), 0);
        assert_eq!(snap.connection_state, ConnectionState::Connected);
        assert_eq!(snap.retry_count, 0);

        emit(&fake, ConnectionChange::error(e1()));
        emit(&fake, ConnectionChange::disconnected());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fake.reset_count(), 0);
        assert_eq!(
            manager.current().await.unwrap().connection_state,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_errors_keep_a_single_timer() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        emit(&fake, ConnectionChange::error(e1()));
        tokio::time::sleep(Duration::from_millis(600)).await;
        emit(&fake, ConnectionChange::error(e1()));

        // The first timer was superseded; the second fires 1000ms after it was set
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fake.reset_count(), 0);
        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(fake.reset_count(), 1);
        assert_eq!(manager.current().await.unwrap().retry_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_failure_enters_error_without_counting() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        fake.fail_reset("socket already gone");

        let snap = manager.reconnect().await.unwrap();
        assert_eq!(snap.retry_count, 0);
        assert_eq!(
            snap.last_error.as_ref().map(|e| e.kind),
            Some(ServiceErrorKind::Transport)
        );
        assert_eq!(snap.connection_state, ConnectionState::Reconnecting);

        fake.clear_failures();
        tokio::time::sleep(Duration::from_millis(1_001)).await;
        let snap = manager.current().await.unwrap();
        assert_eq!(snap.retry_count, 1);
        assert_eq!(snap.connection_state, ConnectionState::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn payloadless_error_records_transport_error() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        emit(
            &fake,
            ConnectionChange {
                status: TransportStatus::Error,
                error: None,
            },
        );
        let snap = manager.current().await.unwrap();
        assert_eq!(
            snap.last_error.map(|e| e.kind),
            Some(ServiceErrorKind::Transport)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sign_in_success_clears_loading_and_error() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        manager.clear_error().await.unwrap();

        let session = manager.sign_in("a@example.com", "pw").await.unwrap();
        let snap = manager.current().await.unwrap();

        assert!(!snap.loading);
        assert!(snap.last_error.is_none());
        assert_eq!(snap.session, Some(session));
    }

    #[tokio::test(start_paused = true)]
    async fn sign_in_failure_records_error() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        fake.fail_sign_in("Invalid login credentials");

        let err = manager.sign_in("a@example.com", "bad").await.unwrap_err();
        let snap = manager.current().await.unwrap();

        assert!(!snap.loading);
        assert_eq!(snap.last_error.as_ref(), err.service());
        assert_eq!(
            snap.last_error.map(|e| e.message),
            Some("Invalid login credentials".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_processed_while_sign_in_is_pending() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        let gate = fake.gate_sign_in();

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.sign_in("a@example.com", "pw").await })
        };
        manager.wait_for(|s| s.loading).await.unwrap();

        emit(&fake, ConnectionChange::connected());
        let snap = manager.current().await.unwrap();
        assert_eq!(snap.connection_state, ConnectionState::Connected);
        assert!(snap.loading);

        gate.notify_one();
        pending.await.unwrap().unwrap();
        let snap = manager.current().await.unwrap();
        assert!(!snap.loading);
        assert!(snap.is_authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sign_in_restores_loading() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        let _gate = fake.gate_sign_in();

        let pending = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.sign_in("a@example.com", "pw").await })
        };
        manager.wait_for(|s| s.loading).await.unwrap();

        pending.abort();
        let _ = pending.await;
        let snap = manager.wait_for(|s| !s.loading).await.unwrap();
        assert!(snap.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sign_out_failure_propagates() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        fake.fail_sign_out("Transport closed");

        assert!(manager.sign_out().await.is_err());
        let snap = manager.current().await.unwrap();
        assert!(!snap.loading);
        assert!(snap.last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sign_up_returns_outcome() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        let outcome = manager
            .sign_up("new@example.com", "pw", serde_json::json!({"name": "N"}))
            .await
            .unwrap();
        assert_eq!(outcome.user.metadata["name"], "N");
        assert!(manager.current().await.unwrap().is_authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn session_clears_auth_related_error_only() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        let session = FakeService::session_for("a@example.com");

        fake.fail_sign_in("Invalid login credentials");
        let _ = manager.sign_in("a@example.com", "bad").await;
        fake.events()
            .emit_auth(AuthChange::new(AuthEvent::SignedIn, Some(session.clone())));
        assert!(manager.current().await.unwrap().last_error.is_none());

        // Transport error without "auth" in the message survives
        emit(&fake, ConnectionChange::error(e1()));
        fake.events()
            .emit_auth(AuthChange::new(AuthEvent::TokenRefreshed, Some(session.clone())));
        assert!(manager.current().await.unwrap().last_error.is_some());

        // Message match counts even for transport errors
        emit(
            &fake,
            ConnectionChange::error(ServiceError::transport("Auth token expired")),
        );
        fake.events()
            .emit_auth(AuthChange::new(AuthEvent::TokenRefreshed, Some(session)));
        assert!(manager.current().await.unwrap().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_event_keeps_auth_error() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        fake.fail_sign_in("Invalid login credentials");
        let _ = manager.sign_in("a@example.com", "bad").await;

        fake.events()
            .emit_auth(AuthChange::new(AuthEvent::SignedOut, None));
        assert!(manager.current().await.unwrap().last_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_error_forgets_last_error() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        fake.fail_sign_in("Invalid login credentials");
        let _ = manager.sign_in("a@example.com", "bad").await;

        let snap = manager.clear_error().await.unwrap();
        assert!(snap.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn check_health_reports_failure() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        fake.fail_probe("503 Service Unavailable");

        let report = manager.check_health().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.connected);
        assert_eq!(report.error.as_deref(), Some("503 Service Unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn join_channel_reaches_backend() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;
        manager.join_channel("realtime:public").unwrap();
        assert_eq!(fake.joined(), vec!["realtime:public".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unsubscribes_and_is_idempotent() {
        let fake = FakeService::new();
        let manager = booted(&fake).await;

        emit(&fake, ConnectionChange::error(e1()));
        manager.current().await.unwrap();
        manager.shutdown().await;
        manager.shutdown().await;

        assert!(fake.events().connection().is_empty());
        assert!(fake.events().auth().is_empty());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fake.reset_count(), 0);

        assert!(matches!(
            manager.current().await,
            Err(MynofiError::ManagerStopped)
        ));
        emit(&fake, ConnectionChange::connected());
    }
}
