//! Realtime websocket transport
//!
//! A background task owns the socket. It speaks the Phoenix channel framing
//! used by the hosted realtime service, keeps the connection alive with
//! heartbeats, re-joins channels after reconnecting and reports every
//! transition through [`ServiceEvents`].

use crate::config::ConnectionSettings;
use crate::error::ServiceError;
use crate::remote::listeners::ServiceEvents;
use crate::remote::types::{ChannelMessage, ConnectionChange};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Writer = SplitSink<Socket, Message>;

/// Upper bound on the socket's own reconnect delay
const MAX_RECONNECT_DELAY_MS: u64 = 30_000;

/// Delay before reconnect attempt number `tries` (1-based): one second per
/// failed attempt, capped at thirty seconds.
pub(crate) fn reconnect_after(tries: u32) -> Duration {
    Duration::from_millis((u64::from(tries) * 1_000).min(MAX_RECONNECT_DELAY_MS))
}

/// Socket tuning derived from the connection settings
#[derive(Debug, Clone)]
pub(crate) struct RealtimeOptions {
    pub url: String,
    pub heartbeat: Duration,
    pub timeout: Duration,
    pub events_per_second: u32,
}

impl RealtimeOptions {
    pub(crate) fn from_settings(settings: &ConnectionSettings) -> Self {
        Self {
            url: websocket_url(&settings.url, &settings.key),
            heartbeat: Duration::from_millis(settings.heartbeat_ms.max(1)),
            timeout: Duration::from_millis(settings.timeout_ms.max(1)),
            events_per_second: settings.events_per_second.max(1),
        }
    }
}

/// `https://host` -> `wss://host/realtime/v1/websocket?apikey=..&vsn=1.0.0`
pub(crate) fn websocket_url(base: &str, key: &str) -> String {
    let base = base.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{ws_base}/realtime/v1/websocket?apikey={key}&vsn=1.0.0")
}

/// Normalize a channel name to a realtime topic
pub(crate) fn channel_topic(name: &str) -> String {
    if name.starts_with("realtime:") {
        name.to_string()
    } else {
        format!("realtime:{name}")
    }
}

/// A Phoenix channel frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Value,
}

impl Frame {
    fn new(topic: &str, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Value::String(reference.to_string()),
        }
    }

    pub(crate) fn heartbeat(reference: u64) -> Self {
        Self::new("phoenix", "heartbeat", json!({}), reference)
    }

    pub(crate) fn join(topic: &str, reference: u64) -> Self {
        Self::new(
            topic,
            "phx_join",
            json!({ "config": { "broadcast": { "self": false } } }),
            reference,
        )
    }

    pub(crate) fn leave(topic: &str, reference: u64) -> Self {
        Self::new(topic, "phx_leave", json!({}), reference)
    }

    /// Whether this is the server's reply to the frame sent with `reference`
    pub(crate) fn is_reply_to(&self, reference: u64) -> bool {
        if self.event != "phx_reply" {
            return false;
        }
        match &self.reference {
            Value::String(s) => s.parse::<u64>().ok() == Some(reference),
            Value::Number(n) => n.as_u64() == Some(reference),
            _ => false,
        }
    }

    fn is_control(&self) -> bool {
        self.topic == "phoenix" || self.event.starts_with("phx_")
    }
}

/// Spaces outgoing channel frames to the configured rate
struct Throttle {
    interval: Duration,
    next: Option<Instant>,
}

impl Throttle {
    fn per_second(events: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / events.max(1),
            next: None,
        }
    }

    async fn wait(&mut self) {
        let now = Instant::now();
        let slot = match self.next {
            Some(next) if next > now => {
                tokio::time::sleep_until(next).await;
                next
            }
            _ => now,
        };
        self.next = Some(slot + self.interval);
    }
}

enum SocketCommand {
    Join(String),
    Reset,
    Shutdown,
}

enum Exit {
    Closed,
    Reset,
    Failed(ServiceError),
    Shutdown,
}

/// Handle to the background socket task
pub(crate) struct RealtimeHandle {
    commands: mpsc::UnboundedSender<SocketCommand>,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    /// Spawn the socket task. Requires a tokio runtime.
    pub(crate) fn spawn(options: RealtimeOptions, events: ServiceEvents) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(options, events, rx));
        Self { commands, task }
    }

    /// Leave every channel and close the socket; the task reconnects at once.
    pub(crate) fn reset_channels(&self) -> Result<(), ServiceError> {
        self.send(SocketCommand::Reset)
    }

    pub(crate) fn join(&self, topic: &str) -> Result<(), ServiceError> {
        self.send(SocketCommand::Join(channel_topic(topic)))
    }

    fn send(&self, command: SocketCommand) -> Result<(), ServiceError> {
        if self.task.is_finished() {
            return Err(ServiceError::transport("realtime socket task is not running"));
        }
        self.commands
            .send(command)
            .map_err(|_| ServiceError::transport("realtime socket task is not running"))
    }
}

impl Drop for RealtimeHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(SocketCommand::Shutdown);
    }
}

async fn run_socket(
    options: RealtimeOptions,
    events: ServiceEvents,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
) {
    let mut channels: Vec<String> = Vec::new();
    let mut tries: u32 = 0;
    let mut next_ref: u64 = 0;

    loop {
        let connect = tokio::time::timeout(
            options.timeout,
            tokio_tungstenite::connect_async(options.url.as_str()),
        )
        .await;

        match connect {
            Ok(Ok((socket, _))) => {
                tries = 0;
                info!("Realtime socket connected");
                events.emit_connection(ConnectionChange::connected());

                let exit = drive(
                    socket,
                    &options,
                    &events,
                    &mut commands,
                    &mut channels,
                    &mut next_ref,
                )
                .await;

                match exit {
                    Exit::Shutdown => {
                        events.emit_connection(ConnectionChange::disconnected());
                        debug!("Realtime socket shut down");
                        return;
                    }
                    Exit::Reset => {
                        events.emit_connection(ConnectionChange::disconnected());
                        continue;
                    }
                    Exit::Closed => {
                        warn!("Realtime socket closed");
                        events.emit_connection(ConnectionChange::disconnected());
                    }
                    Exit::Failed(error) => {
                        warn!("Realtime socket error: {}", error.message);
                        events.emit_connection(ConnectionChange::error(error));
                    }
                }
            }
            Ok(Err(e)) => {
                warn!("Realtime connect failed: {}", e);
                events.emit_connection(ConnectionChange::error(ServiceError::transport(
                    format!("realtime connect failed: {e}"),
                )));
            }
            Err(_) => {
                warn!("Realtime connect timed out after {:?}", options.timeout);
                events.emit_connection(ConnectionChange::error(ServiceError::transport(
                    format!("realtime connect timed out after {}ms", options.timeout.as_millis()),
                )));
            }
        }

        tries = tries.saturating_add(1);
        let delay = reconnect_after(tries);
        debug!("Realtime reconnect in {:?} (attempt {})", delay, tries);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(SocketCommand::Join(topic)) => {
                        if !channels.contains(&topic) {
                            channels.push(topic);
                        }
                    }
                    Some(SocketCommand::Reset) => {
                        channels.clear();
                        tries = 0;
                        break;
                    }
                    Some(SocketCommand::Shutdown) | None => return,
                },
            }
        }
    }
}

async fn drive(
    socket: Socket,
    options: &RealtimeOptions,
    events: &ServiceEvents,
    commands: &mut mpsc::UnboundedReceiver<SocketCommand>,
    channels: &mut Vec<String>,
    next_ref: &mut u64,
) -> Exit {
    let (mut write, mut read) = socket.split();
    let mut throttle = Throttle::per_second(options.events_per_second);

    for topic in channels.iter() {
        *next_ref += 1;
        throttle.wait().await;
        if let Err(e) = send_frame(&mut write, &Frame::join(topic, *next_ref)).await {
            return Exit::Failed(e);
        }
    }

    let mut heartbeat = tokio::time::interval_at(Instant::now() + options.heartbeat, options.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending_heartbeat: Option<u64> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if pending_heartbeat.is_some() {
                    let _ = write.close().await;
                    return Exit::Failed(ServiceError::transport("realtime heartbeat timed out"));
                }
                *next_ref += 1;
                if let Err(e) = send_frame(&mut write, &Frame::heartbeat(*next_ref)).await {
                    return Exit::Failed(e);
                }
                pending_heartbeat = Some(*next_ref);
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    let frame: Frame = match serde_json::from_str(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!("Ignoring malformed realtime frame: {}", e);
                            continue;
                        }
                    };
                    if pending_heartbeat.is_some_and(|r| frame.is_reply_to(r)) {
                        pending_heartbeat = None;
                    } else if frame.is_control() {
                        if frame.payload.get("status").and_then(Value::as_str) == Some("error") {
                            warn!("Realtime channel {} replied with error: {}", frame.topic, frame.payload);
                        } else {
                            debug!("Realtime {} on {}", frame.event, frame.topic);
                        }
                    } else {
                        events.emit_message(ChannelMessage {
                            topic: frame.topic,
                            event: frame.event,
                            payload: frame.payload,
                        });
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = write.send(Message::Pong(data)).await {
                        return Exit::Failed(ServiceError::transport(format!("realtime send failed: {e}")));
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Exit::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Exit::Failed(ServiceError::transport(format!("realtime socket error: {e}")));
                }
            },
            command = commands.recv() => match command {
                Some(SocketCommand::Join(topic)) => {
                    if channels.contains(&topic) {
                        continue;
                    }
                    *next_ref += 1;
                    throttle.wait().await;
                    if let Err(e) = send_frame(&mut write, &Frame::join(&topic, *next_ref)).await {
                        return Exit::Failed(e);
                    }
                    channels.push(topic);
                }
                Some(SocketCommand::Reset) => {
                    for topic in channels.drain(..) {
                        *next_ref += 1;
                        let _ = send_frame(&mut write, &Frame::leave(&topic, *next_ref)).await;
                    }
                    let _ = write.close().await;
                    return Exit::Reset;
                }
                Some(SocketCommand::Shutdown) | None => {
                    let _ = write.close().await;
                    return Exit::Shutdown;
                }
            },
        }
    }
}

async fn send_frame(write: &mut Writer, frame: &Frame) -> Result<(), ServiceError> {
    let text = serde_json::to_string(frame)
        .map_err(|e| ServiceError::transport(format!("encoding realtime frame: {e}")))?;
    write
        .send(Message::Text(text))
        .await
        .map_err(|e| ServiceError::transport(format!("realtime send failed: {e}")))
}
