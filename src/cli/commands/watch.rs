//! Watch command - stream connection transitions until Ctrl-C
//!
//! Stdin accepts `r` (reconnect now) and `c` (clear the last error).

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::WatchArgs;
use crate::cli::commands::connect;
use crate::config::Config;
use crate::error::{MynofiError, MynofiResult};
use crate::lifecycle::{ConnectionManager, ConnectionSnapshot, ConnectionState};
use crate::ui::{self, UiContext};
use serde_json::json;
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::warn;

/// Execute the watch command
pub async fn execute(args: WatchArgs, config: &Config) -> MynofiResult<()> {
    if !config.realtime.enabled {
        return Err(MynofiError::User(
            "Realtime is disabled; run: mynofi config set realtime.enabled true".to_string(),
        ));
    }

    let ctx = UiContext::detect();
    let audit = AuditLog::new(config);
    let manager = connect::start_manager(config)?;

    let _messages = manager.client().on_channel_message(move |message| {
        ui::event_line(
            &ctx,
            &message.topic,
            &format!("{} {}", message.event, message.payload),
        );
    });
    join_all(&manager, &args.channels);

    ui::intro(&ctx, &format!("Watching {}", manager.client().url()));
    ui::remark(&ctx, "r = reconnect, c = clear error, Ctrl-C = quit");

    let mut snapshots = manager.subscribe();
    let mut previous = snapshots.borrow_and_update().clone();
    let mut input = stdin_lines();
    let mut input_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = snapshots.borrow_and_update().clone();
                for (tag, line) in describe(&previous, &current) {
                    ui::event_line(&ctx, tag, &line);
                }

                if current.connection_state == ConnectionState::Connected
                    && previous.connection_state != ConnectionState::Connected
                {
                    join_all(&manager, &args.channels);
                }

                if current.retries_exhausted() && !previous.retries_exhausted() {
                    ui::step_warn_hint(
                        &ctx,
                        "Automatic reconnects exhausted",
                        "Type r and press Enter to retry",
                    );
                    audit
                        .record(
                            AuditEvent::RetriesExhausted,
                            json!({
                                "retries": current.retry_count,
                                "error": current.last_error.as_ref().map(|e| e.message.clone()),
                            }),
                        )
                        .await;
                }
                previous = current;
            }
            line = input.recv(), if input_open => match line {
                Some(line) => handle_input(&ctx, &manager, line.trim()).await?,
                None => input_open = false,
            },
        }
    }

    manager.shutdown().await;
    ui::outro_success(&ctx, "Stopped watching");
    Ok(())
}

/// Stdin lines read on a detached thread so a pending read never holds up exit
fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Stopped reading stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn join_all(manager: &ConnectionManager, channels: &[String]) {
    for channel in channels {
        if let Err(e) = manager.join_channel(channel) {
            warn!("Failed to join {}: {}", channel, e);
        }
    }
}

async fn handle_input(ctx: &UiContext, manager: &ConnectionManager, input: &str) -> MynofiResult<()> {
    match input {
        "" => {}
        "r" => {
            manager.reconnect().await?;
        }
        "c" => {
            manager.clear_error().await?;
        }
        other => ui::remark(ctx, &format!("Unknown input '{other}' (r = reconnect, c = clear error)")),
    }
    Ok(())
}

/// Lines describing what changed between two snapshots
fn describe(previous: &ConnectionSnapshot, current: &ConnectionSnapshot) -> Vec<(&'static str, String)> {
    let mut lines = Vec::new();

    if previous.connection_state != current.connection_state
        || previous.retry_count != current.retry_count
    {
        let mut line = current.status_text();
        if matches!(
            current.connection_state,
            ConnectionState::Error | ConnectionState::Reconnecting
        ) {
            if let Some(error) = &current.last_error {
                line = format!("{line}: {}", error.message);
            }
        }
        lines.push(("conn", line));
    }

    let previous_user = previous.session.as_ref().map(|s| s.user_id());
    let current_user = current.session.as_ref().map(|s| s.user_id());
    if previous_user != current_user {
        let line = match &current.session {
            Some(session) => format!("Signed in as {}", session.user.label()),
            None => "Signed out".to_string(),
        };
        lines.push(("auth", line));
    }

    if previous.last_error.is_some() && current.last_error.is_none() {
        lines.push(("conn", "Error cleared".to_string()));
    }

    lines
}
