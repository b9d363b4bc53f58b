//! Status command - show session and connection state

use crate::cli::args::{OutputFormat, StatusArgs};
use crate::cli::commands::connect;
use crate::config::Config;
use crate::error::MynofiResult;
use crate::lifecycle::ConnectionSnapshot;
use crate::ui::{self, UiContext};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    let manager = connect::start_manager(config)?;
    let mut snapshot = connect::bootstrapped(&manager).await?;

    if config.realtime.enabled && args.wait_secs > 0 {
        let settled = manager.wait_for(|s| s.is_connected || s.retries_exhausted());
        match tokio::time::timeout(Duration::from_secs(args.wait_secs), settled).await {
            Ok(result) => snapshot = result?,
            Err(_) => {
                debug!("Realtime not connected after {}s", args.wait_secs);
                snapshot = manager.snapshot();
            }
        }
    }

    let url = manager.client().url().to_string();
    manager.shutdown().await;

    match args.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status_json(&snapshot, &url))?);
        }
        OutputFormat::Table => render(&ctx, &snapshot, &url),
    }

    Ok(())
}

/// Snapshot view without tokens
pub(crate) fn status_json(snapshot: &ConnectionSnapshot, url: &str) -> serde_json::Value {
    json!({
        "url": url,
        "connection_state": snapshot.connection_state,
        "is_connected": snapshot.is_connected,
        "is_authenticated": snapshot.is_authenticated,
        "user": snapshot.session.as_ref().map(|s| &s.user),
        "retry_count": snapshot.retry_count,
        "max_retries": snapshot.max_retries,
        "last_error": snapshot.last_error,
    })
}

fn render(ctx: &UiContext, snapshot: &ConnectionSnapshot, url: &str) {
    ui::intro(ctx, "Mynofi Status");
    ui::key_value(ctx, "Service", url);
    ui::key_value_status(
        ctx,
        "Realtime",
        &snapshot.status_text(),
        snapshot.is_connected,
    );

    match &snapshot.session {
        Some(session) => ui::key_value_status(ctx, "User", session.user.label(), true),
        None => ui::key_value_status(ctx, "User", "Not signed in", false),
    }

    if snapshot.retry_count > 0 {
        ui::key_value(
            ctx,
            "Retries",
            &format!("{}/{}", snapshot.retry_count, snapshot.max_retries),
        );
    }

    if let Some(error) = &snapshot.last_error {
        ui::step_error_detail(ctx, "Last error", &error.message);
    }

    if snapshot.retries_exhausted() {
        ui::step_warn_hint(
            ctx,
            "Automatic reconnects exhausted",
            "Run: mynofi watch, then type r to retry",
        );
    }

    if snapshot.is_healthy() {
        ui::outro_success(ctx, "Connection healthy");
    } else {
        ui::outro_warn(ctx, "Connection degraded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::lifecycle::ConnectionState;
    use crate::remote::{Session, User};

    fn snapshot(session: Option<Session>) -> ConnectionSnapshot {
        ConnectionSnapshot {
            is_authenticated: session.is_some(),
            session,
            loading: false,
            connection_state: ConnectionState::Error,
            is_connected: false,
            last_error: Some(ServiceError::transport("socket closed")),
            retry_count: 5,
            max_retries: 5,
        }
    }

    #[test]
    fn json_view_omits_tokens() {
        let session = Session {
            access_token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_at: None,
            user: User {
                id: "u1".to_string(),
                email: Some("a@example.com".to_string()),
                metadata: serde_json::Value::Null,
            },
        };
        let view = status_json(&snapshot(Some(session)), "https://x.co");
        let text = view.to_string();

        assert!(!text.contains("secret-access"));
        assert!(!text.contains("secret-refresh"));
        assert_eq!(view["user"]["email"], "a@example.com");
        assert_eq!(view["connection_state"], "error");
        assert_eq!(view["last_error"]["kind"], "transport");
    }

    #[test]
    fn table_renders_plain() {
        render(&UiContext::non_interactive(), &snapshot(None), "https://x.co");
    }
}
