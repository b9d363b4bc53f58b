//! Logout command - end the current session

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::commands::connect;
use crate::config::Config;
use crate::error::MynofiResult;
use crate::ui::{self, UiContext};
use serde_json::json;

/// Execute the logout command
pub async fn execute(config: &Config) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    let manager = connect::start_rest_only(config)?;
    let snapshot = connect::bootstrapped(&manager).await?;

    let Some(session) = snapshot.session else {
        manager.shutdown().await;
        ui::step_info(&ctx, "Not signed in");
        return Ok(());
    };

    let result = manager.sign_out().await;
    AuditLog::new(config)
        .record(
            AuditEvent::SignOut,
            json!({ "user_id": session.user_id(), "success": result.is_ok() }),
        )
        .await;
    manager.shutdown().await;
    result?;

    ui::step_ok(&ctx, &format!("Signed out {}", session.user.label()));
    Ok(())
}
