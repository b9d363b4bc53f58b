//! Whoami command - show the signed-in user

use crate::cli::commands::connect;
use crate::config::Config;
use crate::error::MynofiResult;
use crate::ui::{self, UiContext};

/// Execute the whoami command
pub async fn execute(config: &Config) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    let manager = connect::start_rest_only(config)?;
    connect::bootstrapped(&manager).await?;
    let user = manager.client().get_user().await;
    manager.shutdown().await;

    match user {
        Some(user) => {
            ui::key_value(&ctx, "Email", user.email.as_deref().unwrap_or("-"));
            ui::key_value(&ctx, "ID", &user.id);
            if user.metadata.as_object().is_some_and(|m| !m.is_empty()) {
                ui::key_value(&ctx, "Attributes", &user.metadata.to_string());
            }
        }
        None => ui::step_warn_hint(&ctx, "Not signed in", "Run: mynofi login --email <email>"),
    }

    Ok(())
}
