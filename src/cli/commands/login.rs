//! Login command - sign in with email and password

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::LoginArgs;
use crate::cli::commands::connect;
use crate::config::Config;
use crate::error::MynofiResult;
use crate::ui::{self, TaskSpinner, UiContext};
use serde_json::json;

/// Execute the login command
pub async fn execute(args: LoginArgs, config: &Config) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    let password = connect::read_password(&ctx, args.password_stdin).await?;

    let manager = connect::start_rest_only(config)?;
    connect::bootstrapped(&manager).await?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Signing in as {}...", args.email));
    let result = manager.sign_in(&args.email, &password).await;

    AuditLog::new(config)
        .record(
            AuditEvent::SignIn,
            json!({ "email": args.email, "success": result.is_ok() }),
        )
        .await;
    manager.shutdown().await;

    let session = match result {
        Ok(session) => session,
        Err(e) => {
            spinner.stop_error("Sign-in failed");
            return Err(e);
        }
    };

    spinner.stop(&format!("Signed in as {}", session.user.label()));
    if !config.auth.persist_session {
        ui::remark(
            &ctx,
            "auth.persist_session is false; the session ends with this command",
        );
    }

    Ok(())
}
