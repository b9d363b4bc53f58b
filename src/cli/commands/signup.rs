//! Signup command - create an account

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::SignupArgs;
use crate::cli::commands::connect;
use crate::config::Config;
use crate::error::MynofiResult;
use crate::ui::{self, TaskSpinner, UiContext};
use serde_json::{json, Map, Value};

/// Execute the signup command
pub async fn execute(args: SignupArgs, config: &Config) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    let password = connect::read_password(&ctx, args.password_stdin).await?;
    let attributes = attributes_object(&args.attributes);

    let manager = connect::start_rest_only(config)?;
    connect::bootstrapped(&manager).await?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Creating account {}...", args.email));
    let result = manager.sign_up(&args.email, &password, attributes).await;

    AuditLog::new(config)
        .record(
            AuditEvent::SignUp,
            json!({ "email": args.email, "success": result.is_ok() }),
        )
        .await;
    manager.shutdown().await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            spinner.stop_error("Sign-up failed");
            return Err(e);
        }
    };

    match outcome.session {
        Some(_) => spinner.stop(&format!("Account created; signed in as {}", outcome.user.label())),
        None => {
            spinner.stop("Account created");
            ui::step_info(&ctx, "Confirm the address from your inbox, then run: mynofi login");
        }
    }

    Ok(())
}

fn attributes_object(pairs: &[(String, String)]) -> Value {
    let map: Map<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(map)
}
