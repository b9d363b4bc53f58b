//! Helpers shared by commands that talk to the service

use crate::config::Config;
use crate::error::{MynofiError, MynofiResult};
use crate::lifecycle::{ConnectionManager, ConnectionSnapshot, ManagerOptions, RetryPolicy};
use crate::remote::SessionClient;
use crate::ui::{self, UiContext};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Environment variable holding the password for non-interactive logins
pub const PASSWORD_ENV: &str = "MYNOFI_PASSWORD";

/// Start a lifecycle manager over the hosted backend
pub fn start_manager(config: &Config) -> MynofiResult<ConnectionManager> {
    let client = Arc::new(SessionClient::connect(config)?);
    let options = ManagerOptions {
        policy: RetryPolicy::from_config(&config.retry),
        diagnostics: config.general.diagnostics,
    };
    Ok(ConnectionManager::start(client, options))
}

/// Same as [`start_manager`] but without the realtime socket
pub fn start_rest_only(config: &Config) -> MynofiResult<ConnectionManager> {
    let mut config = config.clone();
    config.realtime.enabled = false;
    start_manager(&config)
}

/// Wait for the session bootstrap to finish
pub async fn bootstrapped(manager: &ConnectionManager) -> MynofiResult<ConnectionSnapshot> {
    manager.wait_for(|s| !s.loading).await
}

/// Password from stdin, `MYNOFI_PASSWORD`, or an interactive prompt
pub async fn read_password(ctx: &UiContext, from_stdin: bool) -> MynofiResult<String> {
    if from_stdin {
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| MynofiError::io("reading password from stdin", e))?;
        let password = line.trim_end_matches(['\r', '\n']).to_string();
        if password.is_empty() {
            return Err(MynofiError::User("Empty password on stdin".to_string()));
        }
        return Ok(password);
    }

    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }

    ui::password(ctx, "Password").await
}
