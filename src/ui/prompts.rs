//! Interactive prompts with non-interactive fallback

use super::context::UiContext;
use crate::error::{MynofiError, MynofiResult};

/// Ask for a secret without echo.
///
/// Fails in non-interactive contexts, where the caller must supply the
/// secret another way.
pub async fn password(ctx: &UiContext, message: &str) -> MynofiResult<String> {
    if !ctx.is_interactive() {
        return Err(MynofiError::User(
            "No password given; use --password-stdin or MYNOFI_PASSWORD".to_string(),
        ));
    }

    let message = message.to_string();
    let result = tokio::task::spawn_blocking(move || {
        cliclack::password(&message).mask('▪').interact()
    })
    .await
    .map_err(|e| MynofiError::User(format!("Prompt task failed: {}", e)))?;

    result.map_err(|e| MynofiError::User(format!("Prompt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_requires_terminal() {
        let ctx = UiContext::non_interactive();
        let err = password(&ctx, "Password").await.unwrap_err();
        assert!(err.to_string().contains("--password-stdin"));
    }
}
