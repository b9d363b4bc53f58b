//! Health command - one diagnostic round trip

use crate::cli::args::{HealthArgs, OutputFormat};
use crate::cli::commands::connect;
use crate::config::Config;
use crate::error::{MynofiError, MynofiResult};
use crate::lifecycle::ConnectionState;
use crate::remote::HealthReport;
use crate::ui::{self, UiContext};
use std::time::Duration;

/// How long to give the realtime socket before reporting its status
const CONNECT_GRACE: Duration = Duration::from_secs(3);

/// Execute the health command
pub async fn execute(args: HealthArgs, config: &Config) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    let manager = connect::start_manager(config)?;

    if config.realtime.enabled {
        let settled = manager.wait_for(|s| {
            s.is_connected || s.connection_state == ConnectionState::Reconnecting
        });
        let _ = tokio::time::timeout(CONNECT_GRACE, settled).await;
    }

    let report = manager.check_health().await;
    manager.shutdown().await;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => render(&ctx, &report),
    }

    if report.is_healthy() {
        Ok(())
    } else {
        Err(MynofiError::User("Service is unhealthy".to_string()))
    }
}

fn render(ctx: &UiContext, report: &HealthReport) {
    ui::intro(ctx, "Mynofi Health");
    ui::key_value(ctx, "Service", &report.url);
    ui::key_value(ctx, "Checked", &report.timestamp);
    ui::key_value_status(
        ctx,
        "Realtime",
        if report.connected { "connected" } else { "not connected" },
        report.connected,
    );

    match &report.error {
        Some(error) => ui::step_error_detail(ctx, "Service unhealthy", error),
        None => ui::step_ok(ctx, "Service healthy"),
    }
}
