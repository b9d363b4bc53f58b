//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{MynofiError, MynofiResult};
use crate::ui::{self, UiContext};

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.audit_log",
    "general.diagnostics",
    "general.state_dir",
    "service.url",
    "service.anon_key",
    "service.application_name",
    "service.request_timeout_ms",
    "realtime.enabled",
    "realtime.events_per_second",
    "realtime.heartbeat_ms",
    "realtime.timeout_ms",
    "auth.persist_session",
    "auth.auto_refresh_token",
    "retry.max_retries",
    "retry.base_delay_ms",
    "retry.max_delay_ms",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> MynofiResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => set_value(manager, &key, &value).await?,
    }

    Ok(())
}

fn show_config(config: &Config) -> MynofiResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(
        &ctx,
        &format!("Configuration initialized at {}", path.display()),
    );
    ui::remark(&ctx, "Next: mynofi config set service.url <url>");

    Ok(())
}

async fn set_value(manager: &ConfigManager, key: &str, value: &str) -> MynofiResult<()> {
    let ctx = UiContext::detect();
    // Environment overrides must not end up in the file
    let mut config = manager.load().await?;

    apply_value(&mut config, key, value)?;
    if key == "service.url" {
        config.connection_settings().map(|_| ()).or_else(|e| match e {
            MynofiError::MissingApiKey => Ok(()),
            other => Err(other),
        })?;
    }

    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| MynofiError::Internal(format!("malformed key {key}")))?;
    manager
        .set_entry(section, field, entry_item(&config, section, field)?)
        .await?;

    let shown = if key == "service.anon_key" { "<hidden>" } else { value };
    ui::step_ok(&ctx, &format!("Set {} = {}", key, shown));

    Ok(())
}

/// The parsed value of `section.field`, typed as the schema stores it
fn entry_item(config: &Config, section: &str, field: &str) -> MynofiResult<toml_edit::Item> {
    let table = toml::Value::try_from(config)?;
    match table.get(section).and_then(|s| s.get(field)) {
        Some(toml::Value::Boolean(b)) => Ok(toml_edit::value(*b)),
        Some(toml::Value::Integer(i)) => Ok(toml_edit::value(*i)),
        Some(toml::Value::String(s)) => Ok(toml_edit::value(s.as_str())),
        _ => Err(MynofiError::Internal(format!(
            "{section}.{field} is not a scalar setting"
        ))),
    }
}

/// Assign one dot-separated key
fn apply_value(config: &mut Config, key: &str, value: &str) -> MynofiResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "audit_log"] => config.general.audit_log = parse_bool(value)?,
        ["general", "diagnostics"] => config.general.diagnostics = parse_bool(value)?,
        ["general", "state_dir"] => config.general.state_dir = value.trim().to_string(),

        ["service", "url"] => config.service.url = value.trim().to_string(),
        ["service", "anon_key"] => config.service.anon_key = value.trim().to_string(),
        ["service", "application_name"] => config.service.application_name = value.to_string(),
        ["service", "request_timeout_ms"] => {
            config.service.request_timeout_ms = parse_number(value)?
        }

        ["realtime", "enabled"] => config.realtime.enabled = parse_bool(value)?,
        ["realtime", "events_per_second"] => {
            config.realtime.events_per_second = parse_number(value)?
        }
        ["realtime", "heartbeat_ms"] => config.realtime.heartbeat_ms = parse_number(value)?,
        ["realtime", "timeout_ms"] => config.realtime.timeout_ms = parse_number(value)?,

        ["auth", "persist_session"] => config.auth.persist_session = parse_bool(value)?,
        ["auth", "auto_refresh_token"] => config.auth.auto_refresh_token = parse_bool(value)?,

        ["retry", "max_retries"] => config.retry.max_retries = parse_number(value)?,
        ["retry", "base_delay_ms"] => config.retry.base_delay_ms = parse_number(value)?,
        ["retry", "max_delay_ms"] => config.retry.max_delay_ms = parse_number(value)?,

        _ => {
            return Err(MynofiError::User(format!(
                "Unknown config key: {}. Valid keys: {}",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> MynofiResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(MynofiError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(value: &str) -> MynofiResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| MynofiError::User(format!("Invalid number: {}", value)))
}
