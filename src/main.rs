//! Mynofi - connection lifecycle client
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use mynofi::cli::{commands, Cli, Commands, LogFormat};
use mynofi::config::ConfigManager;
use mynofi::error::MynofiResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the log filter
const LOG_ENV: &str = "MYNOFI_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8, format: LogFormat) {
    // 0 = warn, 1 = info, 2+ = debug; MYNOFI_LOG wins when set
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("mynofi=warn"),
        1 => EnvFilter::new("mynofi=info"),
        _ => EnvFilter::new("mynofi=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.without_time().init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run() -> MynofiResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    // Completions need neither config nor state
    if let Commands::Completions { shell } = cli.command {
        return commands::completions(shell);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    debug!("Using config {}", config_manager.path().display());

    let mut config = config_manager.load().await?;
    config.apply_env();

    mynofi::ui::init_theme();

    if let Commands::Config(args) = cli.command {
        return commands::config(args, &config_manager, &config).await;
    }

    config.state().ensure().await?;

    match cli.command {
        Commands::Completions { .. } | Commands::Config(_) => unreachable!("handled above"),
        Commands::Status(args) => commands::status(args, &config).await,
        Commands::Health(args) => commands::health(args, &config).await,
        Commands::Login(args) => commands::login(args, &config).await,
        Commands::Signup(args) => commands::signup(args, &config).await,
        Commands::Logout => commands::logout(&config).await,
        Commands::Whoami => commands::whoami(&config).await,
        Commands::Watch(args) => commands::watch(args, &config).await,
    }
}
