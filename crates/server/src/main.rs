mod bootstrap;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use meetmatter_core::config::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "meetmatter",
    about = "Mattermost meeting bot",
    long_about = "Listens to a Mattermost server and tracks meeting topics and tasks posted in group channels.",
    after_help = "Examples:\n  meetmatter --config meetmatter.toml\n  meetmatter --log-level debug --log-format json"
)]
struct Cli {
    #[arg(long, help = "Path to a TOML config file (must exist when given)")]
    config: Option<PathBuf>,
    #[arg(long, help = "Path to a .env file; defaults to the nearest .env if present")]
    env_file: Option<PathBuf>,
    #[arg(long, help = "Log level: trace, debug, info, warn or error")]
    log_level: Option<String>,
    #[arg(long, help = "Log format: compact, pretty or json")]
    log_format: Option<LogFormat>,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            require_file: self.config.is_some(),
            config_path: self.config.clone(),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                log_format: self.log_format,
                ..ConfigOverrides::default()
            },
        }
    }
}

fn init_logging(config: &AppConfig) {
    use meetmatter_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // The environment file has to be in place before config reads the environment.
    let env_file = bootstrap::load_env_file(cli.env_file.as_deref())?;
    run(cli.load_options(), env_file).await
}

async fn run(options: LoadOptions, env_file: Option<PathBuf>) -> Result<()> {
    // Logging depends on the loaded config, so config errors surface through anyhow.
    let config = AppConfig::load(options)?;
    init_logging(&config);
    tracing::debug!(env_file = ?env_file, "environment file resolved");

    let app = bootstrap::bootstrap_with_config(config).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bot_username = %app.bot.username,
        websocket_url = %app.config.mattermost.websocket_url(),
        "meetmatter started"
    );

    tokio::select! {
        result = app.runner.start() => result?,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "meetmatter stopping"
            );
        }
    }

    Ok(())
}
