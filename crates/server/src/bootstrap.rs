use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use meetmatter_bot::{CommandDispatcher, EntityCache, TopicCollector};
use meetmatter_core::config::{AppConfig, ConfigError};
use meetmatter_core::User;
use meetmatter_mattermost::api::{ApiError, ChatApi};
use meetmatter_mattermost::events::EventDispatcher;
use meetmatter_mattermost::rest::RestClient;
use meetmatter_mattermost::socket::{ListenRunner, ReconnectPolicy, WebSocketTransport};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub bot: User,
    pub runner: ListenRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not load environment file: {0}")]
    EnvFile(#[source] dotenvy::Error),
    #[error("mattermost client setup failed: {0}")]
    Client(#[source] ApiError),
    #[error("could not resolve the bot identity: {0}")]
    Identity(#[source] ApiError),
}

/// Loads `path`, or the nearest `.env` above the working directory, into the
/// process environment before config is read. Variables already set win.
/// Only an explicit `path` is required to exist.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, BootstrapError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(BootstrapError::EnvFile)?;
            Ok(Some(path.to_path_buf()))
        }
        None => match dotenvy::dotenv() {
            Ok(found) => Ok(Some(found)),
            Err(error) if error.not_found() => Ok(None),
            Err(error) => Err(BootstrapError::EnvFile(error)),
        },
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        server_url = %config.mattermost.server_url,
        "starting application bootstrap"
    );

    let api: Arc<dyn ChatApi> = Arc::new(
        RestClient::new(
            &config.mattermost.server_url,
            config.mattermost.token.clone(),
            Duration::from_secs(config.mattermost.request_timeout_secs),
        )
        .map_err(BootstrapError::Client)?,
    );

    let bot = api.me().await.map_err(BootstrapError::Identity)?;
    info!(
        event_name = "system.bootstrap.identity_resolved",
        correlation_id = "bootstrap",
        bot_user_id = %bot.id,
        bot_username = %bot.username,
        "bot identity resolved"
    );

    let commands = CommandDispatcher::new(
        api,
        bot.clone(),
        EntityCache::new(config.bot.cache_failures),
        TopicCollector::new(config.bot.topic_page_size, config.bot.topic_max_pages),
    );
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(commands);

    let transport = Arc::new(WebSocketTransport::new(
        config.mattermost.websocket_url(),
        config.mattermost.token.clone(),
    ));
    let policy = ReconnectPolicy {
        max_retries: config.listener.max_retries,
        base_delay_ms: config.listener.base_delay_ms,
        max_delay_ms: config.listener.max_delay_ms,
    };
    let runner = ListenRunner::new(transport, dispatcher, policy);

    Ok(Application { config, bot, runner })
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use meetmatter_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use tempfile::TempDir;

    use super::{bootstrap_with_config, load_env_file, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    fn overrides(server_url: &str, token: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                server_url: Some(server_url.to_string()),
                token: token.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_token() {
        let result = bootstrap(overrides("http://localhost:8065", Some(" "))).await;

        let error = result.err().expect("missing token should fail");
        assert!(matches!(error, BootstrapError::Config(_)));
        assert!(error.to_string().contains("mattermost.token"));
    }

    #[test]
    fn explicit_env_file_is_loaded_without_overriding_the_environment() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("meetmatter.env");
        fs::write(
            &path,
            "MEETMATTER_ENV_FILE_FRESH=from-file\nMEETMATTER_ENV_FILE_PRESET=from-file\n",
        )
        .expect("write env file");
        env::set_var("MEETMATTER_ENV_FILE_PRESET", "from-process");

        let loaded = load_env_file(Some(path.as_path())).expect("env file should load");

        assert_eq!(loaded.as_deref(), Some(path.as_path()));
        assert_eq!(env::var("MEETMATTER_ENV_FILE_FRESH").as_deref(), Ok("from-file"));
        assert_eq!(env::var("MEETMATTER_ENV_FILE_PRESET").as_deref(), Ok("from-process"));
        env::remove_var("MEETMATTER_ENV_FILE_FRESH");
        env::remove_var("MEETMATTER_ENV_FILE_PRESET");
    }

    #[test]
    fn missing_explicit_env_file_is_an_error() {
        let dir = TempDir::new().expect("temp dir");

        let missing = dir.path().join("absent.env");

        let result = load_env_file(Some(missing.as_path()));

        assert!(matches!(result, Err(BootstrapError::EnvFile(_))));
    }

    #[tokio::test]
    async fn rejected_token_is_an_identity_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v4/users/me")
            .with_status(401)
            .with_body(r#"{"id":"api.context.session_expired.app_error","message":"Invalid or expired session, please login again.","status_code":401}"#)
            .create_async()
            .await;

        let result = bootstrap(overrides(&server.url(), Some("stale-token"))).await;

        let error = result.err().expect("401 should fail bootstrap");
        assert!(matches!(error, BootstrapError::Identity(_)));
        assert!(error.to_string().contains("401"));
    }

    #[tokio::test]
    async fn bootstrap_resolves_bot_identity() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v4/users/me")
            .match_header("authorization", "Bearer bot-token")
            .with_status(200)
            .with_body(r#"{"id":"bot1","username":"meetbot","nickname":"Meeting Bot"}"#)
            .create_async()
            .await;

        let app = bootstrap(overrides(&server.url(), Some("bot-token")))
            .await
            .unwrap_or_else(|error| panic!("bootstrap should succeed: {error}"));

        assert_eq!(app.bot.id, "bot1");
        assert_eq!(app.bot.display_name, "Meeting Bot");
        assert!(app.config.mattermost.websocket_url().starts_with("ws://"));
        mock.assert_async().await;
    }
}
