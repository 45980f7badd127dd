use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mattermost: MattermostConfig,
    pub bot: BotConfig,
    pub listener: ListenerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct MattermostConfig {
    pub server_url: String,
    pub websocket_url: Option<String>,
    pub token: SecretString,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct BotConfig {
    pub topic_page_size: u32,
    pub topic_max_pages: u32,
    pub cache_failures: CacheFailurePolicy,
}

#[derive(Clone, Debug)]
pub struct ListenerConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_retries: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// What the entity cache does when a lookup fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheFailurePolicy {
    /// Leave the cache untouched so the next lookup fetches again.
    Retry,
    /// Cache a placeholder entity for the rest of the session.
    CacheFallback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub websocket_url: Option<String>,
    pub token: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mattermost: MattermostConfig {
                server_url: "http://localhost:8065".to_string(),
                websocket_url: None,
                token: String::new().into(),
                request_timeout_secs: 30,
            },
            bot: BotConfig {
                topic_page_size: 100,
                topic_max_pages: 1,
                cache_failures: CacheFailurePolicy::Retry,
            },
            listener: ListenerConfig {
                base_delay_ms: 5_000,
                max_delay_ms: 5_000,
                max_retries: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl MattermostConfig {
    /// Explicit WebSocket URL, or the one derived from the REST server URL.
    pub fn websocket_url(&self) -> String {
        if let Some(url) = &self.websocket_url {
            return url.clone();
        }

        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/api/v4/websocket")
    }
}

impl std::str::FromStr for CacheFailurePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retry" => Ok(Self::Retry),
            "cache_fallback" | "fallback" => Ok(Self::CacheFallback),
            other => Err(ConfigError::Validation(format!(
                "unsupported cache failure policy `{other}` (expected retry|cache_fallback)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("meetmatter.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(mattermost) = patch.mattermost {
            if let Some(server_url) = mattermost.server_url {
                self.mattermost.server_url = server_url;
            }
            if let Some(websocket_url) = mattermost.websocket_url {
                self.mattermost.websocket_url = Some(websocket_url);
            }
            if let Some(token) = mattermost.token {
                self.mattermost.token = token.into();
            }
            if let Some(request_timeout_secs) = mattermost.request_timeout_secs {
                self.mattermost.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(bot) = patch.bot {
            if let Some(topic_page_size) = bot.topic_page_size {
                self.bot.topic_page_size = topic_page_size;
            }
            if let Some(topic_max_pages) = bot.topic_max_pages {
                self.bot.topic_max_pages = topic_max_pages;
            }
            if let Some(cache_failures) = bot.cache_failures {
                self.bot.cache_failures = cache_failures;
            }
        }

        if let Some(listener) = patch.listener {
            if let Some(base_delay_ms) = listener.base_delay_ms {
                self.listener.base_delay_ms = base_delay_ms;
            }
            if let Some(max_delay_ms) = listener.max_delay_ms {
                self.listener.max_delay_ms = max_delay_ms;
            }
            if let Some(max_retries) = listener.max_retries {
                self.listener.max_retries = Some(max_retries);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Bare `server`, `wsserver` and `token` are the keys of legacy `.env` deployments.
        if let Some(value) = read_env("MEETMATTER_SERVER_URL").or_else(|| read_env("server")) {
            self.mattermost.server_url = value;
        }
        if let Some(value) = read_env("MEETMATTER_WEBSOCKET_URL").or_else(|| read_env("wsserver")) {
            self.mattermost.websocket_url = Some(value);
        }
        if let Some(value) = read_env("MEETMATTER_TOKEN").or_else(|| read_env("token")) {
            self.mattermost.token = value.into();
        }
        if let Some(value) = read_env("MEETMATTER_REQUEST_TIMEOUT_SECS") {
            self.mattermost.request_timeout_secs =
                parse_u64("MEETMATTER_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("MEETMATTER_TOPIC_PAGE_SIZE") {
            self.bot.topic_page_size = parse_u32("MEETMATTER_TOPIC_PAGE_SIZE", &value)?;
        }
        if let Some(value) = read_env("MEETMATTER_TOPIC_MAX_PAGES") {
            self.bot.topic_max_pages = parse_u32("MEETMATTER_TOPIC_MAX_PAGES", &value)?;
        }
        if let Some(value) = read_env("MEETMATTER_CACHE_FAILURES") {
            self.bot.cache_failures = value.parse()?;
        }

        if let Some(value) = read_env("MEETMATTER_RECONNECT_BASE_DELAY_MS") {
            self.listener.base_delay_ms = parse_u64("MEETMATTER_RECONNECT_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("MEETMATTER_RECONNECT_MAX_DELAY_MS") {
            self.listener.max_delay_ms = parse_u64("MEETMATTER_RECONNECT_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("MEETMATTER_RECONNECT_MAX_RETRIES") {
            self.listener.max_retries =
                Some(parse_u32("MEETMATTER_RECONNECT_MAX_RETRIES", &value)?);
        }

        let log_level =
            read_env("MEETMATTER_LOGGING_LEVEL").or_else(|| read_env("MEETMATTER_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("MEETMATTER_LOGGING_FORMAT").or_else(|| read_env("MEETMATTER_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(server_url) = overrides.server_url {
            self.mattermost.server_url = server_url;
        }
        if let Some(websocket_url) = overrides.websocket_url {
            self.mattermost.websocket_url = Some(websocket_url);
        }
        if let Some(token) = overrides.token {
            self.mattermost.token = token.into();
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_mattermost(&self.mattermost)?;
        validate_bot(&self.bot)?;
        validate_listener(&self.listener)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("meetmatter.toml"), PathBuf::from("config/meetmatter.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_mattermost(mattermost: &MattermostConfig) -> Result<(), ConfigError> {
    let server_url = mattermost.server_url.trim();
    if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "mattermost.server_url must start with http:// or https://".to_string(),
        ));
    }

    if let Some(websocket_url) = &mattermost.websocket_url {
        if !websocket_url.starts_with("ws://") && !websocket_url.starts_with("wss://") {
            return Err(ConfigError::Validation(
                "mattermost.websocket_url must start with ws:// or wss://".to_string(),
            ));
        }
    }

    if mattermost.token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "mattermost.token is required. Create a bot account under System Console > Integrations > Bot Accounts and copy its access token".to_string(),
        ));
    }

    if mattermost.request_timeout_secs == 0 || mattermost.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "mattermost.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_bot(bot: &BotConfig) -> Result<(), ConfigError> {
    if bot.topic_page_size == 0 || bot.topic_page_size > 200 {
        return Err(ConfigError::Validation(
            "bot.topic_page_size must be in range 1..=200".to_string(),
        ));
    }

    if bot.topic_max_pages == 0 {
        return Err(ConfigError::Validation(
            "bot.topic_max_pages must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_listener(listener: &ListenerConfig) -> Result<(), ConfigError> {
    if listener.base_delay_ms > listener.max_delay_ms {
        return Err(ConfigError::Validation(
            "listener.base_delay_ms must not exceed listener.max_delay_ms".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    mattermost: Option<MattermostPatch>,
    bot: Option<BotPatch>,
    listener: Option<ListenerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct MattermostPatch {
    server_url: Option<String>,
    websocket_url: Option<String>,
    token: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct BotPatch {
    topic_page_size: Option<u32>,
    topic_max_pages: Option<u32>,
    cache_failures: Option<CacheFailurePolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct ListenerPatch {
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
