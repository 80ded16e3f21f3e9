//! Configuration management for Newscast
//!
//! The config file is TOML. Secrets never live in it: the file names the
//! environment variables that hold them, and [`Config::secrets`] resolves those
//! at startup.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::ResponseFormat;
use crate::error::{ConfigError, Result};
use crate::ledger::DEFAULT_RETENTION_DAYS;

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "NEWSCAST_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ledger: LedgerConfig,
    pub feeds: FeedsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    pub notifier: Option<NotifierConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    pub urls: Vec<String>,
    #[serde(default = "default_feed_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Seconds between the start of one cycle and the next
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            notify_timeout_secs: default_notify_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_classifier_key_env")]
    pub api_key_env: String,
    /// Subject the account posts about
    #[serde(default = "default_topic")]
    pub topic: String,
    /// `json` or `plain`
    #[serde(default = "default_response_format")]
    pub response_format: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_requests_per_day")]
    pub requests_per_day: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_classifier_cooldown")]
    pub rate_limit_cooldown_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_classifier_endpoint(),
            model: default_model(),
            api_key_env: default_classifier_key_env(),
            topic: default_topic(),
            response_format: default_response_format(),
            temperature: default_temperature(),
            requests_per_minute: default_requests_per_minute(),
            requests_per_day: default_requests_per_day(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            rate_limit_cooldown_secs: default_classifier_cooldown(),
            timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_x_api_base")]
    pub api_base: String,
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    #[serde(default = "default_posts_per_day")]
    pub posts_per_day: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_publisher_cooldown")]
    pub rate_limit_cooldown_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            api_base: default_x_api_base(),
            access_token_env: default_access_token_env(),
            posts_per_day: default_posts_per_day(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay(),
            rate_limit_cooldown_secs: default_publisher_cooldown(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// Telegram alert channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
    #[serde(default = "default_chat_id_env")]
    pub chat_id_env: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Secrets resolved from the environment
pub struct Secrets {
    pub classifier_api_key: SecretString,
    pub publisher_access_token: SecretString,
    /// Bot token and chat id, when a notifier is configured
    pub telegram: Option<(SecretString, String)>,
}

fn default_ledger_path() -> String {
    "~/.local/share/newscast/ledger.txt".to_string()
}

fn default_retention_days() -> i64 {
    DEFAULT_RETENTION_DAYS
}

fn default_feed_timeout() -> u64 {
    20
}

fn default_user_agent() -> String {
    format!("newscast/{}", env!("CARGO_PKG_VERSION"))
}

fn default_interval() -> u64 {
    3600
}

fn default_notify_timeout() -> u64 {
    10
}

fn default_classifier_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_classifier_key_env() -> String {
    "NEWSCAST_CLASSIFIER_API_KEY".to_string()
}

fn default_topic() -> String {
    "cryptocurrency".to_string()
}

fn default_response_format() -> String {
    "json".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_requests_per_minute() -> u32 {
    15
}

fn default_requests_per_day() -> u32 {
    1500
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_classifier_cooldown() -> u64 {
    60
}

fn default_publisher_cooldown() -> u64 {
    900
}

fn default_request_timeout() -> u64 {
    30
}

fn default_x_api_base() -> String {
    "https://api.x.com/2".to_string()
}

fn default_access_token_env() -> String {
    "NEWSCAST_X_ACCESS_TOKEN".to_string()
}

fn default_posts_per_day() -> u32 {
    17
}

fn default_bot_token_env() -> String {
    "NEWSCAST_TELEGRAM_BOT_TOKEN".to_string()
}

fn default_chat_id_env() -> String {
    "NEWSCAST_TELEGRAM_CHAT_ID".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load and validate configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.feeds.urls.is_empty() {
            return Err(ConfigError::MissingField("feeds.urls".to_string()).into());
        }
        for feed in &self.feeds.urls {
            match url::Url::parse(feed) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                Ok(parsed) => {
                    return Err(invalid(
                        "feeds.urls",
                        format!("unsupported scheme '{}' in {}", parsed.scheme(), feed),
                    ))
                }
                Err(e) => return Err(invalid("feeds.urls", format!("{}: {}", feed, e))),
            }
        }

        let positive = [
            ("schedule.interval_secs", self.schedule.interval_secs),
            ("classifier.requests_per_minute", self.classifier.requests_per_minute as u64),
            ("classifier.requests_per_day", self.classifier.requests_per_day as u64),
            ("classifier.max_attempts", self.classifier.max_attempts as u64),
            ("publisher.posts_per_day", self.publisher.posts_per_day as u64),
            ("publisher.max_attempts", self.publisher.max_attempts as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero".to_string()));
            }
        }

        if self.ledger.retention_days < 1 {
            return Err(invalid("ledger.retention_days", "must be at least 1".to_string()));
        }

        self.response_format()?;
        Ok(())
    }

    pub fn response_format(&self) -> Result<ResponseFormat> {
        self.classifier
            .response_format
            .parse()
            .map_err(|reason| invalid("classifier.response_format", reason))
    }

    /// Ledger path with `~` expanded
    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.ledger.path).to_string())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.schedule.interval_secs)
    }

    /// Resolve every secret named in the config from the environment
    pub fn secrets(&self) -> Result<Secrets> {
        let classifier_api_key = SecretString::from(required_env(&self.classifier.api_key_env)?);
        let publisher_access_token =
            SecretString::from(required_env(&self.publisher.access_token_env)?);
        let telegram = match &self.notifier {
            Some(notifier) => Some((
                SecretString::from(required_env(&notifier.bot_token_env)?),
                required_env(&notifier.chat_id_env)?,
            )),
            None => None,
        };

        Ok(Secrets {
            classifier_api_key,
            publisher_access_token,
            telegram,
        })
    }
}

fn invalid(field: &str, reason: String) -> crate::error::NewscastError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason,
    }
    .into()
}

fn required_env(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingField(format!("environment variable {}", name)).into()),
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("newscast").join("config.toml"))
}
