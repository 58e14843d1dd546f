use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;

use crate::assistant::UserProfile;
use crate::integrations::oauth::OAuthCredentials;
use crate::retry::RetryPolicy;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    gemini_api_key: String,
    #[serde(default = "default_gemini_model")]
    gemini_model: String,
    /// Chats the bot answers. Empty means any chat.
    #[serde(default)]
    allowed_chat_ids: Vec<i64>,
    #[serde(default = "default_listen_addr")]
    listen_addr: String,
    #[serde(default = "default_webhook_path")]
    webhook_path: String,
    /// Public base URL; when set the webhook is registered with Telegram at startup.
    public_url: Option<String>,
    /// Checked against the X-Telegram-Bot-Api-Secret-Token header.
    webhook_secret: Option<String>,
    log_chat_id: Option<i64>,
    /// Directory for state files (logs, databases). Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default = "default_run_timeout_secs")]
    run_timeout_secs: u64,
    #[serde(default = "default_memory_limit")]
    memory_limit: usize,
    #[serde(default)]
    profile: ProfileConfig,
    strava: Option<OAuthCredentials>,
    google: Option<GoogleConfig>,
    #[serde(default)]
    retry: RetryPolicy,
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_run_timeout_secs() -> u64 {
    90
}

fn default_memory_limit() -> usize {
    5
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

/// The bot owner's profile, shared by every chat it answers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub home_city: Option<String>,
}

fn default_name() -> String {
    "friend".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    #[serde(flatten)]
    pub credentials: OAuthCredentials,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub allowed_chat_ids: HashSet<ChatId>,
    pub listen_addr: SocketAddr,
    pub webhook_path: String,
    pub public_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub log_chat_id: Option<ChatId>,
    /// Directory for state files (logs, databases).
    pub data_dir: PathBuf,
    pub timezone: Tz,
    pub run_timeout: Duration,
    pub memory_limit: usize,
    pub profile: ProfileConfig,
    pub strava: Option<OAuthCredentials>,
    pub google: Option<GoogleConfig>,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.gemini_api_key.trim().is_empty() {
            return Err(ConfigError::Validation("gemini_api_key is required".into()));
        }

        let listen_addr = file.listen_addr.parse::<SocketAddr>().map_err(|e| {
            ConfigError::Validation(format!("listen_addr '{}' is not a socket address: {}", file.listen_addr, e))
        })?;
        if !file.webhook_path.starts_with('/') {
            return Err(ConfigError::Validation("webhook_path must start with '/'".into()));
        }
        let timezone = file
            .timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Validation(format!("unknown timezone '{}'", file.timezone)))?;
        if file.run_timeout_secs == 0 {
            return Err(ConfigError::Validation("run_timeout_secs must be positive".into()));
        }
        // Telegram allows 1-256 characters from A-Z, a-z, 0-9, _ and -
        if let Some(ref secret) = file.webhook_secret {
            let valid = !secret.is_empty()
                && secret.len() <= 256
                && secret.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(ConfigError::Validation(
                    "webhook_secret must be 1-256 characters of A-Z, a-z, 0-9, _ or -".into()
                ));
            }
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            gemini_api_key: file.gemini_api_key,
            gemini_model: file.gemini_model,
            allowed_chat_ids: file.allowed_chat_ids.into_iter().map(ChatId).collect(),
            listen_addr,
            webhook_path: file.webhook_path,
            public_url: file.public_url.map(|u| u.trim_end_matches('/').to_string()),
            webhook_secret: file.webhook_secret,
            log_chat_id: file.log_chat_id.map(ChatId),
            data_dir,
            timezone,
            run_timeout: Duration::from_secs(file.run_timeout_secs),
            memory_limit: file.memory_limit,
            profile: file.profile,
            strava: file.strava,
            google: file.google,
            retry: file.retry,
        })
    }

    /// Full URL Telegram should post updates to.
    pub fn webhook_url(&self) -> Option<String> {
        self.public_url.as_ref().map(|base| format!("{}{}", base, self.webhook_path))
    }

    /// Profile for the given Telegram user.
    pub fn user_profile(&self, user_id: i64) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            name: self.profile.name.clone(),
            email: self.profile.email.clone(),
            home_city: self.profile.home_city.clone(),
            interests: self.profile.interests.clone(),
            timezone: self.timezone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "gemini_api_key": "g-key"
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.webhook_path, "/webhook");
        assert_eq!(config.timezone, chrono_tz::UTC);
        assert_eq!(config.run_timeout, Duration::from_secs(90));
        assert_eq!(config.memory_limit, 5);
        assert_eq!(config.retry.max_retries, 2);
        assert!(config.strava.is_none());
        assert!(config.webhook_url().is_none());
        assert!(config.allowed_chat_ids.is_empty());
    }

    #[test]
    fn test_full_config() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "gemini_api_key": "g-key",
            "allowed_chat_ids": [42],
            "public_url": "https://bot.example.com/",
            "webhook_path": "/tg",
            "webhook_secret": "s3cret_token",
            "timezone": "Asia/Kolkata",
            "profile": { "name": "Rohan", "home_city": "Pune", "interests": ["running"] },
            "strava": { "client_id": "1", "client_secret": "x" },
            "google": { "client_id": "2", "client_secret": "y", "calendar_id": "runs@group.calendar.google.com" },
            "retry": { "max_retries": 4 }
        }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.webhook_url().as_deref(), Some("https://bot.example.com/tg"));
        assert_eq!(config.allowed_chat_ids, HashSet::from([ChatId(42)]));
        assert_eq!(config.strava.as_ref().unwrap().redirect_uri, "http://localhost/exchange_token");
        assert_eq!(config.google.as_ref().unwrap().calendar_id, "runs@group.calendar.google.com");
        assert_eq!(config.retry.max_retries, 4);
        assert_eq!(config.retry.initial_backoff_ms, 500);

        let profile = config.user_profile(42);
        assert_eq!(profile.user_id, "42");
        assert_eq!(profile.home_city.as_deref(), Some("Pune"));
        assert_eq!(profile.timezone, chrono_tz::Asia::Kolkata);
    }

    #[test]
    fn test_missing_gemini_key() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "gemini_api_key": " "
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("gemini_api_key"));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["", "invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let file = write_config(&format!(
                r#"{{ "telegram_bot_token": "{token}", "gemini_api_key": "k" }}"#
            ));
            let err = assert_err(Config::load(file.path()));
            assert!(matches!(err, ConfigError::Validation(_)), "token {token:?}");
        }
    }

    #[test]
    fn test_unknown_timezone() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "gemini_api_key": "k",
            "timezone": "Mars/Olympus"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_bad_listen_addr_and_path() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "gemini_api_key": "k",
            "listen_addr": "localhost"
        }"#);
        assert!(assert_err(Config::load(file.path())).to_string().contains("listen_addr"));

        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "gemini_api_key": "k",
            "webhook_path": "webhook"
        }"#);
        assert!(assert_err(Config::load(file.path())).to_string().contains("webhook_path"));
    }

    #[test]
    fn test_invalid_webhook_secret() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "gemini_api_key": "k",
            "webhook_secret": "has spaces!"
        }"#);
        assert!(assert_err(Config::load(file.path())).to_string().contains("webhook_secret"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
