//! Daemon configuration, read from the environment.

use spot_health::{HealthCheckPolicy, RemediationPolicy};
use spot_provider::Credentials;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_CHECK_INTERVAL: u64 = 60;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_RETRY_INTERVAL: u64 = 30;
const DEFAULT_NOTIFY_COOLDOWN: u64 = 300;
const DEFAULT_HEALTH_CHECK_TIMEOUT: u64 = 300;
const DEFAULT_HEALTH_CHECK_INTERVAL: u64 = 10;
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[redacted]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Everything the daemon needs. `Debug` never prints secrets.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    /// `None` when the bot is disabled.
    pub telegram: Option<TelegramConfig>,
    pub check_interval: Duration,
    pub retry_count: u32,
    pub retry_interval: Duration,
    pub notify_cooldown: Duration,
    pub health_check_enabled: bool,
    pub health_check_timeout: Duration,
    pub health_check_interval: Duration,
    /// `None` disables periodic rediscovery.
    pub discovery_interval: Option<Duration>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Read from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let secs = |key: &str, default: u64| get(key).and_then(|v| v.parse::<u64>().ok()).unwrap_or(default);
        let interval = |key: &str, default: u64| Duration::from_secs(secs(key, default).max(1));

        let credentials = Credentials::new(
            require("ALIYUN_ACCESS_KEY_ID")?,
            require("ALIYUN_ACCESS_KEY_SECRET")?,
        );

        let telegram = if get("TELEGRAM_ENABLED").and_then(|v| parse_bool(&v)).unwrap_or(true) {
            Some(TelegramConfig {
                bot_token: require("TELEGRAM_BOT_TOKEN")?,
                chat_id: require("TELEGRAM_CHAT_ID")?,
            })
        } else {
            None
        };

        let retry_count = get("RETRY_COUNT")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRY_COUNT)
            .max(1);

        let discovery_secs = secs("DISCOVERY_INTERVAL", 0);
        let log_level = get("LOG_LEVEL")
            .map(|v| v.to_lowercase())
            .filter(|v| LOG_LEVELS.contains(&v.as_str()))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            credentials,
            telegram,
            check_interval: interval("CHECK_INTERVAL", DEFAULT_CHECK_INTERVAL),
            retry_count,
            retry_interval: interval("RETRY_INTERVAL", DEFAULT_RETRY_INTERVAL),
            notify_cooldown: Duration::from_secs(secs("NOTIFY_COOLDOWN", DEFAULT_NOTIFY_COOLDOWN)),
            health_check_enabled: get("HEALTH_CHECK_ENABLED")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            health_check_timeout: interval("HEALTH_CHECK_TIMEOUT", DEFAULT_HEALTH_CHECK_TIMEOUT),
            health_check_interval: interval("HEALTH_CHECK_INTERVAL", DEFAULT_HEALTH_CHECK_INTERVAL),
            discovery_interval: (discovery_secs > 0).then(|| Duration::from_secs(discovery_secs)),
            log_level,
            log_file: get("LOG_FILE").map(PathBuf::from),
        })
    }

    pub fn remediation_policy(&self) -> RemediationPolicy {
        RemediationPolicy {
            max_attempts: self.retry_count,
            retry_interval: self.retry_interval,
            health_check: self.health_check_enabled.then(|| HealthCheckPolicy {
                timeout: self.health_check_timeout,
                interval: self.health_check_interval,
            }),
            ..RemediationPolicy::default()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
