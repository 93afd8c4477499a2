//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::bot::MonitorConfig;
use crate::classify::openrouter::DEFAULT_MODEL;
use crate::error::ConfigError;
use crate::queue::WorkerConfig;

/// Everything the bot reads from its environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub openrouter_api_key: SecretString,
    pub model: String,
    /// Apps Script web-app URL that receives task rows.
    pub script_url: String,
    /// Telegram is used when set, otherwise the stdin channel.
    pub telegram_token: Option<SecretString>,
    pub telegram_allowed_users: Vec<String>,
    pub db_path: PathBuf,
    pub workers: usize,
    pub poll_interval: Duration,
    pub monitor_interval: Duration,
    pub monitor_timeout: Duration,
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub shutdown_timeout: Duration,
    pub port: u16,
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let workers: usize = nonzero("TODO_BOT_WORKERS", parse_or(&get, "TODO_BOT_WORKERS", 2)?)?;
        let poll_ms: u64 = nonzero(
            "TODO_BOT_POLL_INTERVAL_MS",
            parse_or(&get, "TODO_BOT_POLL_INTERVAL_MS", 500)?,
        )?;
        let monitor_secs: u64 = nonzero(
            "TODO_BOT_MONITOR_INTERVAL_SECS",
            parse_or(&get, "TODO_BOT_MONITOR_INTERVAL_SECS", 2)?,
        )?;
        let sweep_secs: u64 = nonzero(
            "TODO_BOT_SWEEP_INTERVAL_SECS",
            parse_or(&get, "TODO_BOT_SWEEP_INTERVAL_SECS", 3600)?,
        )?;

        let retention_days: u64 = parse_or(&get, "TODO_BOT_RETENTION_DAYS", 7)?;

        Ok(Self {
            openrouter_api_key: SecretString::from(required("OPENROUTER_API_KEY")?),
            model: get("TODO_BOT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            script_url: required("GOOGLE_SCRIPT_URL")?,
            telegram_token: get("TELEGRAM_BOT_TOKEN").map(SecretString::from),
            telegram_allowed_users: get("TELEGRAM_ALLOWED_USERS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            db_path: get("TODO_BOT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/todo-bot.db")),
            workers,
            poll_interval: Duration::from_millis(poll_ms),
            monitor_interval: Duration::from_secs(monitor_secs),
            monitor_timeout: Duration::from_secs(parse_or(
                &get,
                "TODO_BOT_MONITOR_TIMEOUT_SECS",
                600,
            )?),
            retention: Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)),
            sweep_interval: Duration::from_secs(sweep_secs),
            shutdown_timeout: Duration::from_secs(parse_or(
                &get,
                "TODO_BOT_SHUTDOWN_TIMEOUT_SECS",
                30,
            )?),
            port: parse_or(&get, "TODO_BOT_PORT", 8080)?,
            log_dir: get("TODO_BOT_LOG_DIR").map(PathBuf::from),
        })
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            workers: self.workers,
            poll_interval: self.poll_interval,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: self.monitor_interval,
            timeout: self.monitor_timeout,
        }
    }

    /// Human-readable allowlist for the startup banner.
    pub fn allowed_users_label(&self) -> String {
        if self.telegram_allowed_users.iter().any(|u| u == "*") {
            "everyone".to_string()
        } else if self.telegram_allowed_users.is_empty() {
            "none (deny all)".to_string()
        } else {
            self.telegram_allowed_users.join(", ")
        }
    }
}

/// Counts and intervals that must be at least 1.
fn nonzero<T: Default + PartialEq>(key: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be at least 1".into(),
        });
    }
    Ok(value)
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}
