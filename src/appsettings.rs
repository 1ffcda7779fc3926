use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::scheduling::SchedulerConfig;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown timezone {0:?}")]
    InvalidTimezone(String),

    #[error("sweep_interval_secs must be positive")]
    ZeroSweepInterval,

    #[error("missed_grace_secs {0} is out of range")]
    MissedGraceOutOfRange(u64),
}

#[derive(Deserialize, Debug, Clone)]
pub struct SchedulerSettings {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub missed_grace_secs: u64,
    #[serde(default = "default_recurrence_insert_attempts")]
    pub recurrence_insert_attempts: u32,
    #[serde(default = "default_recurrence_retry_backoff_ms")]
    pub recurrence_retry_backoff_ms: u64,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct DatabaseSettings {
    /// In-memory storage is used when no url is configured.
    pub url: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MailSettings {
    #[serde(default = "default_mail_from")]
    pub from: String,
    #[serde(default = "default_reply_to")]
    pub reply_to: String,
    /// Outgoing mail is only logged when no host is configured.
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppSettings {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub mail: MailSettings,
}

impl AppSettings {
    pub fn load() -> Result<Self, SettingsError> {
        let settings = Config::builder()
            .add_source(File::with_name("appsettings").required(true))
            .add_source(File::with_name("appsettings.local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl SchedulerSettings {
    pub fn timezone(&self) -> Result<Tz, SettingsError> {
        self.timezone
            .parse()
            .map_err(|_| SettingsError::InvalidTimezone(self.timezone.clone()))
    }

    pub fn to_config(&self) -> Result<SchedulerConfig, SettingsError> {
        if self.sweep_interval_secs == 0 {
            return Err(SettingsError::ZeroSweepInterval);
        }

        let missed_grace = i64::try_from(self.missed_grace_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or(SettingsError::MissedGraceOutOfRange(self.missed_grace_secs))?;

        Ok(SchedulerConfig {
            tz: self.timezone()?,
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            missed_grace,
            recurrence_insert_attempts: self.recurrence_insert_attempts.max(1),
            recurrence_retry_backoff: Duration::from_millis(self.recurrence_retry_backoff_ms),
        })
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            sweep_interval_secs: default_sweep_interval_secs(),
            missed_grace_secs: 0,
            recurrence_insert_attempts: default_recurrence_insert_attempts(),
            recurrence_retry_backoff_ms: default_recurrence_retry_backoff_ms(),
        }
    }
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            from: default_mail_from(),
            reply_to: default_reply_to(),
            smtp_host: None,
            smtp_port: None,
            username: None,
            password: None,
        }
    }
}

fn default_timezone() -> String {
    "Asia/Ho_Chi_Minh".to_owned()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_recurrence_insert_attempts() -> u32 {
    3
}

fn default_recurrence_retry_backoff_ms() -> u64 {
    500
}

fn default_mail_from() -> String {
    "Expense Mind <reminders@moneymanagement.com>".to_owned()
}

fn default_reply_to() -> String {
    "no-reply@moneymanagement.com".to_owned()
}
