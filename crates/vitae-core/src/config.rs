use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SITE_NAME: &str = "Libero Vitae";
pub const DEFAULT_HOSTNAME: &str = "http://localhost:8000";
pub const DEFAULT_MAIL_FROM: &str = "no-reply@liberovitae.com";

// Poller cadence, in milliseconds.
pub const DEFAULT_NEXT_DELAY_MS: u64 = 1_000;
pub const DEFAULT_REPROCESS_DELAY_MS: u64 = 1_000;
pub const DEFAULT_IDLE_DELAY_MS: u64 = 10_000;
pub const DEFAULT_LOCK_DURATION_MS: u64 = 600_000; // 10 minutes
pub const DEFAULT_MAX_IN_FLIGHT: usize = 8;

pub const DEFAULT_REMINDER_DELAY_DAYS: u32 = 7;

/// Top-level config (vitae.toml + VITAE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VitaeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub cron: CronConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Public identity of the site, interpolated into every outbound notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_name")]
    pub name: String,
    /// Absolute base URL without trailing slash; deep links are built from it.
    #[serde(default = "default_hostname")]
    pub hostname: String,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            hostname: default_hostname(),
            mail_from: default_mail_from(),
        }
    }
}

impl SiteConfig {
    /// The From header for every email: `"<site name> <mail_from>"`.
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.name, self.mail_from)
    }
}

/// One poller per polled collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronConfig {
    #[serde(default)]
    pub tasks: PollerSettings,
    #[serde(default)]
    pub users: PollerSettings,
    #[serde(default)]
    pub posts: PollerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerSettings {
    /// Gap between consecutive claims while work is available.
    #[serde(default = "default_next_delay_ms")]
    pub next_delay_ms: u64,
    /// Cool-down applied to a document after its handler returns.
    #[serde(default = "default_reprocess_delay_ms")]
    pub reprocess_delay_ms: u64,
    /// Gap between polls when nothing is eligible.
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
    /// How long a claim is honoured before the document becomes claimable again.
    #[serde(default = "default_lock_duration_ms")]
    pub lock_duration_ms: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Set to false to skip spawning this poller.
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            next_delay_ms: DEFAULT_NEXT_DELAY_MS,
            reprocess_delay_ms: DEFAULT_REPROCESS_DELAY_MS,
            idle_delay_ms: DEFAULT_IDLE_DELAY_MS,
            lock_duration_ms: DEFAULT_LOCK_DURATION_MS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            enabled: true,
        }
    }
}

/// When an alert cycle may move its watermark (`tasks.updated_at`) forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Only after every attempted dispatch succeeded. A failed send leaves the
    /// task untouched so the same matches are retried.
    #[default]
    AfterDispatch,
    /// Advance even when a dispatch failed. Failed sends are logged and the
    /// matches are never offered again.
    Always,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default)]
    pub watermark: WatermarkPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Days between saving an item and the reminder email about it.
    #[serde(default = "default_reminder_delay_days")]
    pub delay_days: u32,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            delay_days: DEFAULT_REMINDER_DELAY_DAYS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub email: SenderConfig,
    #[serde(default)]
    pub push: SenderConfig,
}

/// Which implementation backs a notification channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderMode {
    /// Log the message and report success. Development default.
    #[default]
    Log,
    /// POST the message to the configured relay endpoint.
    Http,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default)]
    pub mode: SenderMode,
    /// Relay URL; required when `mode = "http"`.
    pub endpoint: Option<String>,
    /// Bearer token sent to the relay, if it wants one.
    pub api_key: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_site_name() -> String {
    DEFAULT_SITE_NAME.to_string()
}
fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}
fn default_mail_from() -> String {
    DEFAULT_MAIL_FROM.to_string()
}
fn default_next_delay_ms() -> u64 {
    DEFAULT_NEXT_DELAY_MS
}
fn default_reprocess_delay_ms() -> u64 {
    DEFAULT_REPROCESS_DELAY_MS
}
fn default_idle_delay_ms() -> u64 {
    DEFAULT_IDLE_DELAY_MS
}
fn default_lock_duration_ms() -> u64 {
    DEFAULT_LOCK_DURATION_MS
}
fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}
fn default_reminder_delay_days() -> u32 {
    DEFAULT_REMINDER_DELAY_DAYS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vitae/vitae.db", home)
}

impl VitaeConfig {
    /// Load config from a TOML file with VITAE_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `VITAE_CRON__TASKS__IDLE_DELAY_MS=5000`. A missing file is not an
    /// error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::VitaeError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("VITAE_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vitae/vitae.toml", home)
}
