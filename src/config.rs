//! Configuration types for price-sentinel

use chrono::Duration;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the Telegram bot token
pub const TELEGRAM_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";
/// Environment variable holding the Telegram chat identifier
pub const TELEGRAM_CHAT_ENV: &str = "TELEGRAM_CHAT_ID";
/// Environment variable overriding `store.database_url`
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Configuration errors that are fatal at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential was not provided
    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),
    /// A value is out of its valid range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub quarantine: QuarantineConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub quote_source: QuoteSourceConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Symbol rotation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RotationConfig {
    /// Symbols sampled per run
    #[serde(default = "default_slice_size")]
    pub slice_size: usize,

    /// Width of one rotation slot in minutes
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,

    /// Fixed modulus for the rotation phase, independent of universe size
    #[serde(default = "default_universe_cap")]
    pub universe_cap: usize,

    /// Page size when reading the symbol universe
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_slice_size() -> usize {
    500
}
fn default_slot_minutes() -> u32 {
    15
}
fn default_universe_cap() -> usize {
    100_000
}
fn default_page_size() -> usize {
    1000
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            slice_size: default_slice_size(),
            slot_minutes: default_slot_minutes(),
            universe_cap: default_universe_cap(),
            page_size: default_page_size(),
        }
    }
}

/// Quarantine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuarantineConfig {
    /// Quarantine duration in days
    #[serde(default = "default_quarantine_days")]
    pub days: i64,

    /// Consecutive failed fetches before a symbol is quarantined
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_quarantine_days() -> i64 {
    7
}
fn default_failure_threshold() -> u32 {
    1
}

impl Default for QuarantineConfig {
    fn default() -> Self {
        Self {
            days: default_quarantine_days(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Alert detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Threshold percent used when a symbol has no AlertConfig
    #[serde(default = "default_threshold_pct")]
    pub default_threshold_pct: Decimal,

    /// Age of the baseline observation the current price is compared against
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: Decimal,

    /// Minimum time between two alerts for the same symbol
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: Decimal,

    /// Volume ratio required for a volume-confirmed alert
    #[serde(default = "default_volume_multiplier")]
    pub volume_multiplier: Decimal,

    /// Absolute move that alerts without volume confirmation
    #[serde(default = "default_extreme_pct")]
    pub extreme_pct: Decimal,

    /// Observation retention window
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,

    /// Ask the quote source for a baseline when none is stored
    #[serde(default)]
    pub fetch_missing_baseline: bool,
}

fn default_threshold_pct() -> Decimal {
    dec!(5.0)
}
fn default_lookback_hours() -> Decimal {
    dec!(1.0)
}
fn default_cooldown_hours() -> Decimal {
    dec!(4.0)
}
fn default_volume_multiplier() -> Decimal {
    dec!(2.0)
}
fn default_extreme_pct() -> Decimal {
    dec!(15.0)
}
fn default_retention_hours() -> i64 {
    24
}

impl DetectionConfig {
    /// Age of the baseline observation
    pub fn lookback(&self) -> Duration {
        hours(self.lookback_hours)
    }

    /// Cooldown window between alerts for one symbol
    pub fn cooldown(&self) -> Duration {
        hours(self.cooldown_hours)
    }
}

/// Fractional hours as a duration, truncated to whole seconds
fn hours(value: Decimal) -> Duration {
    let secs = (value * dec!(3600)).trunc().to_i64().unwrap_or(0);
    Duration::seconds(secs.max(0))
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            default_threshold_pct: default_threshold_pct(),
            lookback_hours: default_lookback_hours(),
            cooldown_hours: default_cooldown_hours(),
            volume_multiplier: default_volume_multiplier(),
            extreme_pct: default_extreme_pct(),
            retention_hours: default_retention_hours(),
            fetch_missing_baseline: false,
        }
    }
}

/// Trade outcome simulation configuration (percentages, 3.0 = 3%)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,

    /// Negative value, e.g. -3.0
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,

    /// Max gain at which the trailing stop arms
    #[serde(default = "default_trailing_trigger_pct")]
    pub trailing_trigger_pct: Decimal,

    /// Distance kept between max gain and the trailing level
    #[serde(default = "default_trailing_gap_pct")]
    pub trailing_gap_pct: Decimal,

    #[serde(default = "default_max_hold_hours")]
    pub max_hold_hours: i64,

    /// Unfavorable fill applied to the entry price
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: Decimal,

    /// Intrabar sample interval
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: i64,

    /// Alerts older than this are never settled
    #[serde(default = "default_sync_days")]
    pub sync_days: i64,
}

fn default_take_profit_pct() -> Decimal {
    dec!(3.0)
}
fn default_stop_loss_pct() -> Decimal {
    dec!(-3.0)
}
fn default_trailing_trigger_pct() -> Decimal {
    dec!(2.0)
}
fn default_trailing_gap_pct() -> Decimal {
    dec!(1.0)
}
fn default_max_hold_hours() -> i64 {
    24
}
fn default_slippage_pct() -> Decimal {
    dec!(0.1)
}
fn default_interval_minutes() -> i64 {
    5
}
fn default_sync_days() -> i64 {
    30
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: default_take_profit_pct(),
            stop_loss_pct: default_stop_loss_pct(),
            trailing_trigger_pct: default_trailing_trigger_pct(),
            trailing_gap_pct: default_trailing_gap_pct(),
            max_hold_hours: default_max_hold_hours(),
            slippage_pct: default_slippage_pct(),
            interval_minutes: default_interval_minutes(),
            sync_days: default_sync_days(),
        }
    }
}

/// Report configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_days")]
    pub days: i64,
    /// Length of the best/worst lists
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_report_days() -> i64 {
    7
}
fn default_top_n() -> usize {
    5
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            days: default_report_days(),
            top_n: default_top_n(),
        }
    }
}

/// Quote source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QuoteSourceConfig {
    #[serde(default = "default_quote_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Parallel requests within one batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Symbols per batch; the run budget is checked between batches
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches to stay under the provider's rate limit
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
}

fn default_quote_base_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_concurrency() -> usize {
    8
}
fn default_batch_size() -> usize {
    100
}
fn default_batch_pause_ms() -> u64 {
    250
}

impl Default for QuoteSourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_quote_base_url(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
        }
    }
}

/// Notification channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_telegram_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_telegram_base_url() -> String {
    "https://api.telegram.org".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_telegram_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Telegram credentials, read from the environment only
#[derive(Debug, Clone)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

/// Persistent store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Rows per committed chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "sqlite://price-sentinel.db?mode=rwc".to_string()
}
fn default_chunk_size() -> usize {
    500
}
fn default_max_connections() -> u32 {
    4
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            chunk_size: default_chunk_size(),
            max_connections: default_max_connections(),
        }
    }
}

/// Wall-clock budget for one run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
    /// Remaining budget below which no new batch is started
    #[serde(default = "default_safety_margin_secs")]
    pub safety_margin_secs: u64,
}

fn default_budget_secs() -> u64 {
    600
}
fn default_safety_margin_secs() -> u64 {
    60
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            budget_secs: default_budget_secs(),
            safety_margin_secs: default_safety_margin_secs(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormatConfig,
    /// Prometheus listener port; no exporter when absent
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormatConfig::default(),
            metrics_port: None,
        }
    }
}

/// Log output format as written in the config file
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatConfig {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load `path`, or parse `fallback` when the file does not exist.
    ///
    /// Any other failure (unreadable file, bad TOML, invalid values) is
    /// returned as-is.
    pub fn load_or(path: impl AsRef<std::path::Path>, fallback: &str) -> anyhow::Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content)
                .map_err(|e| e.context(format!("invalid configuration in {}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, using bundled defaults");
                Self::from_toml(fallback)
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("could not read configuration {}", path.display()))),
        }
    }

    /// Parse configuration from TOML text and apply environment overrides
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.is_empty() {
                config.store.database_url = url;
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation.slice_size == 0 {
            return Err(ConfigError::Invalid("rotation.slice_size must be > 0".into()));
        }
        if self.rotation.universe_cap == 0 {
            return Err(ConfigError::Invalid("rotation.universe_cap must be > 0".into()));
        }
        if self.rotation.slot_minutes == 0 || 60 % self.rotation.slot_minutes != 0 {
            return Err(ConfigError::Invalid(
                "rotation.slot_minutes must divide 60".into(),
            ));
        }
        if self.simulation.stop_loss_pct >= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "simulation.stop_loss_pct must be negative".into(),
            ));
        }
        if self.simulation.take_profit_pct <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "simulation.take_profit_pct must be positive".into(),
            ));
        }
        if self.simulation.interval_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "simulation.interval_minutes must be positive".into(),
            ));
        }
        if self.store.chunk_size == 0 {
            return Err(ConfigError::Invalid("store.chunk_size must be > 0".into()));
        }
        Ok(())
    }

    /// Telegram credentials from the environment.
    ///
    /// Returns `Ok(None)` when notifications are disabled.
    pub fn telegram_credentials(&self) -> Result<Option<TelegramCredentials>, ConfigError> {
        if !self.notify.enabled {
            return Ok(None);
        }
        let bot_token = non_empty_env(TELEGRAM_TOKEN_ENV)
            .ok_or(ConfigError::MissingCredential(TELEGRAM_TOKEN_ENV))?;
        let chat_id = non_empty_env(TELEGRAM_CHAT_ENV)
            .ok_or(ConfigError::MissingCredential(TELEGRAM_CHAT_ENV))?;
        Ok(Some(TelegramCredentials { bot_token, chat_id }))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
